use crate::context::ModuleInstance;
use okapi_core::catalog::ModuleCatalog;
use okapi_core::error::OkapiError;
use okapi_core::module::ModuleDescriptor;
use okapi_core::route::{route_matches, rewrite_uri, ProxyType, RoutingEntry};
use okapi_core::tenant::TenantRegistry;
use std::sync::Arc;

/// Composes an ordered list of module hops for a (tenant, request) pair:
/// match, expand redirects, sort by phase level (spec.md §4.2). Never
/// opens a socket — a pure function of (catalog, tenant, request).
pub struct PipelineBuilder;

impl PipelineBuilder {
    pub fn build(
        catalog: &ModuleCatalog,
        tenants: &TenantRegistry,
        tenant_id: &str,
        method: &str,
        uri: &str,
    ) -> Result<Vec<ModuleInstance>, OkapiError> {
        let enabled_modules: Vec<Arc<ModuleDescriptor>> = catalog
            .list()
            .into_iter()
            .filter(|m| tenants.is_enabled(tenant_id, &m.id))
            .collect();

        let mut hops = Vec::new();
        for module in &enabled_modules {
            for entry in module.proxy_routing_entries() {
                if route_matches(entry, uri, method) {
                    Self::expand_redirects(
                        &enabled_modules,
                        module.clone(),
                        entry.clone(),
                        uri.to_string(),
                        Vec::new(),
                        method,
                        &mut hops,
                    )?;
                }
            }
        }

        // Sort ascending by phase level; Rust's sort_by is stable, so
        // ties keep catalog iteration order (spec.md §4.2 step 3).
        hops.sort_by(|a, b| a.entry.phase_level.cmp(&b.entry.phase_level));

        if !hops.iter().any(|h| selector(&h.entry).len() > 1) {
            return Err(OkapiError::NotFound(
                "No route found for this request".to_string(),
            ));
        }

        Ok(hops)
    }

    /// Appends `(module, entry, uri)` as a hop. If the entry is a
    /// REDIRECT, searches all enabled modules for a proxy entry matching
    /// `entry.redirect_path` under the original method, and recurses into
    /// each match with the uri rewritten (spec.md §4.2 step 2).
    fn expand_redirects(
        enabled_modules: &[Arc<ModuleDescriptor>],
        module: Arc<ModuleDescriptor>,
        entry: RoutingEntry,
        uri: String,
        trail: Vec<String>,
        method: &str,
        out: &mut Vec<ModuleInstance>,
    ) -> Result<(), OkapiError> {
        let is_redirect = entry.proxy_type == ProxyType::Redirect;
        let redirect_path = entry.redirect_path.clone();

        out.push(ModuleInstance {
            module: module.clone(),
            entry,
            uri: uri.clone(),
            url: None,
            auth_token: None,
        });

        if !is_redirect {
            return Ok(());
        }

        let redirect_path = redirect_path.ok_or_else(|| {
            OkapiError::User(format!(
                "module '{}' has a REDIRECT entry with no redirectPath",
                module.id
            ))
        })?;

        if trail.contains(&redirect_path) {
            let mut full_trail = trail.clone();
            full_trail.push(redirect_path.clone());
            return Err(OkapiError::User(format!(
                "Redirect loop: {}",
                full_trail.join(" -> ")
            )));
        }
        let mut next_trail = trail;
        next_trail.push(redirect_path.clone());

        let mut found_target = false;
        for target_module in enabled_modules {
            for target_entry in target_module.proxy_routing_entries() {
                if route_matches(target_entry, &redirect_path, method) {
                    found_target = true;
                    let new_uri = rewrite_uri(&uri, &redirect_path);
                    Self::expand_redirects(
                        enabled_modules,
                        target_module.clone(),
                        target_entry.clone(),
                        new_uri,
                        next_trail.clone(),
                        method,
                        out,
                    )?;
                }
            }
        }

        if !found_target {
            return Err(OkapiError::User(format!(
                "No redirect target found for '{}'",
                redirect_path
            )));
        }

        Ok(())
    }
}

/// The entry's selector string — `pathPattern` if set, else `path`.
/// Pipeline builds whose only hops select `/` are filters/auth with no
/// real handler (spec.md §4.2 step 4).
fn selector(entry: &RoutingEntry) -> String {
    entry
        .path_pattern
        .clone()
        .or_else(|| entry.path.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use okapi_core::module::ModuleDescriptor;
    use std::collections::HashMap;

    fn module(id: &str, entries: Vec<RoutingEntry>) -> ModuleDescriptor {
        ModuleDescriptor {
            id: id.to_string(),
            name: None,
            tags: vec![],
            env: HashMap::new(),
            requires: vec![],
            provides: vec![],
            routing_entries: entries,
            filters: vec![],
            launch_descriptor: None,
            ui_descriptor: None,
        }
    }

    fn entry(path: &str, phase: &str, proxy_type: ProxyType) -> RoutingEntry {
        RoutingEntry {
            path: Some(path.to_string()),
            path_pattern: None,
            methods: vec![],
            phase_level: phase.to_string(),
            proxy_type,
            redirect_path: None,
            permissions_required: vec![],
            permissions_desired: vec![],
            module_permissions: vec![],
        }
    }

    fn setup_catalog_and_tenant(modules: Vec<ModuleDescriptor>) -> (ModuleCatalog, TenantRegistry) {
        let catalog = ModuleCatalog::new();
        let tenants = TenantRegistry::new();
        for m in modules {
            let id = m.id.clone();
            catalog.insert(m).unwrap();
            tenants.enable("t1", &id, &catalog).unwrap();
        }
        (catalog, tenants)
    }

    #[test]
    fn test_minimal_proxy_scenario() {
        let (catalog, tenants) = setup_catalog_and_tenant(vec![module(
            "m-echo",
            vec![entry("/echo", "50", ProxyType::RequestResponse)],
        )]);
        let hops = PipelineBuilder::build(&catalog, &tenants, "t1", "POST", "/echo").unwrap();
        assert_eq!(hops.len(), 1);
        assert_eq!(hops[0].module.id, "m-echo");
    }

    #[test]
    fn test_filter_only_pipeline_rejected_404() {
        let (catalog, tenants) = setup_catalog_and_tenant(vec![module(
            "auth",
            vec![entry("/", "10", ProxyType::Headers)],
        )]);
        let err = PipelineBuilder::build(&catalog, &tenants, "t1", "GET", "/anything").unwrap_err();
        assert!(matches!(err, OkapiError::NotFound(_)));
    }

    #[test]
    fn test_phase_level_sort_order() {
        let (catalog, tenants) = setup_catalog_and_tenant(vec![
            module("m-echo", vec![entry("/echo", "50", ProxyType::RequestResponse)]),
            module("auth", vec![entry("/", "10", ProxyType::Headers)]),
        ]);
        let hops = PipelineBuilder::build(&catalog, &tenants, "t1", "POST", "/echo").unwrap();
        assert_eq!(hops.len(), 2);
        assert_eq!(hops[0].module.id, "auth");
        assert_eq!(hops[1].module.id, "m-echo");
    }

    #[test]
    fn test_redirect_rewrites_uri_and_resolves_to_target() {
        let mut a = entry("/old", "50", ProxyType::Redirect);
        a.redirect_path = Some("/new".to_string());
        let (catalog, tenants) = setup_catalog_and_tenant(vec![
            module("m-a", vec![a]),
            module("m-b", vec![entry("/new", "50", ProxyType::RequestResponse)]),
        ]);
        let hops = PipelineBuilder::build(&catalog, &tenants, "t1", "GET", "/old").unwrap();
        // m-a contributes the redirect hop, m-b the real handler
        assert_eq!(hops.len(), 2);
        let target = hops.iter().find(|h| h.module.id == "m-b").unwrap();
        assert_eq!(target.uri, "/new");
    }

    #[test]
    fn test_redirect_loop_detected() {
        let mut a = entry("/x", "50", ProxyType::Redirect);
        a.redirect_path = Some("/y".to_string());
        let mut b = entry("/y", "50", ProxyType::Redirect);
        b.redirect_path = Some("/x".to_string());
        let (catalog, tenants) =
            setup_catalog_and_tenant(vec![module("m-a", vec![a]), module("m-b", vec![b])]);
        let err = PipelineBuilder::build(&catalog, &tenants, "t1", "GET", "/x").unwrap_err();
        match err {
            OkapiError::User(msg) => assert!(msg.contains("Redirect loop")),
            other => panic!("expected User error, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_redirect_target() {
        let mut a = entry("/old", "50", ProxyType::Redirect);
        a.redirect_path = Some("/nowhere".to_string());
        let (catalog, tenants) = setup_catalog_and_tenant(vec![module("m-a", vec![a])]);
        let err = PipelineBuilder::build(&catalog, &tenants, "t1", "GET", "/old").unwrap_err();
        assert!(matches!(err, OkapiError::User(_)));
    }

    #[test]
    fn test_deterministic_repeatable_build() {
        let (catalog, tenants) = setup_catalog_and_tenant(vec![module(
            "m-echo",
            vec![entry("/echo", "50", ProxyType::RequestResponse)],
        )]);
        let first = PipelineBuilder::build(&catalog, &tenants, "t1", "POST", "/echo").unwrap();
        let second = PipelineBuilder::build(&catalog, &tenants, "t1", "POST", "/echo").unwrap();
        assert_eq!(first.len(), second.len());
        assert_eq!(first[0].module.id, second[0].module.id);
    }

    #[test]
    fn test_disabled_module_not_in_pipeline() {
        let catalog = ModuleCatalog::new();
        let tenants = TenantRegistry::new();
        catalog
            .insert(module(
                "m-echo",
                vec![entry("/echo", "50", ProxyType::RequestResponse)],
            ))
            .unwrap();
        // not enabled for t1
        let err = PipelineBuilder::build(&catalog, &tenants, "t1", "POST", "/echo").unwrap_err();
        assert!(matches!(err, OkapiError::NotFound(_)));
    }
}
