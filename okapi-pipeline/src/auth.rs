use crate::context::{ModuleInstance, ProxyContext};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use okapi_core::error::OkapiError;
use okapi_core::route::ProxyType;

const HEADERS_TO_SANITIZE: [&str; 5] = [
    "X-Okapi-Permissions-Required",
    "X-Okapi-Permissions-Desired",
    "X-Okapi-Module-Permissions",
    "X-Okapi-Extra-Permissions",
    "X-Okapi-Module-Tokens",
];

/// Synthesizes the permission and module-token-plan headers from the
/// pipeline before the first hop, and interprets the auth module's
/// response to rewrite per-hop tokens (spec.md §4.3).
pub struct AuthHeaderPlanner;

impl AuthHeaderPlanner {
    /// Header normalization ahead of pipeline construction: folds
    /// `Authorization: Bearer <t>` into `X-Okapi-Token`, and resolves the
    /// tenant id from `X-Okapi-Tenant` or, failing that, a best-effort
    /// decode of the token. Returns the resolved tenant id and client
    /// token.
    pub fn normalize_headers(
        headers: &mut crate::headers::HeaderList,
    ) -> Result<(String, Option<String>), OkapiError> {
        let bearer = headers
            .get("Authorization")
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|t| t.trim().to_string());
        let existing_token = headers.get("X-Okapi-Token").map(|s| s.to_string());

        let token = match (&bearer, &existing_token) {
            (Some(b), Some(t)) if b != t => {
                return Err(OkapiError::User(
                    "Authorization and X-Okapi-Token disagree".to_string(),
                ));
            }
            (Some(b), _) => Some(b.clone()),
            (None, Some(t)) => Some(t.clone()),
            (None, None) => None,
        };

        if let Some(t) = &token {
            headers.set("X-Okapi-Token", t.clone());
        }

        let tenant_id = match headers.get("X-Okapi-Tenant").map(|s| s.to_string()) {
            Some(t) => t,
            None => token
                .as_deref()
                .and_then(decode_tenant_from_token)
                .ok_or_else(|| {
                    OkapiError::Forbidden(
                        "no X-Okapi-Tenant header and no tenant could be recovered from the token"
                            .to_string(),
                    )
                })?,
        };

        Ok((tenant_id, token))
    }

    /// Builds the permission/module-permission headers over the built
    /// pipeline and sets every hop's token to the client's token as a
    /// default (spec.md §4.3).
    pub fn plan(ctx: &mut ProxyContext, client_token: Option<&str>) {
        for name in HEADERS_TO_SANITIZE {
            ctx.headers.remove(name);
        }

        let mut required: Vec<String> = Vec::new();
        let mut desired: Vec<String> = Vec::new();
        let mut module_permissions = serde_json::Map::new();
        let mut extra_permissions: Vec<String> = Vec::new();

        for hop in &ctx.hops {
            for p in &hop.entry.permissions_required {
                if !required.contains(p) {
                    required.push(p.clone());
                }
            }
            for p in &hop.entry.permissions_desired {
                if !desired.contains(p) {
                    desired.push(p.clone());
                }
            }
            if hop.entry.proxy_type == ProxyType::Redirect {
                for p in &hop.entry.module_permissions {
                    if !extra_permissions.contains(p) {
                        extra_permissions.push(p.clone());
                    }
                }
            } else if !hop.entry.module_permissions.is_empty() {
                let perms = hop
                    .entry
                    .module_permissions
                    .iter()
                    .cloned()
                    .map(serde_json::Value::String)
                    .collect();
                module_permissions.insert(hop.module.id.clone(), serde_json::Value::Array(perms));
            }
        }

        if !required.is_empty() {
            ctx.headers
                .set("X-Okapi-Permissions-Required", required.join(","));
        }
        if !desired.is_empty() {
            ctx.headers
                .set("X-Okapi-Permissions-Desired", desired.join(","));
        }
        // Always set — its presence, even empty, tells the auth module
        // the permissions plan has already been sanctioned.
        ctx.headers.set(
            "X-Okapi-Module-Permissions",
            serde_json::Value::Object(module_permissions).to_string(),
        );
        if !extra_permissions.is_empty() {
            let arr = extra_permissions.into_iter().map(serde_json::Value::String).collect();
            ctx.headers.set(
                "X-Okapi-Extra-Permissions",
                serde_json::Value::Array(arr).to_string(),
            );
        }

        let default_token = client_token.map(|s| s.to_string());
        for hop in ctx.hops.iter_mut() {
            hop.auth_token = default_token.clone();
        }
    }

    /// Applies the auth module's `X-Okapi-Module-Tokens` response to
    /// rewrite each hop's token; the caller strips the header afterward
    /// (spec.md §4.3, §8 invariant 5).
    pub fn apply_module_tokens(hops: &mut [ModuleInstance], module_tokens_json: &str) {
        let Ok(serde_json::Value::Object(map)) =
            serde_json::from_str::<serde_json::Value>(module_tokens_json)
        else {
            return;
        };
        let default_token = map.get("_").and_then(|v| v.as_str()).map(|s| s.to_string());
        for hop in hops.iter_mut() {
            if let Some(tok) = map.get(&hop.module.id).and_then(|v| v.as_str()) {
                hop.auth_token = Some(tok.to_string());
            } else if let Some(default) = &default_token {
                hop.auth_token = Some(default.clone());
            }
        }
    }
}

/// Best-effort decode of the `tenant` claim from a JWT's middle segment.
/// This is NOT signature verification — Okapi has no way to know which
/// key signed an arbitrary client token, so it only ever reads the
/// claim to recover a missing tenant id. Any failure (wrong segment
/// count, bad base64, bad JSON, missing/non-string field) yields `None`
/// rather than an error (spec.md §9, Open Question 1).
pub fn decode_tenant_from_token(token: &str) -> Option<String> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return None;
    }
    let payload = URL_SAFE_NO_PAD.decode(parts[1]).ok()?;
    let value: serde_json::Value = serde_json::from_slice(&payload).ok()?;
    value.get("tenant")?.as_str().map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::HeaderList;

    fn token_with_tenant(tenant: &str) -> String {
        let header = URL_SAFE_NO_PAD.encode(b"{\"alg\":\"none\"}");
        let payload = URL_SAFE_NO_PAD.encode(format!("{{\"tenant\":\"{tenant}\"}}"));
        format!("{header}.{payload}.sig")
    }

    #[test]
    fn test_decode_tenant_from_well_formed_token() {
        let tok = token_with_tenant("t1");
        assert_eq!(decode_tenant_from_token(&tok), Some("t1".to_string()));
    }

    #[test]
    fn test_decode_tenant_never_panics_on_garbage() {
        assert_eq!(decode_tenant_from_token("not-a-jwt"), None);
        assert_eq!(decode_tenant_from_token("a.b"), None);
        assert_eq!(decode_tenant_from_token("a.!!!not-base64!!!.c"), None);
    }

    #[test]
    fn test_normalize_headers_folds_authorization_into_okapi_token() {
        let mut headers = HeaderList::new();
        headers.append("Authorization", "Bearer CLIENT");
        headers.append("X-Okapi-Tenant", "t1");
        let (tenant, token) = AuthHeaderPlanner::normalize_headers(&mut headers).unwrap();
        assert_eq!(tenant, "t1");
        assert_eq!(token, Some("CLIENT".to_string()));
        assert_eq!(headers.get("X-Okapi-Token"), Some("CLIENT"));
    }

    #[test]
    fn test_conflicting_auth_headers_rejected() {
        let mut headers = HeaderList::new();
        headers.append("Authorization", "Bearer A");
        headers.append("X-Okapi-Token", "B");
        headers.append("X-Okapi-Tenant", "t1");
        let err = AuthHeaderPlanner::normalize_headers(&mut headers).unwrap_err();
        assert!(matches!(err, OkapiError::User(_)));
    }

    #[test]
    fn test_missing_tenant_falls_back_to_token_then_403() {
        let mut headers = HeaderList::new();
        headers.append("Authorization", "Bearer not-a-jwt");
        let err = AuthHeaderPlanner::normalize_headers(&mut headers).unwrap_err();
        assert!(matches!(err, OkapiError::Forbidden(_)));
        assert_eq!(err.status_code(), 403);
    }

    #[test]
    fn test_missing_tenant_recovered_from_token() {
        let mut headers = HeaderList::new();
        let tok = token_with_tenant("t2");
        headers.append("Authorization", format!("Bearer {tok}"));
        let (tenant, _) = AuthHeaderPlanner::normalize_headers(&mut headers).unwrap();
        assert_eq!(tenant, "t2");
    }

    #[test]
    fn test_module_permissions_header_always_present_even_empty() {
        let mut ctx = ProxyContext::new(
            "GET".to_string(),
            "/echo".to_string(),
            "127.0.0.1".to_string(),
            HeaderList::new(),
        );
        AuthHeaderPlanner::plan(&mut ctx, Some("CLIENT"));
        assert!(ctx.headers.contains("X-Okapi-Module-Permissions"));
    }

    #[test]
    fn test_apply_module_tokens_overwrites_per_hop() {
        use crate::context::ModuleInstance;
        use okapi_core::module::ModuleDescriptor;
        use okapi_core::route::RoutingEntry;
        use std::collections::HashMap;
        use std::sync::Arc;

        let module = Arc::new(ModuleDescriptor {
            id: "m-echo".to_string(),
            name: None,
            tags: vec![],
            env: HashMap::new(),
            requires: vec![],
            provides: vec![],
            routing_entries: vec![],
            filters: vec![],
            launch_descriptor: None,
            ui_descriptor: None,
        });
        let entry = RoutingEntry {
            path: Some("/echo".to_string()),
            path_pattern: None,
            methods: vec![],
            phase_level: "50".to_string(),
            proxy_type: ProxyType::RequestResponse,
            redirect_path: None,
            permissions_required: vec![],
            permissions_desired: vec![],
            module_permissions: vec![],
        };
        let mut hops = vec![ModuleInstance {
            module,
            entry,
            uri: "/echo".to_string(),
            url: None,
            auth_token: Some("CLIENT".to_string()),
        }];

        AuthHeaderPlanner::apply_module_tokens(&mut hops, r#"{"m-echo":"TOK","_":"DEFAULT"}"#);
        assert_eq!(hops[0].auth_token, Some("TOK".to_string()));
    }
}
