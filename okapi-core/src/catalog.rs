use crate::error::OkapiError;
use crate::module::ModuleDescriptor;
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;

/// Copy-on-write snapshot of the catalog: an insertion-ordered id list (for
/// the pipeline builder's stable tie-break, spec.md §4.2 step 3) plus an
/// id-indexed map for O(1) lookup. Rebuilt wholesale on every mutation and
/// swapped in atomically, so concurrent pipeline builds see a consistent
/// view without locking (spec.md §5, §9).
struct Snapshot {
    order: Vec<String>,
    by_id: HashMap<String, Arc<ModuleDescriptor>>,
}

impl Snapshot {
    fn empty() -> Self {
        Self {
            order: Vec::new(),
            by_id: HashMap::new(),
        }
    }
}

/// The set of known modules, indexed by id.
pub struct ModuleCatalog {
    inner: ArcSwap<Snapshot>,
}

impl ModuleCatalog {
    pub fn new() -> Self {
        Self {
            inner: ArcSwap::new(Arc::new(Snapshot::empty())),
        }
    }

    /// All modules in stable catalog iteration order.
    pub fn list(&self) -> Vec<Arc<ModuleDescriptor>> {
        let snap = self.inner.load();
        snap.order
            .iter()
            .filter_map(|id| snap.by_id.get(id).cloned())
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<Arc<ModuleDescriptor>> {
        self.inner.load().by_id.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.load().by_id.contains_key(id)
    }

    /// Inserts a new module. Fails if validation fails or the id is
    /// already present (uniqueness on id, spec.md §3).
    pub fn insert(&self, module: ModuleDescriptor) -> Result<(), OkapiError> {
        module.validate()?;
        let snap = self.inner.load();
        if snap.by_id.contains_key(&module.id) {
            return Err(OkapiError::User(format!(
                "module '{}' already exists",
                module.id
            )));
        }
        let mut order = snap.order.clone();
        let mut by_id = snap.by_id.clone();
        order.push(module.id.clone());
        by_id.insert(module.id.clone(), Arc::new(module));
        self.inner.store(Arc::new(Snapshot { order, by_id }));
        Ok(())
    }

    /// Replaces an existing module in place, preserving its position in
    /// the catalog iteration order.
    pub fn update(&self, module: ModuleDescriptor) -> Result<(), OkapiError> {
        module.validate()?;
        let snap = self.inner.load();
        if !snap.by_id.contains_key(&module.id) {
            return Err(OkapiError::NotFound(format!(
                "module '{}' not found",
                module.id
            )));
        }
        let order = snap.order.clone();
        let mut by_id = snap.by_id.clone();
        by_id.insert(module.id.clone(), Arc::new(module));
        self.inner.store(Arc::new(Snapshot { order, by_id }));
        Ok(())
    }

    pub fn delete(&self, id: &str) -> Result<(), OkapiError> {
        let snap = self.inner.load();
        if !snap.by_id.contains_key(id) {
            return Err(OkapiError::NotFound(format!("module '{}' not found", id)));
        }
        let order: Vec<String> = snap.order.iter().filter(|o| o.as_str() != id).cloned().collect();
        let mut by_id = snap.by_id.clone();
        by_id.remove(id);
        self.inner.store(Arc::new(Snapshot { order, by_id }));
        Ok(())
    }

    /// Atomically replaces the whole catalog — used by `ClusterSync` when
    /// reloading from the store (spec.md §4.6).
    pub fn replace_all(&self, modules: Vec<ModuleDescriptor>) {
        let mut order = Vec::with_capacity(modules.len());
        let mut by_id = HashMap::with_capacity(modules.len());
        for m in modules {
            order.push(m.id.clone());
            by_id.insert(m.id.clone(), Arc::new(m));
        }
        self.inner.store(Arc::new(Snapshot { order, by_id }));
    }

    pub fn len(&self) -> usize {
        self.inner.load().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ModuleCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn module(id: &str) -> ModuleDescriptor {
        ModuleDescriptor {
            id: id.to_string(),
            name: None,
            tags: vec![],
            env: Map::new(),
            requires: vec![],
            provides: vec![],
            routing_entries: vec![],
            filters: vec![],
            launch_descriptor: None,
            ui_descriptor: None,
        }
    }

    #[test]
    fn test_insert_and_get() {
        let cat = ModuleCatalog::new();
        cat.insert(module("m-echo")).unwrap();
        assert!(cat.get("m-echo").is_some());
        assert_eq!(cat.len(), 1);
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let cat = ModuleCatalog::new();
        cat.insert(module("m-echo")).unwrap();
        let err = cat.insert(module("m-echo")).unwrap_err();
        assert!(matches!(err, OkapiError::User(_)));
    }

    #[test]
    fn test_update_missing_rejected() {
        let cat = ModuleCatalog::new();
        let err = cat.update(module("m-echo")).unwrap_err();
        assert!(matches!(err, OkapiError::NotFound(_)));
    }

    #[test]
    fn test_delete_removes_and_preserves_order() {
        let cat = ModuleCatalog::new();
        cat.insert(module("m-a")).unwrap();
        cat.insert(module("m-b")).unwrap();
        cat.insert(module("m-c")).unwrap();
        cat.delete("m-b").unwrap();
        let ids: Vec<String> = cat.list().iter().map(|m| m.id.clone()).collect();
        assert_eq!(ids, vec!["m-a".to_string(), "m-c".to_string()]);
    }

    #[test]
    fn test_list_is_stable_catalog_order() {
        let cat = ModuleCatalog::new();
        cat.insert(module("m-z")).unwrap();
        cat.insert(module("m-a")).unwrap();
        let ids: Vec<String> = cat.list().iter().map(|m| m.id.clone()).collect();
        assert_eq!(ids, vec!["m-z".to_string(), "m-a".to_string()]);
    }

    #[test]
    fn test_replace_all_swaps_atomically() {
        let cat = ModuleCatalog::new();
        cat.insert(module("m-old")).unwrap();
        cat.replace_all(vec![module("m-new")]);
        assert!(cat.get("m-old").is_none());
        assert!(cat.get("m-new").is_some());
    }
}
