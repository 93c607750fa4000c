//! Module registry
//!
//! Built once at startup from the modules the engine exposes.

use crate::module::CapabilityModule;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use warden_core::ModuleId;

#[derive(Default)]
pub struct ModuleRegistry {
    modules: BTreeMap<ModuleId, Arc<dyn CapabilityModule>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module. Replaces any existing module with the same id.
    pub fn register(&mut self, module: Arc<dyn CapabilityModule>) {
        self.modules.insert(module.id(), module);
    }

    pub fn get(&self, id: ModuleId) -> Option<Arc<dyn CapabilityModule>> {
        self.modules.get(&id).cloned()
    }

    /// Registered modules, ordered by id.
    pub fn modules(&self) -> Vec<Arc<dyn CapabilityModule>> {
        self.modules.values().cloned().collect()
    }

    pub fn ids(&self) -> Vec<ModuleId> {
        self.modules.keys().copied().collect()
    }

    /// Ids of modules currently reporting enabled.
    pub fn enabled_set(&self) -> BTreeSet<ModuleId> {
        self.modules
            .iter()
            .filter(|(_, m)| m.is_enabled())
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl FromIterator<Arc<dyn CapabilityModule>> for ModuleRegistry {
    fn from_iter<I: IntoIterator<Item = Arc<dyn CapabilityModule>>>(iter: I) -> Self {
        let mut registry = Self::new();
        for module in iter {
            registry.register(module);
        }
        registry
    }
}
