//! Task registry.
//!
//! Maps a `(protocol, kind)` key to the module implementing it, and each
//! forward key to the key of its reverse counterpart. Registration happens
//! once at startup; the set of modules is closed for a run.

use std::collections::HashMap;
use std::sync::Arc;

use chainflow_core::ModuleKey;

use crate::module::ModuleContract;

/// Constructor for a module instance.
pub type ModuleFactory = Arc<dyn Fn() -> Arc<dyn ModuleContract> + Send + Sync>;

#[derive(Default)]
pub struct TaskRegistry {
    modules: HashMap<ModuleKey, ModuleFactory>,
    reverses: HashMap<ModuleKey, ModuleKey>,
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("modules", &self.keys())
            .field("reverses", &self.reverses)
            .finish()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the module for `key`, replacing any previous one.
    pub fn register<F>(&mut self, key: ModuleKey, factory: F) -> &mut Self
    where
        F: Fn() -> Arc<dyn ModuleContract> + Send + Sync + 'static,
    {
        self.modules.insert(key, Arc::new(factory));
        self
    }

    /// Declare `reverse` as the counterpart of `forward`.
    pub fn register_reverse(&mut self, forward: ModuleKey, reverse: ModuleKey) -> &mut Self {
        self.reverses.insert(forward, reverse);
        self
    }

    /// Fresh module instance for `key`.
    pub fn resolve(&self, key: &ModuleKey) -> Option<Arc<dyn ModuleContract>> {
        self.modules.get(key).map(|factory| factory())
    }

    pub fn contains(&self, key: &ModuleKey) -> bool {
        self.modules.contains_key(key)
    }

    /// Reverse key registered for `forward`.
    pub fn reverse_of(&self, forward: &ModuleKey) -> Option<&ModuleKey> {
        self.reverses.get(forward)
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<ModuleKey> {
        let mut keys: Vec<_> = self.modules.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{ModuleContext, ModuleResult};
    use chainflow_chain::BoxFuture;
    use chainflow_core::{OperationKind, TransactionPayloadData};

    struct Noop;

    impl ModuleContract for Noop {
        fn build_payload<'a>(
            &'a self,
            _ctx: &'a ModuleContext,
        ) -> BoxFuture<'a, ModuleResult<TransactionPayloadData>> {
            Box::pin(async {
                Ok(TransactionPayloadData::new(
                    Vec::new(),
                    rust_decimal::Decimal::ZERO,
                    "noop",
                ))
            })
        }
    }

    #[test]
    fn test_register_and_resolve() {
        let swap = ModuleKey::new("v2", OperationKind::Swap);
        let reverse = ModuleKey::new("v2", OperationKind::ReverseSwap);

        let mut registry = TaskRegistry::new();
        registry
            .register(swap.clone(), || Arc::new(Noop))
            .register(reverse.clone(), || Arc::new(Noop))
            .register_reverse(swap.clone(), reverse.clone());

        assert!(registry.resolve(&swap).is_some());
        assert!(registry
            .resolve(&ModuleKey::new("v3", OperationKind::Swap))
            .is_none());
        assert_eq!(registry.reverse_of(&swap), Some(&reverse));
        assert_eq!(registry.reverse_of(&reverse), None);
        assert_eq!(registry.keys(), vec![swap, reverse]);
    }
}
