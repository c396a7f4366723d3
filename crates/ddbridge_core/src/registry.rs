//! Table name to id cache.

use crate::error::{CoreError, CoreResult};
use crate::types::TableId;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Caches table ids resolved from the engine.
///
/// Each name is resolved at most once; later lookups are served from the
/// cache. Names that fail to resolve are not cached.
#[derive(Debug, Default)]
pub struct TableRegistry {
    ids: RwLock<HashMap<String, TableId>>,
}

impl TableRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id for `name`, calling `lookup` only on a cache miss.
    pub fn resolve(
        &self,
        name: &str,
        lookup: impl FnOnce(&str) -> Option<TableId>,
    ) -> CoreResult<TableId> {
        if let Some(id) = self.ids.read().get(name) {
            return Ok(*id);
        }

        let id = lookup(name).ok_or_else(|| CoreError::unknown_table(name))?;
        self.ids.write().entry(name.to_string()).or_insert(id);
        Ok(id)
    }

    /// Returns the number of cached names.
    pub fn len(&self) -> usize {
        self.ids.read().len()
    }

    /// Returns true if nothing has been resolved yet.
    pub fn is_empty(&self) -> bool {
        self.ids.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn second_lookup_is_cached() {
        let registry = TableRegistry::new();
        let calls = Cell::new(0);
        let lookup = |name: &str| {
            calls.set(calls.get() + 1);
            (name == "Edge").then_some(TableId::new(3))
        };

        assert_eq!(registry.resolve("Edge", lookup).unwrap(), TableId::new(3));
        assert_eq!(registry.resolve("Edge", lookup).unwrap(), TableId::new(3));
        assert_eq!(registry.resolve("Edge", lookup).unwrap(), TableId::new(3));
        assert_eq!(calls.get(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unknown_names_are_retried() {
        let registry = TableRegistry::new();
        let calls = Cell::new(0);
        let lookup = |_: &str| {
            calls.set(calls.get() + 1);
            None
        };

        assert!(matches!(
            registry.resolve("Nope", lookup),
            Err(CoreError::UnknownTable { .. })
        ));
        assert!(registry.resolve("Nope", lookup).is_err());
        assert_eq!(calls.get(), 2);
        assert!(registry.is_empty());
    }
}
