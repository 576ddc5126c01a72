//! Persisted state: the last reconciled record of every managed resource.

use crate::error::{Error, Result};
use crate::types::{Address, Record};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Storage for reconciled records, keyed by local address.
///
/// Implementations must be safe to call from several worker threads; each
/// call is its own unit of persistence.
pub trait StateStore: Send + Sync {
    /// Last persisted record for `address`.
    fn load(&self, address: &Address) -> Result<Option<Record>>;

    /// Persist the record for `address`, replacing any previous one.
    fn save(&self, address: &Address, record: &Record) -> Result<()>;

    /// Forget `address`. Returns whether it was present.
    fn remove(&self, address: &Address) -> Result<bool>;

    /// All addresses with persisted state, in order.
    fn addresses(&self) -> Result<Vec<Address>>;
}

/// In-memory store, for tests and dry runs. Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<BTreeMap<Address, Record>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<Address, Record>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StateStore for MemoryStore {
    fn load(&self, address: &Address) -> Result<Option<Record>> {
        Ok(self.lock().get(address).cloned())
    }

    fn save(&self, address: &Address, record: &Record) -> Result<()> {
        if record.id.is_none() {
            return Err(Error::MissingIdentifier {
                kind: address.kind.clone(),
            });
        }
        self.lock().insert(address.clone(), record.clone());
        Ok(())
    }

    fn remove(&self, address: &Address) -> Result<bool> {
        Ok(self.lock().remove(address).is_some())
    }

    fn addresses(&self) -> Result<Vec<Address>> {
        Ok(self.lock().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        let addr = Address::new("alert", "cpu");
        assert!(store.load(&addr).unwrap().is_none());

        store.save(&addr, &Record::new().with_id("1")).unwrap();
        assert_eq!(store.load(&addr).unwrap().unwrap().id.as_deref(), Some("1"));
        assert_eq!(store.addresses().unwrap(), vec![addr.clone()]);

        assert!(store.remove(&addr).unwrap());
        assert!(!store.remove(&addr).unwrap());
    }

    #[test]
    fn test_save_requires_identifier() {
        let store = MemoryStore::new();
        let err = store.save(&Address::new("alert", "cpu"), &Record::new()).unwrap_err();
        assert!(matches!(err, Error::MissingIdentifier { .. }));
    }
}
