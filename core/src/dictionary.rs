use crate::{Address, DocId};
use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};
use std::collections::HashMap;

#[derive(Default)]
struct Inner {
    ids: HashMap<Address, DocId>,
    /// Index is the doc id.
    addresses: Vec<Address>,
}

/// Bidirectional Address <-> DocId mapping. Ids are dense, start at zero and are
/// handed out in first-seen order; entries are never removed.
#[derive(Default)]
pub struct DocIdDictionary {
    inner: RwLock<Inner>,
}

impl DocIdDictionary {
    pub fn new() -> Self { Self::default() }

    /// Returns the id for `address`, assigning the next one if it has none yet.
    /// Concurrent callers with the same address all observe the same id.
    pub fn assign_id_if_absent(&self, address: &Address) -> DocId {
        if let Some(id) = self.inner.read().ids.get(address) {
            return *id;
        }
        let mut inner = self.inner.write();
        if let Some(id) = inner.ids.get(address) {
            return *id;
        }
        let id = inner.addresses.len() as DocId;
        inner.addresses.push(address.clone());
        inner.ids.insert(address.clone(), id);
        id
    }

    pub fn lookup_id(&self, address: &Address) -> Option<DocId> {
        self.inner.read().ids.get(address).copied()
    }

    pub fn lookup_address(&self, id: DocId) -> Option<Address> {
        let found = self.inner.read().addresses.get(id as usize).cloned();
        if found.is_none() {
            tracing::debug!(doc_id = id, "no address for doc id");
        }
        found
    }

    /// Read-only view of the id table; index `i` holds the address of doc id `i`.
    /// Holds a read lock for as long as the guard lives.
    pub fn all_addresses_in_id_order(&self) -> MappedRwLockReadGuard<'_, [Address]> {
        RwLockReadGuard::map(self.inner.read(), |inner| inner.addresses.as_slice())
    }

    pub fn len(&self) -> usize { self.inner.read().addresses.len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn addr(path: &str) -> Address {
        Address::parse(&format!("http://example.com/{path}")).unwrap()
    }

    #[test]
    fn ids_are_dense_and_stable() {
        let dict = DocIdDictionary::new();
        assert_eq!(dict.assign_id_if_absent(&addr("a")), 0);
        assert_eq!(dict.assign_id_if_absent(&addr("b")), 1);
        assert_eq!(dict.assign_id_if_absent(&addr("a")), 0);
        assert_eq!(dict.lookup_id(&addr("b")), Some(1));
        assert_eq!(dict.lookup_id(&addr("c")), None);
        assert_eq!(dict.lookup_address(1), Some(addr("b")));
        assert_eq!(dict.lookup_address(7), None);
        assert_eq!(&*dict.all_addresses_in_id_order(), &[addr("a"), addr("b")]);
    }

    #[test]
    fn concurrent_assignment_agrees() {
        let dict = Arc::new(DocIdDictionary::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let dict = Arc::clone(&dict);
                thread::spawn(move || {
                    (0..50).map(|i| dict.assign_id_if_absent(&addr(&i.to_string()))).collect::<Vec<_>>()
                })
            })
            .collect();
        let results: Vec<Vec<DocId>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for r in &results[1..] {
            assert_eq!(r, &results[0]);
        }
        assert_eq!(dict.len(), 50);
        let table = dict.all_addresses_in_id_order();
        for (id, address) in table.iter().enumerate() {
            assert_eq!(dict.lookup_id(address), Some(id as DocId));
        }
    }
}
