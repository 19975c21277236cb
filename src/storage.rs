// This software is licensed under a dual license model:
//
// GNU Affero General Public License v3 (AGPLv3): You may use, modify, and
// distribute this software under the terms of the AGPLv3.
//
// Elastic License v2 (ELv2): You may also use, modify, and distribute this
// software under the Elastic License v2, which has specific restrictions.
//
// We welcome any commercial collaboration or support. For inquiries
// regarding the licenses, please contact us at:
// vectorchord-inquiry@tensorchord.ai
//
// Copyright (c) 2025 TensorChord Inc.

//! Ordered key-value storage for persisted indexes.

use crate::error::BoxedError;
use parking_lot::{RwLock, RwLockReadGuard};
use std::collections::BTreeMap;
use std::ops::Bound;

pub type Entry = (Vec<u8>, Vec<u8>);

/// An ordered byte-keyed store.
pub trait Store {
    type Cursor<'a>: Cursor
    where
        Self: 'a;

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), BoxedError>;

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BoxedError>;

    /// Entries with keys in `[low, high)`, ascending by key.
    fn range_scan(&self, low: &[u8], high: &[u8]) -> Result<Self::Cursor<'_>, BoxedError>;
}

/// A scan in progress. It may hold resources of the store until released.
pub trait Cursor: Iterator<Item = Result<Entry, BoxedError>> {
    fn release(self)
    where
        Self: Sized,
    {
    }
}

/// A store kept in memory.
///
/// Writers wait for open cursors, so release a cursor before writing to the
/// same store on the same thread.
#[derive(Debug, Default)]
pub struct MemoryStore {
    map: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }
}

impl Store for MemoryStore {
    type Cursor<'a> = MemoryCursor<'a>;

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), BoxedError> {
        self.map.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BoxedError> {
        Ok(self.map.read().get(key).cloned())
    }

    fn range_scan(&self, low: &[u8], high: &[u8]) -> Result<MemoryCursor<'_>, BoxedError> {
        Ok(MemoryCursor {
            guard: self.map.read(),
            next: (low < high).then(|| Bound::Included(low.to_vec())),
            high: high.to_vec(),
        })
    }
}

pub struct MemoryCursor<'a> {
    guard: RwLockReadGuard<'a, BTreeMap<Vec<u8>, Vec<u8>>>,
    // `None` once exhausted
    next: Option<Bound<Vec<u8>>>,
    high: Vec<u8>,
}

impl Iterator for MemoryCursor<'_> {
    type Item = Result<Entry, BoxedError>;

    fn next(&mut self) -> Option<Self::Item> {
        let low = self.next.take()?;
        let (key, value) = self
            .guard
            .range::<[u8], _>((
                low.as_ref().map(Vec::as_slice),
                Bound::Excluded(self.high.as_slice()),
            ))
            .next()?;
        self.next = Some(Bound::Excluded(key.clone()));
        Some(Ok((key.clone(), value.clone())))
    }
}

impl Cursor for MemoryCursor<'_> {}

#[test]
fn test_memory_store() {
    let store = MemoryStore::new();
    assert!(store.is_empty());
    for key in ["b/2", "a", "b/1", "b0", "b/", "c"] {
        store.put(key.as_bytes(), key.to_uppercase().as_bytes()).unwrap();
    }
    store.put(b"a", b"replaced").unwrap();
    assert_eq!(store.len(), 6);
    assert_eq!(store.get(b"a").unwrap(), Some(b"replaced".to_vec()));
    assert_eq!(store.get(b"missing").unwrap(), None);

    let cursor = store.range_scan(b"b/", b"b0").unwrap();
    let keys = cursor
        .map(|entry| String::from_utf8(entry.unwrap().0).unwrap())
        .collect::<Vec<_>>();
    assert_eq!(keys, vec!["b/", "b/1", "b/2"]);

    assert_eq!(store.range_scan(b"b0", b"b/").unwrap().count(), 0);
    assert_eq!(store.range_scan(b"b", b"b").unwrap().count(), 0);
    assert_eq!(store.range_scan(b"", b"\xff").unwrap().count(), 6);
}

#[test]
fn test_release_unblocks_writers() {
    let store = MemoryStore::new();
    store.put(b"k", b"v").unwrap();
    let mut cursor = store.range_scan(b"a", b"z").unwrap();
    assert_eq!(cursor.next().unwrap().unwrap(), (b"k".to_vec(), b"v".to_vec()));
    assert!(store.map.try_write().is_none());
    cursor.release();
    assert!(store.map.try_write().is_some());
}
