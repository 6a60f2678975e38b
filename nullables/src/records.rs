//! In-memory database contents and the record-level operations on them.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

use serde_json::Value;

use larder_store::EngineError;
use larder_types::{Key, KeyPath, Term};

/// Largest key an auto-increment store generates: 2^53, the last integer
/// a JSON number represents exactly.
pub const MAX_GENERATED_KEY: i64 = 1 << 53;

/// Contents of one named database.
#[derive(Clone, Debug, Default)]
pub struct DbState {
    /// `0` until the first successful open.
    pub version: u32,
    pub stores: BTreeMap<String, StoreData>,
}

/// Contents and declaration of one object store.
#[derive(Clone, Debug)]
pub struct StoreData {
    pub key_path: KeyPath,
    pub auto_increment: bool,
    /// Next generated key. Past [`MAX_GENERATED_KEY`] the generator is
    /// exhausted.
    pub next_key: i64,
    pub records: BTreeMap<Key, Value>,
    pub indexes: BTreeMap<String, IndexDef>,
}

#[derive(Clone, Debug)]
pub struct IndexDef {
    pub key_path: KeyPath,
    pub unique: bool,
    /// (index key, primary key) of every record the key path resolves on.
    entries: BTreeSet<(Key, Key)>,
}

impl IndexDef {
    pub fn new(key_path: KeyPath, unique: bool) -> Self {
        Self {
            key_path,
            unique,
            entries: BTreeSet::new(),
        }
    }

    fn add(&mut self, pk: &Key, record: &Value) {
        if let Some(key) = self.key_path.extract(record) {
            self.entries.insert((key, pk.clone()));
        }
    }

    fn remove(&mut self, pk: &Key, record: &Value) {
        if let Some(key) = self.key_path.extract(record) {
            self.entries.remove(&(key, pk.clone()));
        }
    }

    /// Whether a record other than `pk` already holds `key`.
    fn holds_for_other(&self, key: &Key, pk: &Key) -> bool {
        let first = (key.clone(), Key::Number(f64::NEG_INFINITY));
        self.entries
            .range(first..)
            .take_while(|(k, _)| k == key)
            .any(|(_, other)| other != pk)
    }
}

/// A record's state before a write, restored if the transaction aborts.
#[derive(Debug)]
pub struct Undo {
    pub store: String,
    pub key: Key,
    pub previous: Option<Value>,
}

/// What an ordered scan walks: the primary keys or one index.
#[derive(Clone, Debug)]
pub enum ScanSource {
    Primary,
    Index(String),
}

impl DbState {
    pub fn store(&self, name: &str) -> Result<&StoreData, EngineError> {
        self.stores
            .get(name)
            .ok_or_else(|| EngineError::NotFound(format!("object store '{name}'")))
    }

    pub fn store_mut(&mut self, name: &str) -> Result<&mut StoreData, EngineError> {
        self.stores
            .get_mut(name)
            .ok_or_else(|| EngineError::NotFound(format!("object store '{name}'")))
    }

    /// Roll back writes, newest first.
    pub fn undo(&mut self, log: Vec<Undo>) {
        for entry in log.into_iter().rev() {
            let Some(store) = self.stores.get_mut(&entry.store) else {
                continue;
            };
            match entry.previous {
                Some(value) => {
                    store.insert(entry.key, value);
                }
                None => {
                    store.remove(&entry.key);
                }
            }
        }
    }
}

impl StoreData {
    pub fn new(key_path: KeyPath, auto_increment: bool) -> Self {
        Self {
            key_path,
            auto_increment,
            next_key: 1,
            records: BTreeMap::new(),
            indexes: BTreeMap::new(),
        }
    }

    pub fn index(&self, name: &str) -> Result<&IndexDef, EngineError> {
        self.indexes
            .get(name)
            .ok_or_else(|| EngineError::NotFound(format!("index '{name}'")))
    }

    /// Declare an index and fill it from the records already stored.
    pub fn add_index(&mut self, name: &str, mut index: IndexDef) -> Result<(), EngineError> {
        if self.indexes.contains_key(name) {
            return Err(EngineError::Constraint(format!("index '{name}' already exists")));
        }
        for (pk, record) in &self.records {
            if let Some(key) = index.key_path.extract(record) {
                if index.unique && index.holds_for_other(&key, pk) {
                    return Err(EngineError::Constraint(format!(
                        "unique index '{name}' already contains {key}"
                    )));
                }
                index.entries.insert((key, pk.clone()));
            }
        }
        self.indexes.insert(name.to_string(), index);
        Ok(())
    }

    /// Insert or replace a record. Returns its key and the record it replaced.
    pub fn put(&mut self, mut record: Value) -> Result<(Key, Option<Value>), EngineError> {
        let key = match self.key_path.extract(&record) {
            Some(key) => key,
            None if self.auto_increment => {
                if self.next_key > MAX_GENERATED_KEY {
                    return Err(EngineError::Constraint(format!(
                        "key generator at '{}' is exhausted",
                        self.key_path
                    )));
                }
                let key = Key::from(self.next_key);
                if !self.key_path.inject(&mut record, &key) {
                    return Err(EngineError::Data(format!(
                        "cannot inject generated key at '{}'",
                        self.key_path
                    )));
                }
                key
            }
            None => {
                return Err(EngineError::Data(format!(
                    "record has no valid key at '{}'",
                    self.key_path
                )))
            }
        };

        for (name, index) in &self.indexes {
            if !index.unique {
                continue;
            }
            let Some(index_key) = index.key_path.extract(&record) else {
                continue;
            };
            if index.holds_for_other(&index_key, &key) {
                return Err(EngineError::Constraint(format!(
                    "unique index '{name}' already contains {index_key}"
                )));
            }
        }

        if self.auto_increment {
            if let Key::Number(n) = key {
                self.advance_generator(n);
            }
        }
        let previous = self.insert(key.clone(), record);
        Ok((key, previous))
    }

    /// Remove a record and its index entries.
    pub fn remove(&mut self, key: &Key) -> Option<Value> {
        let previous = self.records.remove(key)?;
        for index in self.indexes.values_mut() {
            index.remove(key, &previous);
        }
        Some(previous)
    }

    fn insert(&mut self, key: Key, record: Value) -> Option<Value> {
        let previous = self.remove(&key);
        for index in self.indexes.values_mut() {
            index.add(&key, &record);
        }
        self.records.insert(key, record);
        previous
    }

    /// Move the generator past an explicit numeric key.
    fn advance_generator(&mut self, n: f64) {
        if n.is_nan() || n < self.next_key as f64 {
            return;
        }
        self.next_key = if n >= MAX_GENERATED_KEY as f64 {
            MAX_GENERATED_KEY + 1
        } else {
            n.floor() as i64 + 1
        };
    }

    pub fn count(&self, source: &ScanSource, term: Option<&Term>) -> Result<u64, EngineError> {
        Ok(self.scan(source, term)?.len() as u64)
    }

    /// Every entry visible to `source` and matching `term`, in ascending
    /// (scan key, primary key) order.
    pub fn scan(
        &self,
        source: &ScanSource,
        term: Option<&Term>,
    ) -> Result<Vec<(Key, Key, &Value)>, EngineError> {
        let matches = |key: &Key| term.map_or(true, |t| t.contains(key));
        match source {
            ScanSource::Primary => Ok(self
                .records
                .iter()
                .filter(|(pk, _)| matches(*pk))
                .map(|(pk, value)| (pk.clone(), pk.clone(), value))
                .collect()),
            ScanSource::Index(name) => Ok(self
                .index(name)?
                .entries
                .iter()
                .filter(|(key, _)| matches(key))
                .filter_map(|(key, pk)| {
                    let value = self.records.get(pk)?;
                    Some((key.clone(), pk.clone(), value))
                })
                .collect()),
        }
    }

    /// The first entry strictly after `position` in scan order.
    pub fn next_after(
        &self,
        source: &ScanSource,
        term: Option<&Term>,
        position: Option<&(Key, Key)>,
    ) -> Result<Option<(Key, Key, Value)>, EngineError> {
        let matches = |key: &Key| term.map_or(true, |t| t.contains(key));
        let next = match source {
            ScanSource::Primary => {
                let lower = match position {
                    Some((_, pk)) => Bound::Excluded(pk.clone()),
                    None => Bound::Unbounded,
                };
                self.records
                    .range((lower, Bound::Unbounded))
                    .find(|(key, _)| matches(*key))
                    .map(|(key, value)| (key.clone(), key.clone(), value.clone()))
            }
            ScanSource::Index(name) => {
                let lower = match position {
                    Some(position) => Bound::Excluded(position.clone()),
                    None => Bound::Unbounded,
                };
                self.index(name)?
                    .entries
                    .range((lower, Bound::Unbounded))
                    .find(|(key, _)| matches(key))
                    .and_then(|(key, pk)| {
                        let value = self.records.get(pk)?;
                        Some((key.clone(), pk.clone(), value.clone()))
                    })
            }
        };
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fruit_store() -> StoreData {
        let mut store = StoreData::new(KeyPath::parse("name").unwrap(), false);
        store
            .add_index("color", IndexDef::new(KeyPath::parse("color").unwrap(), false))
            .unwrap();
        for (name, color) in [
            ("apple", "green"),
            ("banana", "yellow"),
            ("grape", "purple"),
            ("pineapple", "yellow"),
        ] {
            store.put(json!({"name": name, "color": color})).unwrap();
        }
        store
    }

    #[test]
    fn put_replaces_existing_record() {
        let mut store = fruit_store();
        let (key, previous) = store.put(json!({"name": "apple", "color": "red"})).unwrap();
        assert_eq!(key, Key::from("apple"));
        assert_eq!(previous, Some(json!({"name": "apple", "color": "green"})));
        assert_eq!(store.records.len(), 4);
    }

    #[test]
    fn put_without_key_is_data_error() {
        let mut store = fruit_store();
        let err = store.put(json!({"color": "blue"})).unwrap_err();
        assert!(matches!(err, EngineError::Data(_)));
    }

    #[test]
    fn auto_increment_generates_and_tracks_keys() {
        let mut store = StoreData::new(KeyPath::parse("id").unwrap(), true);
        let (first, _) = store.put(json!({"v": 1})).unwrap();
        assert_eq!(first, Key::from(1i64));
        store.put(json!({"id": 10, "v": 2})).unwrap();
        let (next, _) = store.put(json!({"v": 3})).unwrap();
        assert_eq!(next, Key::from(11i64));
        assert_eq!(store.records[&next], json!({"id": 11, "v": 3}));
    }

    #[test]
    fn unique_index_rejects_duplicates() {
        let mut store = StoreData::new(KeyPath::parse("id").unwrap(), false);
        store
            .add_index("email", IndexDef::new(KeyPath::parse("email").unwrap(), true))
            .unwrap();
        store.put(json!({"id": 1, "email": "a@x"})).unwrap();
        // Rewriting the same record keeps its own index entry.
        store.put(json!({"id": 1, "email": "a@x"})).unwrap();
        let err = store.put(json!({"id": 2, "email": "a@x"})).unwrap_err();
        assert!(matches!(err, EngineError::Constraint(_)));
    }

    #[test]
    fn index_scan_orders_by_index_then_primary_key() {
        let store = fruit_store();
        let source = ScanSource::Index("color".to_string());
        let keys: Vec<_> = store
            .scan(&source, None)
            .unwrap()
            .into_iter()
            .map(|(_, pk, _)| pk)
            .collect();
        assert_eq!(
            keys,
            vec![
                Key::from("apple"),
                Key::from("grape"),
                Key::from("banana"),
                Key::from("pineapple")
            ]
        );
        let yellow = Term::from("yellow");
        assert_eq!(store.count(&source, Some(&yellow)).unwrap(), 2);
    }

    #[test]
    fn next_after_walks_primary_keys() {
        let store = fruit_store();
        let first = store.next_after(&ScanSource::Primary, None, None).unwrap().unwrap();
        assert_eq!(first.1, Key::from("apple"));
        let position = (first.0.clone(), first.1.clone());
        let second = store
            .next_after(&ScanSource::Primary, None, Some(&position))
            .unwrap()
            .unwrap();
        assert_eq!(second.1, Key::from("banana"));
    }

    #[test]
    fn undo_restores_previous_contents() {
        let mut db = DbState::default();
        db.stores.insert("fruit".to_string(), fruit_store());
        let (_, previous) = db
            .store_mut("fruit")
            .unwrap()
            .put(json!({"name": "apple", "color": "red"}))
            .unwrap();
        let (_, none) = db
            .store_mut("fruit")
            .unwrap()
            .put(json!({"name": "kiwi", "color": "brown"}))
            .unwrap();
        db.undo(vec![
            Undo {
                store: "fruit".to_string(),
                key: Key::from("apple"),
                previous,
            },
            Undo {
                store: "fruit".to_string(),
                key: Key::from("kiwi"),
                previous: none,
            },
        ]);
        let fruit = db.store("fruit").unwrap();
        assert_eq!(fruit.records[&Key::from("apple")]["color"], "green");
        assert!(!fruit.records.contains_key(&Key::from("kiwi")));
    }

    #[test]
    fn explicit_key_past_generator_limit_exhausts_it() {
        let mut store = StoreData::new(KeyPath::parse("id").unwrap(), true);
        let (key, _) = store.put(json!({"id": 1e19, "v": 1})).unwrap();
        assert_eq!(key, Key::number(1e19).unwrap());
        assert_eq!(store.next_key, MAX_GENERATED_KEY + 1);

        let err = store.put(json!({"v": 2})).unwrap_err();
        assert!(matches!(err, EngineError::Constraint(_)));
        assert_eq!(store.records.len(), 1);

        // Explicit keys are still accepted once the generator is spent.
        store.put(json!({"id": 5, "v": 3})).unwrap();
        assert_eq!(store.records.len(), 2);
    }

    #[test]
    fn generator_hands_out_its_last_key() {
        let mut store = StoreData::new(KeyPath::parse("id").unwrap(), true);
        store.put(json!({"id": (MAX_GENERATED_KEY - 1) as f64})).unwrap();
        let (last, _) = store.put(json!({"v": 1})).unwrap();
        assert_eq!(last, Key::from(MAX_GENERATED_KEY));
        assert!(matches!(
            store.put(json!({"v": 2})).unwrap_err(),
            EngineError::Constraint(_)
        ));
    }

    #[test]
    fn rejected_put_leaves_generator_alone() {
        let mut store = StoreData::new(KeyPath::parse("id").unwrap(), true);
        store
            .add_index("email", IndexDef::new(KeyPath::parse("email").unwrap(), true))
            .unwrap();
        store.put(json!({"id": 1, "email": "a@x"})).unwrap();
        store.put(json!({"id": 50, "email": "a@x"})).unwrap_err();
        let (next, _) = store.put(json!({"email": "b@x"})).unwrap();
        assert_eq!(next, Key::from(2i64));
    }

    #[test]
    fn index_walk_follows_puts_and_removes() {
        let mut store = fruit_store();
        let source = ScanSource::Index("color".to_string());
        store.put(json!({"name": "banana", "color": "brown"})).unwrap();
        store.remove(&Key::from("grape"));
        store.put(json!({"name": "lemon", "color": "yellow"})).unwrap();

        let mut walked = Vec::new();
        let mut position = None;
        while let Some((key, pk, _)) = store.next_after(&source, None, position.as_ref()).unwrap() {
            walked.push(pk.clone());
            position = Some((key, pk));
        }
        assert_eq!(
            walked,
            vec![
                Key::from("banana"),
                Key::from("apple"),
                Key::from("lemon"),
                Key::from("pineapple")
            ]
        );
        assert_eq!(store.index("color").unwrap().entries.len(), 4);
    }

    #[test]
    fn index_added_late_covers_existing_records() {
        let mut store = StoreData::new(KeyPath::parse("name").unwrap(), false);
        store.put(json!({"name": "apple", "color": "green"})).unwrap();
        store.put(json!({"name": "kiwi"})).unwrap();
        store
            .add_index("color", IndexDef::new(KeyPath::parse("color").unwrap(), false))
            .unwrap();
        let source = ScanSource::Index("color".to_string());
        assert_eq!(store.count(&source, None).unwrap(), 1);

        store.put(json!({"name": "lime", "color": "green"})).unwrap();
        let err = store
            .add_index("hue", IndexDef::new(KeyPath::parse("color").unwrap(), true))
            .unwrap_err();
        assert!(matches!(err, EngineError::Constraint(_)));
    }
}
