use crate::{
    db::row::Row,
    error::{Error, StoreError},
    model::EntityModel,
    types::Key,
};
use std::collections::BTreeMap;

///
/// Table
///
/// Committed rows for one entity path, with a monotonic key allocator that
/// never re-issues a key or collides with explicitly supplied ones.
///

pub(crate) struct Table {
    model: &'static EntityModel,
    rows: BTreeMap<Key, Row>,
    next_key: u64,
}

impl Table {
    pub(crate) const fn new(model: &'static EntityModel) -> Self {
        Self {
            model,
            rows: BTreeMap::new(),
            next_key: 1,
        }
    }

    pub(crate) const fn model(&self) -> &'static EntityModel {
        self.model
    }

    pub(crate) fn allocate_key(&mut self) -> Key {
        let key = Key::new(self.next_key);
        self.next_key += 1;

        key
    }

    fn note_key(&mut self, key: Key) {
        self.next_key = self.next_key.max(key.get().saturating_add(1));
    }

    pub(crate) fn contains(&self, key: Key) -> bool {
        self.rows.contains_key(&key)
    }

    pub(crate) fn get(&self, key: Key) -> Option<&Row> {
        self.rows.get(&key)
    }

    pub(crate) fn insert(&mut self, key: Key, row: Row) -> Result<(), Error> {
        row.validate(self.model)?;

        if self.rows.contains_key(&key) {
            return Err(StoreError::IntegrityViolation {
                path: self.model.path,
                key,
            }
            .into());
        }

        self.note_key(key);
        self.rows.insert(key, row);

        Ok(())
    }

    /// Merge changed attributes onto the committed row. Plain overwrite:
    /// the store applies no version check (last writer wins).
    pub(crate) fn update(&mut self, key: Key, changes: &Row) -> Result<(), Error> {
        changes.validate(self.model)?;

        let Some(row) = self.rows.get_mut(&key) else {
            return Err(StoreError::NotFound {
                path: self.model.path,
                key,
            }
            .into());
        };

        for (field, value) in changes.iter() {
            row.set(field, value.clone());
        }

        Ok(())
    }

    pub(crate) fn remove(&mut self, key: Key) -> Option<Row> {
        self.rows.remove(&key)
    }

    pub(crate) fn scan(&self) -> impl Iterator<Item = (Key, &Row)> {
        self.rows.iter().map(|(key, row)| (*key, row))
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::{FieldKind, FieldModel},
        value::Value,
    };
    use proptest::prelude::*;

    static FIELDS: &[FieldModel] = &[FieldModel {
        name: "title",
        kind: FieldKind::Text,
    }];

    static MODEL: EntityModel = EntityModel {
        path: "tests::Entity",
        entity_name: "Entity",
        primary_key: "id",
        fields: FIELDS,
    };

    fn titled(title: &str) -> Row {
        let mut row = Row::new();
        row.set("title", Some(Value::from(title)));
        row
    }

    #[test]
    fn insert_rejects_duplicate_keys() {
        let mut table = Table::new(&MODEL);
        table.insert(Key::new(248), titled("Test Movie")).unwrap();

        let err = table
            .insert(Key::new(248), titled("Test Movie"))
            .unwrap_err();
        assert!(err.is_integrity_violation());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn allocator_skips_past_explicit_keys() {
        let mut table = Table::new(&MODEL);
        table.insert(Key::new(248), titled("Test Movie")).unwrap();

        assert_eq!(table.allocate_key(), Key::new(249));
        assert_eq!(table.allocate_key(), Key::new(250));
    }

    #[test]
    fn update_merges_changes_last_writer_wins() {
        let mut table = Table::new(&MODEL);
        table.insert(Key::new(1), titled("first")).unwrap();

        table.update(Key::new(1), &titled("second")).unwrap();
        table.update(Key::new(1), &titled("third")).unwrap();

        assert_eq!(
            table.get(Key::new(1)).and_then(|row| row.value("title")),
            Some(Value::from("third"))
        );
    }

    #[test]
    fn update_of_missing_row_is_not_found() {
        let mut table = Table::new(&MODEL);

        let err = table.update(Key::new(9), &titled("x")).unwrap_err();
        assert!(matches!(
            err,
            Error::Store(StoreError::NotFound { .. })
        ));
    }

    proptest! {
        #[test]
        fn allocated_keys_never_collide(explicit in proptest::collection::btree_set(1u64..500, 0..16), allocations in 1usize..32) {
            let mut table = Table::new(&MODEL);
            for key in &explicit {
                table.insert(Key::new(*key), titled("seed")).unwrap();
            }

            for _ in 0..allocations {
                let key = table.allocate_key();
                prop_assert!(!table.contains(key));
                table.insert(key, titled("allocated")).unwrap();
            }
        }
    }
}
