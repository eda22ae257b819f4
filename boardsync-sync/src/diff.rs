//! Diff engine: classify a store snapshot against a board snapshot.
//!
//! # Join key
//!
//! Board items are correlated with records through the mapping's join
//! column, which holds the record id and is never edited from the board
//! side. An item with no join key yet (created on the board, then linked
//! into the store by the webhook) is matched through the record's stored
//! board item id instead.
//!
//! # Comparison
//!
//! Values are compared by decoded value in canonical string form, never by
//! timestamp. The store is authoritative: any difference in a watched field,
//! the item name or the join column produces an update.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use boardsync_core::{BoardItem, ColumnMapping, DomainRecord, ExternalId, RecordId};

/// Create / update / delete plan for one board.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChangeSet {
    pub to_create: Vec<DomainRecord>,
    pub to_update: Vec<(ExternalId, DomainRecord)>,
    pub to_delete: Vec<ExternalId>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }

    pub fn len(&self) -> usize {
        self.to_create.len() + self.to_update.len() + self.to_delete.len()
    }
}

/// Compute the [`ChangeSet`] that makes `items` mirror `records`.
pub fn diff(records: &[DomainRecord], items: &[BoardItem], mapping: &ColumnMapping) -> ChangeSet {
    let by_id: BTreeMap<RecordId, &DomainRecord> = records.iter().map(|r| (r.id, r)).collect();
    let by_link: HashMap<&ExternalId, RecordId> = records
        .iter()
        .filter_map(|r| r.external_id.as_ref().map(|ext| (ext, r.id)))
        .collect();

    let mut changes = ChangeSet::default();
    let mut matched: BTreeMap<RecordId, &BoardItem> = BTreeMap::new();

    for item in items {
        let key = mapping
            .join_key_of(&item.values)
            .or_else(|| by_link.get(&item.id).copied());
        let Some(key) = key else {
            // Neither keyed nor linked: nothing in the store owns it.
            changes.to_delete.push(item.id.clone());
            continue;
        };
        if !by_id.contains_key(&key) {
            changes.to_delete.push(item.id.clone());
            continue;
        }
        let previous = matched.get(&key).map(|p| p.id.clone());
        match previous {
            None => {
                matched.insert(key, item);
            }
            Some(previous) => {
                // Two items claim one record. Keep the linked one, else the first.
                let linked = by_id[&key].external_id.as_ref();
                if linked == Some(&item.id) {
                    changes.to_delete.push(previous);
                    matched.insert(key, item);
                } else {
                    changes.to_delete.push(item.id.clone());
                }
            }
        }
    }

    for (id, record) in &by_id {
        match matched.get(id) {
            None => changes.to_create.push((*record).clone()),
            Some(item) if differs(record, item, mapping) => {
                changes.to_update.push((item.id.clone(), (*record).clone()));
            }
            Some(_) => {}
        }
    }

    changes
}

/// Whether `item` disagrees with `record` on the name, the join key or any
/// watched field.
pub fn differs(record: &DomainRecord, item: &BoardItem, mapping: &ColumnMapping) -> bool {
    if record.name.trim() != item.name.trim() {
        return true;
    }
    if mapping.join_key_of(&item.values) != Some(record.id) {
        return true;
    }
    mapping.columns.iter().any(|spec| {
        let board_text = item.values.get(&spec.column).map(String::as_str).unwrap_or("");
        let on_board = spec.encoding.decode(board_text).canonical();
        match spec.encoding.encode(&spec.field, record.attribute(&spec.field)) {
            Ok(text) => spec.encoding.decode(&text).canonical() != on_board,
            // Unencodable values always count as changed; the executor
            // reports the mapping error for the item.
            Err(_) => true,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use boardsync_core::{ColumnEncoding, ColumnSpec, FieldValue};
    use std::collections::HashSet;

    fn mapping() -> ColumnMapping {
        ColumnMapping::new(
            "join",
            vec![
                ColumnSpec::new("category", "text0", ColumnEncoding::Text),
                ColumnSpec::new("kits", "numbers", ColumnEncoding::Number),
                ColumnSpec::new("created_at", "date4", ColumnEncoding::Timestamp),
            ],
        )
    }

    fn mirrored(record: &DomainRecord, id: &str) -> BoardItem {
        BoardItem {
            id: ExternalId::from(id),
            name: record.name.clone(),
            values: mapping().to_column_values(record).unwrap(),
        }
    }

    #[test]
    fn numeric_and_timestamp_formatting_is_not_a_difference() {
        let record = DomainRecord::new(1, "Rose")
            .with("kits", FieldValue::Integer(3))
            .with("created_at", FieldValue::Text("2024-01-05 10:00:00".into()));
        let item = BoardItem::new("9", "Rose")
            .with("join", "1")
            .with("numbers", "3.0")
            .with("date4", "2024-01-05T10:00:00+00:00")
            .with("text0", "");
        assert!(!differs(&record, &item, &mapping()));
    }

    #[test]
    fn renamed_item_is_an_update() {
        let record = DomainRecord::new(1, "Rose");
        let mut item = mirrored(&record, "9");
        item.name = "Rosa".into();
        let changes = diff(&[record], &[item], &mapping());
        assert_eq!(changes.to_update.len(), 1);
    }

    #[test]
    fn linked_item_without_join_key_is_matched_and_backfilled() {
        let mut record = DomainRecord::new(4, "Oud");
        record.external_id = Some(ExternalId::from("9"));
        let item = BoardItem::new("9", "Oud");

        let changes = diff(&[record], &[item], &mapping());
        assert!(changes.to_create.is_empty());
        assert!(changes.to_delete.is_empty());
        assert_eq!(changes.to_update[0].0, ExternalId::from("9"));
    }

    #[test]
    fn duplicate_items_for_one_record_keep_the_linked_item() {
        let mut record = DomainRecord::new(1, "Rose");
        record.external_id = Some(ExternalId::from("12"));
        let a = mirrored(&record, "11");
        let b = mirrored(&record, "12");

        let changes = diff(&[record], &[a, b], &mapping());
        assert_eq!(changes.to_delete, vec![ExternalId::from("11")]);
        assert!(changes.to_update.is_empty());
        assert!(changes.to_create.is_empty());
    }

    #[test]
    fn unkeyed_unlinked_items_are_deleted() {
        let changes = diff(&[], &[BoardItem::new("5", "stray")], &mapping());
        assert_eq!(changes.to_delete, vec![ExternalId::from("5")]);
    }

    #[test]
    fn unencodable_value_is_planned_as_update() {
        let record = DomainRecord::new(1, "Rose").with("kits", FieldValue::Text("many".into()));
        let item = BoardItem::new("9", "Rose").with("join", "1");
        assert!(differs(&record, &item, &mapping()));
    }

    #[test]
    fn classification_lists_are_disjoint() {
        let records: Vec<_> = (1..=6)
            .map(|i| DomainRecord::new(i, format!("r{i}")).with("kits", FieldValue::Integer(i)))
            .collect();
        let mut items = vec![
            mirrored(&records[0], "100"),
            mirrored(&records[1], "101"),
            mirrored(&records[1], "102"),
            BoardItem::new("103", "ghost").with("join", "42"),
            BoardItem::new("104", "stray"),
        ];
        items[0].values.insert("text0".into(), "changed".into());

        let changes = diff(&records, &items, &mapping());
        let created: HashSet<_> = changes.to_create.iter().map(|r| r.id).collect();
        let updated: HashSet<_> = changes.to_update.iter().map(|(_, r)| r.id).collect();
        let updated_items: HashSet<_> = changes.to_update.iter().map(|(e, _)| e.clone()).collect();
        let deleted: HashSet<_> = changes.to_delete.iter().cloned().collect();

        assert!(created.is_disjoint(&updated));
        assert!(updated_items.is_disjoint(&deleted));
        assert_eq!(created.len(), 4);
        assert_eq!(updated.len(), 1);
        assert_eq!(deleted.len(), 3);
    }
}
