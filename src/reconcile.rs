//! Field reconciliation.
//!
//! A module's fields are always written as a whole: the caller submits the
//! complete, ordered list it wants and [`FieldReconciler::update_fields`]
//! makes storage match it.
//!
//! * Stored fields whose identity is missing from the list are removed for
//!   good (not soft deleted).
//! * Submitted fields that echo a stored identity keep it, along with their
//!   creation time. Any other identity is replaced by a fresh one.
//! * Position in the list becomes the field's `place`.
//! * Once the module has records, name and kind of stored fields are frozen:
//!   submitted changes to them are silently reverted.
//!
//! Writes happen one row at a time without a transaction of their own. A
//! failure stops the loop and leaves earlier rows written; callers needing
//! all-or-nothing run this inside a transaction (see `ModuleStore::with`).
//! Two concurrent calls for the same module are not serialized here.

use std::collections::HashMap;

use roaring::RoaringTreemap;
use tracing::{debug, info};

use crate::construct::{Field, FieldSet, Id, IdHasher};
use crate::error::Result;
use crate::persist::{Record, id_value};
use crate::store::ModuleStore;

pub struct FieldReconciler<'s, 'db> {
    store: &'s ModuleStore<'db>,
}

impl<'s, 'db> FieldReconciler<'s, 'db> {
    pub fn new(store: &'s ModuleStore<'db>) -> Self {
        Self { store }
    }

    /// Makes the module's stored fields match `fields`.
    ///
    /// On success `fields` holds what was written: identities, places and
    /// timestamps filled in.
    pub fn update_fields(&self, module_id: Id, fields: &mut FieldSet, has_records: bool) -> Result<()> {
        let existing = self.store.find_fields(&[module_id])?;

        let desired: RoaringTreemap = fields.iter().map(|f| f.id).filter(|id| *id != 0).collect();
        let mut removed = 0;
        existing.walk(|e| {
            if desired.contains(e.id) {
                return Ok(());
            }
            removed += 1;
            self.delete_field(module_id, e.id)
        })?;

        let kept: HashMap<Id, &Field, IdHasher> = existing.iter().map(|e| (e.id, e)).collect();
        let now = self.store.clock().now();
        let mut created = 0;
        for (place, field) in fields.iter_mut().enumerate() {
            match kept.get(&field.id) {
                Some(e) => {
                    field.created_at = e.created_at;
                    if has_records {
                        // renames and kind changes would orphan stored values
                        field.name = e.name.clone();
                        field.kind = e.kind.clone();
                    } else {
                        field.updated_at = Some(now);
                    }
                }
                None => field.id = 0,
            }

            if field.id == 0 {
                field.id = self.store.ids().next_id();
                field.created_at = now;
                created += 1;
            }

            field.module_id = module_id;
            field.place = place as u32;
            field.deleted_at = None;

            self.store
                .persistor()
                .upsert(&*field)
                .map_err(|e| e.context("updating module fields"))?;
            debug!(module_id, field_id = field.id, place, "field written");
        }

        info!(module_id, removed, created, total = fields.len(), has_records, "module fields reconciled");
        Ok(())
    }

    fn delete_field(&self, module_id: Id, field_id: Id) -> Result<()> {
        self.store.persistor().exec(
            &format!("DELETE FROM {} WHERE rel_module = ? AND id = ?", Field::TABLE),
            &[id_value(module_id), id_value(field_id)],
        )?;
        Ok(())
    }
}
