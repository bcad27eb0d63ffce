//! Module storage: lookups, filtered paging and writes over `compose_module`,
//! plus read access to `compose_module_field`.

use std::sync::Arc;

use rusqlite::types::Value;
use rusqlite::{Connection, Row};
use tracing::{debug, info};

use crate::construct::{Field, FieldSet, Id, IdGenerator, Module, ModuleFilter, ModuleSet};
use crate::datatype::Clock;
use crate::error::{Result, StoreError};
use crate::persist::{Persistor, Record, id_column, id_value, optional_time_value, time_value};
use crate::query::{Direction, Expr, Literal, OrderBy, Predicate, Select, active, parse_order};
use crate::reconcile::FieldReconciler;

const DEFAULT_SORT: &str = "id ASC";

/// Module ids bound per field lookup, well below SQLite's parameter limit.
pub const FIELD_LOOKUP_CHUNK: usize = 500;

impl Record for Module {
    const TABLE: &'static str = "compose_module";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "rel_namespace",
        "handle",
        "name",
        "json",
        "created_at",
        "updated_at",
        "deleted_at",
    ];
    fn key(&self) -> Id {
        self.id
    }
    fn values(&self) -> Vec<Value> {
        vec![
            id_value(self.id),
            id_value(self.namespace_id),
            Value::Text(self.handle.clone()),
            Value::Text(self.name.clone()),
            Value::Text(self.json.to_string()),
            time_value(&self.created_at),
            optional_time_value(&self.updated_at),
            optional_time_value(&self.deleted_at),
        ]
    }
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Module {
            id: id_column(row, 0)?,
            namespace_id: id_column(row, 1)?,
            handle: row.get(2)?,
            name: row.get(3)?,
            json: row.get(4)?,
            fields: FieldSet::default(),
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
            deleted_at: row.get(7)?,
        })
    }
}

impl Record for Field {
    const TABLE: &'static str = "compose_module_field";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "rel_module",
        "place",
        "kind",
        "name",
        "label",
        "options",
        "is_private",
        "is_required",
        "is_visible",
        "is_multi",
        "default_value",
        "created_at",
        "updated_at",
        "deleted_at",
    ];
    fn key(&self) -> Id {
        self.id
    }
    fn values(&self) -> Vec<Value> {
        vec![
            id_value(self.id),
            id_value(self.module_id),
            Value::Integer(self.place as i64),
            Value::Text(self.kind.clone()),
            Value::Text(self.name.clone()),
            Value::Text(self.label.clone()),
            Value::Text(self.options.to_string()),
            Value::Integer(self.is_private as i64),
            Value::Integer(self.is_required as i64),
            Value::Integer(self.is_visible as i64),
            Value::Integer(self.is_multi as i64),
            Value::Text(self.default_value.to_string()),
            time_value(&self.created_at),
            optional_time_value(&self.updated_at),
            optional_time_value(&self.deleted_at),
        ]
    }
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Field {
            id: id_column(row, 0)?,
            module_id: id_column(row, 1)?,
            place: row.get(2)?,
            kind: row.get(3)?,
            name: row.get(4)?,
            label: row.get(5)?,
            options: row.get(6)?,
            is_private: row.get(7)?,
            is_required: row.get(8)?,
            is_visible: row.get(9)?,
            is_multi: row.get(10)?,
            default_value: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
            deleted_at: row.get(14)?,
        })
    }
}

/// Request-scoped access to modules and their fields.
///
/// The store is bound to one connection handle; use [`ModuleStore::with`] to
/// run the same operations against another handle such as an open
/// transaction. A connection other than the one [`Database`] opened needs
/// [`register_functions`] first.
///
/// [`Database`]: crate::construct::Database
/// [`register_functions`]: crate::persist::register_functions
pub struct ModuleStore<'db> {
    persistor: Persistor<'db>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl<'db> ModuleStore<'db> {
    pub fn new(
        connection: &'db Connection,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
    ) -> ModuleStore<'db> {
        ModuleStore {
            persistor: Persistor::new(connection),
            ids,
            clock,
        }
    }
    pub fn with<'c>(&self, connection: &'c Connection) -> ModuleStore<'c> {
        ModuleStore::new(connection, Arc::clone(&self.ids), Arc::clone(&self.clock))
    }
    pub(crate) fn persistor(&self) -> &Persistor<'db> {
        &self.persistor
    }
    pub(crate) fn ids(&self) -> &dyn IdGenerator {
        self.ids.as_ref()
    }
    pub(crate) fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    fn query(&self) -> Select {
        Select::from(Module::TABLE, Module::COLUMNS).filter(active())
    }

    pub fn find_by_id(&self, namespace_id: Id, module_id: Id) -> Result<Module> {
        self.find_one_by(namespace_id, Expr::column("id"), module_id.into())
    }
    pub fn find_by_handle(&self, namespace_id: Id, handle: &str) -> Result<Module> {
        self.find_one_by(
            namespace_id,
            Expr::lower("handle"),
            handle.trim().to_lowercase().into(),
        )
    }
    pub fn find_by_name(&self, namespace_id: Id, name: &str) -> Result<Module> {
        self.find_one_by(
            namespace_id,
            Expr::lower("name"),
            name.trim().to_lowercase().into(),
        )
    }
    fn find_one_by(&self, namespace_id: Id, field: Expr, value: Literal) -> Result<Module> {
        let query = self
            .query()
            .filter(field.eq(value))
            .filter(Expr::column("rel_namespace").eq(namespace_id));
        self.persistor
            .fetch_one(&query)?
            .ok_or(StoreError::NotFound)
    }

    /// Looks up active modules matching the filter.
    ///
    /// Returns the matching page together with the filter as it was applied:
    /// the default sort filled in and `count` set to the number of matches
    /// across all pages. When nothing matches, no page is fetched.
    pub fn find(&self, filter: ModuleFilter) -> Result<(ModuleSet, ModuleFilter)> {
        let mut f = filter;
        // a spec with nothing but blank terms counts as no spec at all
        let mut order = parse_order(&f.sort, Module::COLUMNS)?;
        if order.is_empty() {
            f.sort = DEFAULT_SORT.to_string();
            order = parse_order(DEFAULT_SORT, Module::COLUMNS)?;
        }

        let mut query = self.query();
        if f.namespace_id > 0 {
            query = query.filter(Expr::column("rel_namespace").eq(f.namespace_id));
        }
        if !f.query.is_empty() {
            let q = format!("%{}%", f.query.to_lowercase());
            query = query.filter(Predicate::or(vec![
                Expr::lower("name").like(q.clone()),
                Expr::lower("handle").like(q),
            ]));
        }
        if !f.name.is_empty() {
            query = query.filter(Expr::lower("name").eq(f.name.to_lowercase()));
        }
        if !f.handle.is_empty() {
            query = query.filter(Expr::lower("handle").eq(f.handle.to_lowercase()));
        }
        if let Some(readable) = f.is_readable.as_ref().filter(|p| !p.is_empty()) {
            query = query.filter(readable.clone());
        }
        query = query.order_by(order);

        f.count = self.persistor.count(&query)?;
        if f.count == 0 {
            return Ok((ModuleSet::default(), f));
        }
        let set = ModuleSet(self.persistor.fetch_paged(&query, f.page, f.per_page)?);
        Ok((set, f))
    }

    pub fn create(&self, mut module: Module) -> Result<Module> {
        module.id = self.ids.next_id();
        module.created_at = self.clock.now();
        module.updated_at = None;
        self.persistor.insert(&module)?;
        info!(module_id = module.id, namespace_id = module.namespace_id, handle = %module.handle, "module created");
        Ok(module)
    }

    /// Writes the module as given; the caller merges changes beforehand.
    pub fn update(&self, mut module: Module) -> Result<Module> {
        module.updated_at = Some(self.clock.now());
        self.persistor.update(&module)?;
        debug!(module_id = module.id, "module updated");
        Ok(module)
    }

    /// Synchronizes the module's fields with `fields`, see [`FieldReconciler`].
    pub fn update_fields(&self, module_id: Id, fields: &mut FieldSet, has_records: bool) -> Result<()> {
        FieldReconciler::new(self).update_fields(module_id, fields, has_records)
    }

    /// Soft deletes a module. Deleting a module that does not exist is not an error.
    pub fn delete_by_id(&self, namespace_id: Id, module_id: Id) -> Result<()> {
        let affected = self.persistor.exec(
            &format!(
                "UPDATE {} SET deleted_at = ? WHERE rel_namespace = ? AND id = ?",
                Module::TABLE
            ),
            &[time_value(&self.clock.now()), id_value(namespace_id), id_value(module_id)],
        )?;
        debug!(namespace_id, module_id, affected, "module soft deleted");
        Ok(())
    }

    /// Active fields of the given modules, ordered by module and place.
    ///
    /// Ids are looked up [`FIELD_LOOKUP_CHUNK`] at a time in ascending order,
    /// so any number of modules can be passed.
    pub fn find_fields(&self, module_ids: &[Id]) -> Result<FieldSet> {
        let mut ids = module_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();
        let mut fields = FieldSet::default();
        for chunk in ids.chunks(FIELD_LOOKUP_CHUNK) {
            let query = Select::from(Field::TABLE, Field::COLUMNS)
                .filter(Expr::column("rel_module").is_in(chunk.iter().copied()))
                .filter(active())
                .order_by(vec![
                    OrderBy { column: "rel_module".into(), direction: Direction::Asc },
                    OrderBy { column: "place".into(), direction: Direction::Asc },
                ]);
            fields.extend(self.persistor.fetch_paged::<Field>(&query, 1, 0)?);
        }
        Ok(fields)
    }

    /// Attaches each module's active fields, using a single lookup.
    pub fn load_fields(&self, modules: &mut [Module]) -> Result<()> {
        let ids: Vec<Id> = modules.iter().map(|m| m.id).collect();
        let fields = self.find_fields(&ids)?;
        for module in modules.iter_mut() {
            module.fields = fields.filter_by_module(module.id);
        }
        Ok(())
    }
}
