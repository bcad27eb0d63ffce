//! Compose store – dynamic-schema metadata kept in a relational store.
//!
//! Tenants (namespaces) define their own object types, called *modules*, and
//! each module carries an ordered list of user-defined attributes, called
//! *fields*. This crate persists both and offers lookups over them:
//! * A [`construct::Module`] belongs to one namespace and is addressed by id,
//!   by handle (short machine name) or by display name. Handles and names are
//!   unique per namespace, ignoring case, among modules that are not deleted.
//! * A [`construct::Field`] belongs to one module and has a `place` in its
//!   module's field list.
//! * Modules are soft deleted (a deletion timestamp hides them from every
//!   lookup); fields are removed for good when a new field list omits them.
//!
//! ## Modules
//! * [`construct`] – Entities, sets, the lookup filter, identity generation and
//!   the [`construct::Database`] that wires everything together.
//! * [`datatype`] – JSON blobs and the clock used for timestamps.
//! * [`query`] – Predicate and ordering trees, independent of SQL.
//! * [`persist`] – SQLite schema, row mapping and lowering of query trees.
//! * [`store`] – [`store::ModuleStore`]: module lookups, paging and writes.
//! * [`reconcile`] – [`reconcile::FieldReconciler`]: synchronizing a module's fields.
//! * [`settings`] – Configuration file and environment handling.
//!
//! ## Quick Start
//! ```
//! use compose_store::construct::{Database, Field, FieldSet, Module, ModuleFilter, PersistenceMode};
//! let db = Database::new(PersistenceMode::InMemory).unwrap();
//! let modules = db.modules();
//! let customer = modules.create(Module::new(1, "customer", "Customer")).unwrap();
//! let mut fields = FieldSet(vec![Field::new("email", "Email"), Field::new("name", "String")]);
//! modules.update_fields(customer.id, &mut fields, false).unwrap();
//! let (found, filter) = modules
//!     .find(ModuleFilter { namespace_id: 1, query: "cust".into(), ..Default::default() })
//!     .unwrap();
//! assert_eq!(filter.count, 1);
//! assert_eq!(found[0].handle, "customer");
//! ```
//!
//! ## Atomicity
//! Nothing in this crate opens transactions. Callers that need a field update
//! to be all-or-nothing bind a store to a transaction with
//! [`store::ModuleStore::with`] and commit or roll back themselves.

pub mod construct;
pub mod datatype;
pub mod error;
pub mod persist;
pub mod query;
pub mod reconcile;
pub mod settings;
pub mod store;

pub use error::{Result, StoreError};
