use std::sync::{Arc, Mutex, PoisonError};

// identities are hashed a lot while diffing field sets
use core::hash::BuildHasherDefault;
use seahash::SeaHasher;

// used to print out readable forms of a construct
use std::fmt;
use std::ops::{Deref, DerefMut};

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::info;

// our own stuff that we need
use crate::datatype::{Clock, Json, SystemClock};
use crate::error::Result;
use crate::persist::Persistor;
use crate::query::Predicate;
use crate::settings::Settings;
use crate::store::ModuleStore;

// ------------- Identities -------------
pub type Id = u64;

pub type IdHasher = BuildHasherDefault<SeaHasher>;

/// Issues globally unique, roughly time-ordered identities.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> Id;
}

const TICK_MILLIS: i64 = 10;
const SEQUENCE_BITS: u32 = 8;
const MACHINE_BITS: u32 = 16;
const SEQUENCE_MASK: u16 = (1 << SEQUENCE_BITS) - 1;

#[derive(Debug, Default)]
struct SnowflakeState {
    elapsed: u64,
    sequence: u16,
}

/// Identity layout, most significant first: 39 bits of 10 ms ticks since the
/// epoch, 8 bits of sequence, 16 bits of machine id. Identities from one
/// generator are strictly increasing; when the sequence runs out within a
/// tick the generator borrows the next tick instead of sleeping.
#[derive(Debug)]
pub struct Snowflake {
    machine_id: u16,
    epoch: DateTime<Utc>,
    state: Mutex<SnowflakeState>,
}
impl Snowflake {
    pub fn new(machine_id: u16) -> Self {
        Self {
            machine_id,
            epoch: Utc
                .with_ymd_and_hms(2014, 9, 1, 0, 0, 0)
                .single()
                .unwrap_or_default(),
            state: Mutex::new(SnowflakeState::default()),
        }
    }
    fn ticks(&self) -> u64 {
        let millis = (Utc::now() - self.epoch).num_milliseconds();
        (millis / TICK_MILLIS).max(0) as u64
    }
}
impl IdGenerator for Snowflake {
    fn next_id(&self) -> Id {
        let now = self.ticks();
        // the guarded state is two integers, so a poisoned lock is still usable
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if now > state.elapsed {
            state.elapsed = now;
            state.sequence = 0;
        } else {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                state.elapsed += 1;
            }
        }
        (state.elapsed << (SEQUENCE_BITS + MACHINE_BITS))
            | ((state.sequence as u64) << MACHINE_BITS)
            | self.machine_id as u64
    }
}

// ------------- Module -------------
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub id: Id,
    pub namespace_id: Id,
    pub handle: String,
    pub name: String,
    pub json: Json,
    // not persisted with the module, see ModuleStore::load_fields
    #[serde(default)]
    pub fields: FieldSet,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}
impl Module {
    pub fn new(namespace_id: Id, handle: &str, name: &str) -> Self {
        Self {
            namespace_id,
            handle: handle.to_string(),
            name: name.to_string(),
            ..Self::default()
        }
    }
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}
impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} [{}, {}]", self.id, self.handle, self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleSet(pub Vec<Module>);
impl ModuleSet {
    pub fn ids(&self) -> Vec<Id> {
        self.0.iter().map(|m| m.id).collect()
    }
    pub fn find_by_id(&self, id: Id) -> Option<&Module> {
        self.0.iter().find(|m| m.id == id)
    }
    pub fn find_by_handle(&self, handle: &str) -> Option<&Module> {
        let handle = handle.trim().to_lowercase();
        self.0.iter().find(|m| m.handle.to_lowercase() == handle)
    }
    pub fn walk<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&Module) -> Result<()>,
    {
        self.0.iter().try_for_each(|m| f(m))
    }
}
impl Deref for ModuleSet {
    type Target = Vec<Module>;
    fn deref(&self) -> &Vec<Module> {
        &self.0
    }
}
impl DerefMut for ModuleSet {
    fn deref_mut(&mut self) -> &mut Vec<Module> {
        &mut self.0
    }
}
impl FromIterator<Module> for ModuleSet {
    fn from_iter<I: IntoIterator<Item = Module>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ------------- Field -------------
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub id: Id,
    pub module_id: Id,
    pub place: u32,
    pub kind: String,
    pub name: String,
    pub label: String,
    pub options: Json,
    pub is_private: bool,
    pub is_required: bool,
    pub is_visible: bool,
    pub is_multi: bool,
    pub default_value: Json,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}
impl Field {
    pub fn new(name: &str, kind: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: kind.to_string(),
            is_visible: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldSet(pub Vec<Field>);
impl FieldSet {
    pub fn find_by_id(&self, id: Id) -> Option<&Field> {
        if id == 0 {
            return None;
        }
        self.0.iter().find(|f| f.id == id)
    }
    pub fn find_by_name(&self, name: &str) -> Option<&Field> {
        self.0.iter().find(|f| f.name == name)
    }
    pub fn filter_by_module(&self, module_id: Id) -> FieldSet {
        self.0
            .iter()
            .filter(|f| f.module_id == module_id)
            .cloned()
            .collect()
    }
    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(|f| f.name.as_str()).collect()
    }
    pub fn walk<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&Field) -> Result<()>,
    {
        self.0.iter().try_for_each(|field| f(field))
    }
}
impl Deref for FieldSet {
    type Target = Vec<Field>;
    fn deref(&self) -> &Vec<Field> {
        &self.0
    }
}
impl DerefMut for FieldSet {
    fn deref_mut(&mut self) -> &mut Vec<Field> {
        &mut self.0
    }
}
impl FromIterator<Field> for FieldSet {
    fn from_iter<I: IntoIterator<Item = Field>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ------------- Filter -------------
/// Input and output of `ModuleStore::find`.
///
/// `page` is 1-based and `per_page == 0` means "no limit". `count` is ignored
/// on input and filled in with the total number of matching rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleFilter {
    pub namespace_id: Id,
    pub query: String,
    pub name: String,
    pub handle: String,
    pub sort: String,
    pub page: u32,
    pub per_page: u32,
    // produced by the caller's access control, never by deserialization
    #[serde(skip)]
    pub is_readable: Option<Predicate>,
    pub count: u64,
}

// ------------- Database -------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceMode {
    InMemory,
    File(String),
}

/// Owns the connection together with the collaborators every store needs.
pub struct Database {
    connection: Connection,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl Database {
    pub fn new(mode: PersistenceMode) -> Result<Self> {
        Self::with_collaborators(mode, Arc::new(Snowflake::new(0)), Arc::new(SystemClock::default()))
    }
    pub fn with_collaborators(
        mode: PersistenceMode,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let connection = match &mode {
            PersistenceMode::InMemory => Connection::open_in_memory()?,
            PersistenceMode::File(path) => Connection::open(path)?,
        };
        Persistor::new(&connection).create_schema()?;
        info!(?mode, "database opened");
        Ok(Self {
            connection,
            ids,
            clock,
        })
    }
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let mode = match &settings.database.path {
            Some(path) => PersistenceMode::File(path.clone()),
            None => PersistenceMode::InMemory,
        };
        Self::with_collaborators(
            mode,
            Arc::new(Snowflake::new(settings.ids.machine_id)),
            Arc::new(SystemClock::new(settings.clock.rounding_ms)),
        )
    }
    pub fn connection(&self) -> &Connection {
        &self.connection
    }
    // needed to open transactions
    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.connection
    }
    pub fn modules(&self) -> ModuleStore<'_> {
        ModuleStore::new(&self.connection, Arc::clone(&self.ids), Arc::clone(&self.clock))
    }
}
