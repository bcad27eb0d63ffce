// used for persistence
use rusqlite::functions::FunctionFlags;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, params_from_iter};

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use crate::construct::Id;
use crate::error::Result;
use crate::query::{Direction, Expr, Literal, Predicate, Select};

// names of the unique indexes, used to recognize constraint violations
pub const UNIQUE_MODULE_HANDLE: &str = "uid_compose_module_handle";
pub const UNIQUE_MODULE_NAME: &str = "uid_compose_module_name";

/// Case folding used by lookups and unique indexes. SQLite's own `lower()`
/// only folds ASCII, this one folds like `str::to_lowercase`.
pub const LOWER_FUNCTION: &str = "unicode_lower";

/// Registers the functions the schema and the lowered queries depend on.
///
/// [`Persistor::create_schema`] does this already; a connection that skips
/// it cannot use the module indexes and fails with "no such function".
pub fn register_functions(db: &Connection) -> Result<()> {
    db.create_scalar_function(
        LOWER_FUNCTION,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| Ok(ctx.get::<Option<String>>(0)?.map(|s| s.to_lowercase())),
    )?;
    Ok(())
}

/// A row type stored in one table, keyed by a single integer column.
pub trait Record: Sized {
    const TABLE: &'static str;
    /// Column list; `values` and `from_row` use the same order.
    const COLUMNS: &'static [&'static str];
    const PRIMARY_KEY: &'static str = "id";
    fn key(&self) -> Id;
    fn values(&self) -> Vec<Value>;
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

pub fn id_value(id: Id) -> Value {
    Value::Integer(id as i64)
}
pub fn time_value(moment: &DateTime<Utc>) -> Value {
    Value::Text(moment.format("%F %T%.f%:z").to_string())
}
pub fn optional_time_value(moment: &Option<DateTime<Utc>>) -> Value {
    moment.as_ref().map(time_value).unwrap_or(Value::Null)
}
pub fn id_column(row: &Row, index: usize) -> rusqlite::Result<Id> {
    Ok(row.get::<_, i64>(index)? as Id)
}

/// A lowered statement: SQL text with positional placeholders and the values
/// bound to them, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Integer(i) => Value::Integer(*i),
        Literal::Text(s) => Value::Text(s.clone()),
    }
}

fn render_expr(expr: &Expr) -> String {
    match expr {
        Expr::Column(c) => c.clone(),
        Expr::Lower(c) => format!("{}({})", LOWER_FUNCTION, c),
    }
}

fn render_predicate(predicate: &Predicate, sql: &mut String, params: &mut Vec<Value>) {
    match predicate {
        Predicate::IsNull(e) => {
            sql.push_str(&render_expr(e));
            sql.push_str(" IS NULL");
        }
        Predicate::Eq(e, v) => {
            sql.push_str(&render_expr(e));
            sql.push_str(" = ?");
            params.push(literal_value(v));
        }
        Predicate::Like(e, v) => {
            sql.push_str(&render_expr(e));
            sql.push_str(" LIKE ?");
            params.push(literal_value(v));
        }
        Predicate::In(_, values) if values.is_empty() => sql.push_str("1=0"),
        Predicate::In(e, values) => {
            sql.push_str(&render_expr(e));
            sql.push_str(" IN (");
            sql.push_str(&vec!["?"; values.len()].join(","));
            sql.push(')');
            params.extend(values.iter().map(literal_value));
        }
        Predicate::Or(ps) if ps.is_empty() => sql.push_str("1=0"),
        Predicate::Or(ps) => {
            sql.push('(');
            for (i, p) in ps.iter().enumerate() {
                if i > 0 {
                    sql.push_str(" OR ");
                }
                render_predicate(p, sql, params);
            }
            sql.push(')');
        }
        Predicate::Raw { sql: fragment, args } => {
            sql.push_str(fragment);
            params.extend(args.iter().map(literal_value));
        }
    }
}

fn render_where(query: &Select, sql: &mut String, params: &mut Vec<Value>) {
    for (i, p) in query.filters().iter().enumerate() {
        sql.push_str(if i == 0 { " WHERE " } else { " AND " });
        render_predicate(p, sql, params);
    }
}

/// Lowers a query into a select statement, optionally limited to one page.
/// `page` is 1-based; `per_page == 0` selects everything.
pub fn lower_select(query: &Select, page: u32, per_page: u32) -> Statement {
    let mut sql = format!("SELECT {} FROM {}", query.columns().join(", "), query.table());
    let mut params = Vec::new();
    render_where(query, &mut sql, &mut params);
    if !query.order().is_empty() {
        let terms: Vec<String> = query
            .order()
            .iter()
            .map(|o| match o.direction {
                Direction::Asc => format!("{} ASC", o.column),
                Direction::Desc => format!("{} DESC", o.column),
            })
            .collect();
        sql.push_str(" ORDER BY ");
        sql.push_str(&terms.join(", "));
    }
    if per_page > 0 {
        let offset = page.max(1).saturating_sub(1) as i64 * per_page as i64;
        sql.push_str(" LIMIT ? OFFSET ?");
        params.push(Value::Integer(per_page as i64));
        params.push(Value::Integer(offset));
    }
    Statement { sql, params }
}

/// Lowers a query into a count of its rows; ordering is dropped.
pub fn lower_count(query: &Select) -> Statement {
    let mut sql = format!("SELECT COUNT(*) FROM {}", query.table());
    let mut params = Vec::new();
    render_where(query, &mut sql, &mut params);
    Statement { sql, params }
}

// ------------- Persistence -------------
pub struct Persistor<'db> {
    pub db: &'db Connection,
}
impl<'db> Persistor<'db> {
    pub fn new(connection: &Connection) -> Persistor<'_> {
        Persistor { db: connection }
    }
    pub fn create_schema(&self) -> Result<()> {
        // the index expressions below call it
        register_functions(self.db)?;
        // Uniqueness only applies among active rows, hence the partial indexes.
        self.db.execute_batch(
            "
            create table if not exists compose_module (
                id integer not null,
                rel_namespace integer not null,
                handle text not null default '',
                name text not null,
                json text not null default 'null',
                created_at text not null,
                updated_at text null,
                deleted_at text null,
                constraint pk_compose_module primary key (id)
            );
            create unique index if not exists uid_compose_module_handle
                on compose_module (rel_namespace, unicode_lower(handle))
                where deleted_at is null and handle <> '';
            create unique index if not exists uid_compose_module_name
                on compose_module (rel_namespace, unicode_lower(name))
                where deleted_at is null;
            create index if not exists idx_compose_module_namespace
                on compose_module (rel_namespace, deleted_at);
            create table if not exists compose_module_field (
                id integer not null,
                rel_module integer not null,
                place integer not null,
                kind text not null,
                name text not null,
                label text not null default '',
                options text not null default 'null',
                is_private integer not null default 0,
                is_required integer not null default 0,
                is_visible integer not null default 1,
                is_multi integer not null default 0,
                default_value text not null default 'null',
                created_at text not null,
                updated_at text null,
                deleted_at text null,
                constraint pk_compose_module_field primary key (id)
            );
            create index if not exists idx_compose_module_field_module
                on compose_module_field (rel_module, deleted_at);
            ",
        )?;
        Ok(())
    }
    pub fn insert<R: Record>(&self, record: &R) -> Result<()> {
        let placeholders = vec!["?"; R::COLUMNS.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            R::TABLE,
            R::COLUMNS.join(", "),
            placeholders
        );
        trace!(%sql, "insert");
        self.db
            .prepare_cached(&sql)?
            .execute(params_from_iter(record.values()))?;
        Ok(())
    }
    /// Overwrites every non-key column of the row with the same key.
    /// Returns the number of rows affected.
    pub fn update<R: Record>(&self, record: &R) -> Result<usize> {
        let mut assignments = Vec::new();
        let mut params = Vec::new();
        for (column, value) in R::COLUMNS.iter().zip(record.values()) {
            if *column != R::PRIMARY_KEY {
                assignments.push(format!("{} = ?", column));
                params.push(value);
            }
        }
        params.push(id_value(record.key()));
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?",
            R::TABLE,
            assignments.join(", "),
            R::PRIMARY_KEY
        );
        trace!(%sql, "update");
        Ok(self.db.prepare_cached(&sql)?.execute(params_from_iter(params))?)
    }
    /// Update by primary key, insert when nothing was there to update.
    pub fn upsert<R: Record>(&self, record: &R) -> Result<()> {
        if self.update(record)? == 0 {
            self.insert(record)?;
        }
        Ok(())
    }
    pub fn select<R: Record>(&self, sql: &str, args: &[Value]) -> Result<Vec<R>> {
        trace!(%sql, "select");
        let mut statement = self.db.prepare_cached(sql)?;
        let rows = statement.query_map(params_from_iter(args.iter()), |row| R::from_row(row))?;
        Ok(rows.collect::<rusqlite::Result<Vec<R>>>()?)
    }
    pub fn exec(&self, sql: &str, args: &[Value]) -> Result<usize> {
        trace!(%sql, "exec");
        Ok(self.db.prepare_cached(sql)?.execute(params_from_iter(args.iter()))?)
    }
    pub fn count(&self, query: &Select) -> Result<u64> {
        let statement = lower_count(query);
        trace!(sql = %statement.sql, "count");
        let count: i64 = self
            .db
            .prepare_cached(&statement.sql)?
            .query_row(params_from_iter(statement.params.iter()), |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
    pub fn fetch_one<R: Record>(&self, query: &Select) -> Result<Option<R>> {
        let statement = lower_select(query, 1, 1);
        trace!(sql = %statement.sql, "fetch one");
        Ok(self
            .db
            .prepare_cached(&statement.sql)?
            .query_row(params_from_iter(statement.params.iter()), |row| R::from_row(row))
            .optional()?)
    }
    pub fn fetch_paged<R: Record>(&self, query: &Select, page: u32, per_page: u32) -> Result<Vec<R>> {
        let statement = lower_select(query, page, per_page);
        let rows: Vec<R> = self.select(&statement.sql, &statement.params)?;
        debug!(table = query.table(), page, per_page, rows = rows.len(), "fetched page");
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{OrderBy, active};

    fn modules() -> Select {
        Select::from("compose_module", &["id", "name"]).filter(active())
    }

    #[test]
    fn lowers_search_with_grouped_or() {
        let query = modules()
            .filter(Expr::column("rel_namespace").eq(3u64))
            .filter(Predicate::or(vec![
                Expr::lower("name").like("%cust%"),
                Expr::lower("handle").like("%cust%"),
            ]))
            .order_by(vec![OrderBy { column: "id".into(), direction: Direction::Asc }]);
        let statement = lower_select(&query, 2, 10);
        assert_eq!(
            statement.sql,
            "SELECT id, name FROM compose_module WHERE deleted_at IS NULL AND rel_namespace = ? \
             AND (unicode_lower(name) LIKE ? OR unicode_lower(handle) LIKE ?) ORDER BY id ASC LIMIT ? OFFSET ?"
        );
        assert_eq!(
            statement.params,
            vec![
                Value::Integer(3),
                Value::Text("%cust%".into()),
                Value::Text("%cust%".into()),
                Value::Integer(10),
                Value::Integer(10),
            ]
        );
    }

    #[test]
    fn raw_fragment_is_not_grouped() {
        let query = modules().filter(Predicate::raw("id = ? OR id = ?", vec![1i64.into(), 2i64.into()]));
        let statement = lower_count(&query);
        assert_eq!(
            statement.sql,
            "SELECT COUNT(*) FROM compose_module WHERE deleted_at IS NULL AND id = ? OR id = ?"
        );
        assert_eq!(statement.params.len(), 2);
    }

    #[test]
    fn empty_in_matches_nothing() {
        let statement = lower_count(&modules().filter(Expr::column("id").is_in(Vec::<Id>::new())));
        assert!(statement.sql.ends_with("AND 1=0"));
    }

    #[test]
    fn lower_function_folds_beyond_ascii() {
        let db = Connection::open_in_memory().unwrap();
        register_functions(&db).unwrap();
        let folded: String = db
            .query_row("SELECT unicode_lower('ÄRGER Éclair')", [], |row| row.get(0))
            .unwrap();
        assert_eq!(folded, "ärger éclair");
        let null: Option<String> = db.query_row("SELECT unicode_lower(NULL)", [], |row| row.get(0)).unwrap();
        assert!(null.is_none());
    }

    #[test]
    fn unlimited_page_has_no_limit() {
        let statement = lower_select(&modules(), 3, 0);
        assert!(!statement.sql.contains("LIMIT"));
        assert!(statement.params.is_empty());
    }
}
