//! Full statements assembled from compiled fragments.

use std::fmt;

use docgate_core::Value;

use crate::{
    literal::{literal, quote_ident, quote_string},
    update::UpdateClause,
};

/// A collection addressed as a schema-qualified table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Table {
    pub db: String,
    pub collection: String,
}

impl Table {
    pub fn new(db: impl Into<String>, collection: impl Into<String>) -> Self {
        Self { db: db.into(), collection: collection.into() }
    }

    /// The MongoDB namespace, `db.collection`.
    pub fn namespace(&self) -> String {
        format!("{}.{}", self.db, self.collection)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", quote_ident(&self.db), quote_ident(&self.collection))
    }
}

/// Row window applied by the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Page {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

fn where_clause(filter: Option<&str>) -> String {
    filter.map(|f| format!(" WHERE {f}")).unwrap_or_default()
}

/// `SELECT <projection> FROM <table> [WHERE <filter>] [LIMIT n [OFFSET m]]`
///
/// The store only accepts `OFFSET` after `LIMIT`, so an offset without a limit pages with
/// `LIMIT` set to `i64::MAX`.
pub fn select(table: &Table, projection: &str, filter: Option<&str>, page: Page) -> String {
    let mut sql = format!("SELECT {projection} FROM {table}{}", where_clause(filter));

    match (page.limit, page.offset) {
        (None, None) => {}
        (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
        (limit, Some(offset)) => sql.push_str(&format!(
            " LIMIT {} OFFSET {offset}",
            limit.unwrap_or(i64::MAX as u64)
        )),
    }

    sql
}

/// `SELECT COUNT(*) FROM <table> [WHERE <filter>]`
pub fn select_count(table: &Table, filter: Option<&str>) -> String {
    format!("SELECT COUNT(*) FROM {table}{}", where_clause(filter))
}

/// `INSERT INTO <table> VALUES ('<storage json>')`
pub fn insert(table: &Table, storage_json: &str) -> String {
    format!("INSERT INTO {table} VALUES ({})", quote_string(storage_json))
}

/// `UPDATE <table> <assignments> WHERE (<filter>) AND (<guard>)`
///
/// Only rows the update would change are touched, so the affected-row count is the
/// modified count.
pub fn update(table: &Table, filter: Option<&str>, clause: &UpdateClause) -> String {
    let condition = match filter {
        Some(filter) => format!("({filter}) AND ({})", clause.guard),
        None => clause.guard.clone(),
    };

    format!("UPDATE {table} {} WHERE {condition}", clause.assignments)
}

/// `DELETE FROM <table> [WHERE <filter>]`
pub fn delete(table: &Table, filter: Option<&str>) -> String {
    format!("DELETE FROM {table}{}", where_clause(filter))
}

/// An equality predicate on `_id`, used to narrow single-document writes.
pub fn id_filter(id: &Value) -> String {
    format!("(\"_id\" = {})", literal(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::update::compile_update;
    use docgate_core::{ObjectId, document};

    fn users() -> Table {
        Table::new("test", "users")
    }

    #[test]
    fn table_is_schema_qualified() {
        assert_eq!(users().to_string(), "\"test\".\"users\"");
        assert_eq!(Table::new("a\"b", "c").to_string(), "\"a\"\"b\".\"c\"");
        assert_eq!(users().namespace(), "test.users");
    }

    #[test]
    fn select_with_and_without_window() {
        assert_eq!(
            select(&users(), "*", None, Page::default()),
            "SELECT * FROM \"test\".\"users\""
        );
        assert_eq!(
            select(&users(), "*", Some("(\"a\" = 1)"), Page { limit: Some(10), offset: Some(5) }),
            "SELECT * FROM \"test\".\"users\" WHERE (\"a\" = 1) LIMIT 10 OFFSET 5"
        );
        assert_eq!(
            select(&users(), "{\"_id\": \"_id\"}", None, Page { limit: Some(3), offset: None }),
            "SELECT {\"_id\": \"_id\"} FROM \"test\".\"users\" LIMIT 3"
        );
        assert_eq!(
            select(&users(), "*", None, Page { limit: None, offset: Some(2) }),
            format!("SELECT * FROM \"test\".\"users\" LIMIT {} OFFSET 2", i64::MAX)
        );
    }

    #[test]
    fn count_and_delete() {
        assert_eq!(select_count(&users(), None), "SELECT COUNT(*) FROM \"test\".\"users\"");
        assert_eq!(
            delete(&users(), Some("(\"a\" = 1)")),
            "DELETE FROM \"test\".\"users\" WHERE (\"a\" = 1)"
        );
    }

    #[test]
    fn insert_doubles_quotes() {
        assert_eq!(
            insert(&users(), r#"{"_id":1,"name":"O'Brien"}"#),
            r#"INSERT INTO "test"."users" VALUES ('{"_id":1,"name":"O''Brien"}')"#
        );
    }

    #[test]
    fn update_combines_filter_and_guard() {
        let clause = compile_update(&document! { "$set" => document! { "x" => 5 } }).unwrap();

        assert_eq!(
            update(&users(), Some("(\"a\" = 1)"), &clause),
            "UPDATE \"test\".\"users\" SET \"x\" = 5 \
             WHERE ((\"a\" = 1)) AND (((\"x\" <> 5 OR \"x\" IS NULL OR \"x\" IS UNSET)))"
        );
        assert_eq!(
            update(&users(), None, &clause),
            "UPDATE \"test\".\"users\" SET \"x\" = 5 \
             WHERE ((\"x\" <> 5 OR \"x\" IS NULL OR \"x\" IS UNSET))"
        );
    }

    #[test]
    fn id_filters_use_literals() {
        let oid = ObjectId::parse_str("65a1b2c3d4e5f60718293a4b").unwrap();

        assert_eq!(id_filter(&Value::Int32(7)), "(\"_id\" = 7)");
        assert_eq!(
            id_filter(&Value::ObjectId(oid)),
            "(\"_id\" = {\"oid\": '65a1b2c3d4e5f60718293a4b'})"
        );
    }
}
