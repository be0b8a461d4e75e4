//! Query composer for filtered list queries.
//!
//! Every list query is written as `... WHERE 1=1{predicates} ORDER BY ...`.
//! A `WhereClause` collects one `AND column = ?N` predicate per filter field
//! that is present and skips the absent ones. Predicates are equality only
//! and always combine with AND. Column names are `&'static str` so they can
//! only come from code, never from a request.

use rusqlite::types::ToSql;

#[derive(Default)]
pub struct WhereClause {
    sql: String,
    params: Vec<Box<dyn ToSql>>,
}

impl WhereClause {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `column = ?N` if `value` is present.
    pub fn eq<T>(&mut self, column: &'static str, value: Option<T>) -> &mut Self
    where
        T: ToSql + 'static,
    {
        if let Some(value) = value {
            let idx = self.params.len() + 1;
            self.sql.push_str(&format!(" AND {column} = ?{idx}"));
            self.params.push(Box::new(value));
        }
        self
    }

    /// Rendered predicates, to be appended after `WHERE 1=1`.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> Vec<&dyn ToSql> {
        self.params.iter().map(|p| p.as_ref()).collect()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}
