//! Uniqueness guard for obscured rows.
//!
//! Obscuring can turn distinct live values into duplicates. The guard mirrors
//! the table's unique indexes and remembers the signature of every accepted
//! row so the exporter can regenerate a row before it breaks an index.

use std::collections::{HashMap, HashSet};

use crate::models::{Row, Value};

/// A unique index resolved against a table's column layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueIndex {
    /// Index name as reported by the catalog
    pub name: String,
    /// `(column name, row position)` for each member found in the layout.
    pub members: Vec<(String, usize)>,
}

impl UniqueIndex {
    /// Maps index member names onto row positions. Members missing from the
    /// layout (expressions, dropped columns) are skipped.
    pub fn resolve(name: impl Into<String>, members: &[String], columns: &[String]) -> Self {
        let members = members
            .iter()
            .filter_map(|member| {
                columns
                    .iter()
                    .position(|c| c == member)
                    .map(|position| (member.clone(), position))
            })
            .collect();
        Self {
            name: name.into(),
            members,
        }
    }

    /// Collision key for one row, or `None` when any member is NULL (NULLs
    /// never collide) or no member could be resolved.
    pub fn signature(&self, row: &Row) -> Option<String> {
        if self.members.is_empty() {
            return None;
        }
        let mut signature = String::new();
        for (column, position) in &self.members {
            let value = row.get(*position).map_or(serde_json::Value::Null, Value::to_json);
            if value.is_null() {
                return None;
            }
            signature.push_str(&format!("{}={}_", column, value));
        }
        Some(signature)
    }
}

/// Extracts the member columns of a `CREATE UNIQUE INDEX` definition as
/// reported by `pg_indexes.indexdef`. Returns `None` for non-unique indexes.
///
/// ```rust
/// use dbharvest_core::obscure::unique_index_columns;
///
/// let def = r#"CREATE UNIQUE INDEX t_key ON public.t USING btree (tenant_id, "Email")"#;
/// assert_eq!(
///     unique_index_columns(def),
///     Some(vec!["tenant_id".to_string(), "Email".to_string()])
/// );
/// ```
pub fn unique_index_columns(definition: &str) -> Option<Vec<String>> {
    if !definition.trim_start().starts_with("CREATE UNIQUE INDEX") {
        return None;
    }
    let open = definition.find('(')?;

    let mut items = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut in_quotes = false;
    for c in definition[open + 1..].chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            '(' if !in_quotes => depth += 1,
            ')' if !in_quotes && depth == 0 => break,
            ')' if !in_quotes => depth -= 1,
            ',' if !in_quotes && depth == 0 => {
                items.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    items.push(current);

    Some(items.iter().map(|item| member_name(item.trim())).collect())
}

/// Column name of one index member: a quoted identifier is unquoted, anything
/// else is cut at the first space (dropping `DESC`, opclasses, ...).
fn member_name(item: &str) -> String {
    if let Some(quoted) = item.strip_prefix('"') {
        let mut name = String::new();
        let mut chars = quoted.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                } else {
                    break;
                }
            }
            name.push(c);
        }
        return name;
    }
    item.split_whitespace().next().unwrap_or_default().to_string()
}

/// Accepted-signature sets for one table, keyed by index name.
#[derive(Debug, Default)]
pub struct UniqueGuard {
    indexes: Vec<UniqueIndex>,
    accepted: HashMap<String, HashSet<String>>,
}

impl UniqueGuard {
    /// Creates a guard over the given indexes with nothing accepted yet.
    pub fn new(indexes: Vec<UniqueIndex>) -> Self {
        Self {
            indexes,
            accepted: HashMap::new(),
        }
    }

    /// One `(index name, signature)` pair per index with a non-NULL key.
    pub fn signatures(&self, row: &Row) -> Vec<(String, String)> {
        self.indexes
            .iter()
            .filter_map(|index| index.signature(row).map(|sig| (index.name.clone(), sig)))
            .collect()
    }

    /// Whether `signature` was already accepted for `index_name`.
    pub fn check(&self, index_name: &str, signature: &str) -> bool {
        self.accepted
            .get(index_name)
            .is_some_and(|seen| seen.contains(signature))
    }

    /// First signature of `signatures` that collides with an accepted row.
    pub fn find_collision<'a>(
        &self,
        signatures: &'a [(String, String)],
    ) -> Option<&'a (String, String)> {
        signatures.iter().find(|(index, sig)| self.check(index, sig))
    }

    /// Records an accepted row's signatures.
    pub fn commit(&mut self, signatures: Vec<(String, String)>) {
        for (index, signature) in signatures {
            self.accepted.entry(index).or_default().insert(signature);
        }
    }
}
