//! Column obscuring for exported rows.
//!
//! # Module Structure
//! - `pattern`: the `[class]{range}` pattern language
//! - `words`: pronounceable fake words
//! - `guard`: unique-index signatures and collision tracking
//!
//! [`TableObscurer`] ties them together for one table: it rewrites the
//! policy-targeted columns of each row and retries with fresh draws while the
//! result collides with an earlier accepted row.

mod guard;
mod pattern;
mod words;

pub use guard::{UniqueGuard, UniqueIndex, unique_index_columns};
pub use pattern::Pattern;

use rand::Rng;

use crate::models::{ObscurePolicy, Row, Value};

/// Obscuring attempts per row before the row is dropped.
pub const MAX_ATTEMPTS: usize = 10;

/// Result of obscuring one row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    /// The row is unique under every guarded index.
    Accepted {
        /// Obscured row
        row: Row,
        /// Attempt that produced it, starting at 1
        attempts: usize,
    },
    /// Every attempt collided; the row must be left out of the bundle.
    Dropped {
        /// Attempts made
        attempts: usize,
    },
}

/// Per-table obscuring state.
#[derive(Debug)]
pub struct TableObscurer {
    label: String,
    rules: Vec<(usize, Pattern)>,
    guard: UniqueGuard,
}

impl TableObscurer {
    /// Compiles the policy against the table's column layout. Policy entries
    /// naming unknown columns are ignored.
    pub fn new(
        label: impl Into<String>,
        columns: &[String],
        policy: &ObscurePolicy,
        guard: UniqueGuard,
    ) -> Self {
        let label = label.into();
        let rules = policy
            .iter()
            .filter_map(|(column, pattern)| {
                if pattern.is_empty() {
                    return None;
                }
                let position = columns.iter().position(|c| c == column);
                if position.is_none() {
                    tracing::debug!("{}: no column '{}' to obscure", label, column);
                }
                position.map(|p| (p, Pattern::parse(pattern)))
            })
            .collect();
        Self { label, rules, guard }
    }

    /// Obscures `row`, retrying up to [`MAX_ATTEMPTS`] times on collision.
    ///
    /// Accepted rows have their signatures committed immediately, so every
    /// later row is checked against all earlier acceptances.
    pub fn obscure_row<R: Rng + ?Sized>(&mut self, row: &Row, rng: &mut R) -> RowOutcome {
        for attempt in 1..=MAX_ATTEMPTS {
            let candidate = self.apply(row, rng);
            let signatures = self.guard.signatures(&candidate);
            if let Some((index, signature)) = self.guard.find_collision(&signatures) {
                tracing::debug!(
                    "{} ({}) duplicate value on {}: {}",
                    self.label,
                    attempt,
                    index,
                    signature
                );
                continue;
            }
            self.guard.commit(signatures);
            return RowOutcome::Accepted {
                row: candidate,
                attempts: attempt,
            };
        }
        RowOutcome::Dropped {
            attempts: MAX_ATTEMPTS,
        }
    }

    fn apply<R: Rng + ?Sized>(&self, row: &Row, rng: &mut R) -> Row {
        let mut obscured = row.clone();
        for (position, pattern) in &self.rules {
            if let Some(slot) = obscured.get_mut(*position) {
                *slot = pattern.generate(rng).map_or(Value::Null, Value::Text);
            }
        }
        obscured
    }
}
