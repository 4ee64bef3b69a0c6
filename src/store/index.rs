//! BTreeMap-based search indexes
//!
//! A search index maps a cell key to the ordered set of rows holding it.
//! Only bool, int, string and date columns are indexable.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use super::cell::Cell;

/// Index key representing an indexable cell.
///
/// Ordering is deterministic: Null < Bool < Int < String < Date.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexKey {
    Null,
    Bool(bool),
    Int(i64),
    String(String),
    Date(DateTime<Utc>),
}

impl IndexKey {
    /// Returns None for cells that cannot be indexed.
    pub fn from_cell(cell: &Cell) -> Option<Self> {
        match cell {
            Cell::Null => Some(IndexKey::Null),
            Cell::Bool(b) => Some(IndexKey::Bool(*b)),
            Cell::Int(i) => Some(IndexKey::Int(*i)),
            Cell::String(s) => Some(IndexKey::String(s.clone())),
            Cell::Date(d) => Some(IndexKey::Date(*d)),
            _ => None,
        }
    }
}

/// Search index over one column.
#[derive(Debug, Clone, Default)]
pub struct SearchIndex {
    tree: BTreeMap<IndexKey, BTreeSet<usize>>,
}

impl SearchIndex {
    pub fn new() -> Self {
        Self {
            tree: BTreeMap::new(),
        }
    }

    /// Builds an index over the given cells, row `i` holding `cells[i]`.
    pub fn build(cells: &[Cell]) -> Self {
        let mut index = Self::new();
        for (row, cell) in cells.iter().enumerate() {
            index.insert(cell, row);
        }
        index
    }

    pub fn insert(&mut self, cell: &Cell, row: usize) {
        if let Some(key) = IndexKey::from_cell(cell) {
            self.tree.entry(key).or_default().insert(row);
        }
    }

    /// If the key has no more rows, removes the key entirely.
    pub fn remove(&mut self, cell: &Cell, row: usize) {
        if let Some(key) = IndexKey::from_cell(cell) {
            if let Some(rows) = self.tree.get_mut(&key) {
                rows.remove(&row);
                if rows.is_empty() {
                    self.tree.remove(&key);
                }
            }
        }
    }

    /// Lowest row holding an exactly matching key.
    pub fn find_first(&self, key: &IndexKey) -> Option<usize> {
        self.tree.get(key).and_then(|rows| rows.iter().next().copied())
    }

    /// All rows holding an exactly matching key, ascending.
    pub fn lookup_eq(&self, key: &IndexKey) -> Vec<usize> {
        self.tree
            .get(key)
            .map(|rows| rows.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn clear(&mut self) {
        self.tree.clear();
    }

    /// Number of distinct keys
    pub fn key_count(&self) -> usize {
        self.tree.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_find() {
        let mut index = SearchIndex::new();
        index.insert(&Cell::String("b".into()), 3);
        index.insert(&Cell::String("a".into()), 1);
        index.insert(&Cell::String("b".into()), 0);

        let b = IndexKey::String("b".into());
        assert_eq!(index.find_first(&b), Some(0));
        assert_eq!(index.lookup_eq(&b), vec![0, 3]);
        assert_eq!(index.key_count(), 2);
    }

    #[test]
    fn test_remove_drops_empty_key() {
        let mut index = SearchIndex::build(&[Cell::Int(5), Cell::Int(6)]);
        index.remove(&Cell::Int(5), 0);
        assert_eq!(index.find_first(&IndexKey::Int(5)), None);
        assert_eq!(index.key_count(), 1);
    }

    #[test]
    fn test_unindexable_cells_are_skipped() {
        let index = SearchIndex::build(&[Cell::Double(1.0), Cell::Binary(vec![1])]);
        assert_eq!(index.key_count(), 0);
    }

    #[test]
    fn test_key_ordering() {
        assert!(IndexKey::Null < IndexKey::Bool(false));
        assert!(IndexKey::Bool(true) < IndexKey::Int(i64::MIN));
        assert!(IndexKey::Int(i64::MAX) < IndexKey::String(String::new()));
    }
}
