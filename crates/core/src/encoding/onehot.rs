use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// One-hot vocabulary for a single categorical column.
///
/// Categories are kept sorted so lookups are a binary search. The column after
/// the last category is the unknown bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoricalField {
    name: String,
    categories: Vec<String>,
}

impl CategoricalField {
    pub fn fit<'a>(name: &str, values: impl IntoIterator<Item = &'a str>) -> Self {
        let categories: BTreeSet<&str> = values.into_iter().collect();
        Self {
            name: name.to_owned(),
            categories: categories.into_iter().map(str::to_owned).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Number of columns, including the unknown bucket.
    pub fn width(&self) -> usize {
        self.categories.len() + 1
    }

    pub fn unknown_index(&self) -> usize {
        self.categories.len()
    }

    /// Column offset within this field for `value`.
    pub fn index_of(&self, value: &str) -> usize {
        self.categories
            .binary_search_by(|category| category.as_str().cmp(value))
            .unwrap_or_else(|_| self.unknown_index())
    }

    pub fn is_known(&self, value: &str) -> bool {
        self.index_of(value) != self.unknown_index()
    }
}
