use std::collections::HashMap;

use serde::{Deserialize, Serialize};

type Gram = (char, char, char);
type GramCounts = HashMap<Gram, u32>;

/// Similarity encoding for free-text categories such as item descriptions.
///
/// Each prototype gets one column holding the character 3-gram similarity
/// between the value and that prototype, so near-duplicate descriptions end up
/// close to each other instead of in unrelated one-hot columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimilarityField {
    name: String,
    prototypes: Vec<String>,
}

impl SimilarityField {
    /// Pick the `n_prototypes` most frequent values, ties in lexical order.
    pub fn fit<'a>(
        name: &str,
        values: impl IntoIterator<Item = &'a str>,
        n_prototypes: usize,
    ) -> Self {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for value in values {
            *counts.entry(value).or_default() += 1;
        }

        let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        Self {
            name: name.to_owned(),
            prototypes: ranked
                .into_iter()
                .take(n_prototypes)
                .map(|(value, _)| value.to_owned())
                .collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prototypes(&self) -> &[String] {
        &self.prototypes
    }

    pub fn width(&self) -> usize {
        self.prototypes.len()
    }

    /// Precompute prototype n-grams for a batch of encodes.
    pub fn prepare(&self) -> PreparedSimilarity {
        PreparedSimilarity { prototypes: self.prototypes.iter().map(|p| trigrams(p)).collect() }
    }
}

pub struct PreparedSimilarity {
    prototypes: Vec<GramCounts>,
}

impl PreparedSimilarity {
    /// Non-zero `(column, similarity)` pairs for `value`, in column order.
    pub fn encode(&self, value: &str) -> Vec<(usize, f32)> {
        let grams = trigrams(value);
        self.prototypes
            .iter()
            .enumerate()
            .filter_map(|(column, prototype)| {
                let similarity = gram_similarity(&grams, prototype);
                (similarity > 0.0).then_some((column, similarity))
            })
            .collect()
    }
}

/// 3-gram similarity between two strings, in `[0, 1]`.
pub fn ngram_similarity(a: &str, b: &str) -> f32 {
    gram_similarity(&trigrams(a), &trigrams(b))
}

fn trigrams(text: &str) -> GramCounts {
    let padded: Vec<char> = std::iter::once(' ')
        .chain(text.to_lowercase().chars())
        .chain(std::iter::once(' '))
        .collect();

    let mut grams = GramCounts::new();
    for window in padded.windows(3) {
        *grams.entry((window[0], window[1], window[2])).or_default() += 1;
    }
    grams
}

fn gram_similarity(a: &GramCounts, b: &GramCounts) -> f32 {
    let mut shared = 0u32;
    for (gram, count) in a {
        if let Some(other) = b.get(gram) {
            shared += (*count).min(*other);
        }
    }

    let total_a: u32 = a.values().sum();
    let total_b: u32 = b.values().sum();
    let union = total_a + total_b - shared;
    if union == 0 {
        0.0
    } else {
        shared as f32 / union as f32
    }
}
