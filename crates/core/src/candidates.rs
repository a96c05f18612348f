//! Candidate pool selection and per-customer feature rows.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use crate::dataset::Transaction;
use crate::encoding::FeatureRow;

/// Country used for customers absent from the reference data. It never
/// appears in the fitted vocabulary, so it encodes into the unknown bucket.
pub const UNKNOWN_COUNTRY: &str = "unknown";

#[derive(Debug, Default)]
struct ItemStats {
    customers: HashSet<String>,
    descriptions: HashMap<String, usize>,
    prices: HashMap<u32, usize>,
}

/// Popularity and mode statistics derived from the reference transactions.
#[derive(Debug, Default)]
pub struct CatalogStats {
    items: BTreeMap<String, ItemStats>,
    customer_countries: HashMap<String, HashMap<String, usize>>,
}

/// Item with its distinct-customer count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PopularItem {
    pub stock_code: String,
    pub distinct_customers: usize,
}

/// One row to score: a candidate item seen through a specific customer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateRow {
    pub stock_code: String,
    pub description: String,
    pub customer_id: String,
    pub country: String,
    pub unit_price: f32,
}

impl CandidateRow {
    pub fn as_feature_row(&self) -> FeatureRow<'_> {
        FeatureRow {
            stock_code: &self.stock_code,
            customer_id: &self.customer_id,
            country: &self.country,
            description: &self.description,
            unit_price: self.unit_price,
        }
    }
}

impl CatalogStats {
    pub fn from_transactions(transactions: &[Transaction]) -> Self {
        let mut stats = Self::default();

        for transaction in transactions {
            let item = stats.items.entry(transaction.stock_code.clone()).or_default();
            item.customers.insert(transaction.customer_id.clone());
            *item.descriptions.entry(transaction.description.clone()).or_default() += 1;
            *item.prices.entry(transaction.unit_price.to_bits()).or_default() += 1;

            *stats
                .customer_countries
                .entry(transaction.customer_id.clone())
                .or_default()
                .entry(transaction.country.clone())
                .or_default() += 1;
        }

        stats
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// The `k` items bought by the most distinct customers.
    ///
    /// Items are visited in stock-code order and the sort is stable, so ties
    /// keep stock-code order.
    pub fn top_items(&self, k: usize) -> Vec<PopularItem> {
        let mut ranked: Vec<PopularItem> = self
            .items
            .iter()
            .map(|(stock_code, item)| PopularItem {
                stock_code: stock_code.clone(),
                distinct_customers: item.customers.len(),
            })
            .collect();

        ranked.sort_by(|a, b| b.distinct_customers.cmp(&a.distinct_customers));
        ranked.truncate(k);
        ranked
    }

    /// Most common country for a customer; smallest name wins ties.
    pub fn customer_country(&self, customer_id: &str) -> Option<&str> {
        self.customer_countries.get(customer_id).and_then(|countries| mode_str(countries))
    }

    pub fn item_description(&self, stock_code: &str) -> Option<&str> {
        self.items.get(stock_code).and_then(|item| mode_str(&item.descriptions))
    }

    /// Most frequently observed unit price; lowest price wins ties.
    pub fn item_price(&self, stock_code: &str) -> Option<f32> {
        let item = self.items.get(stock_code)?;
        item.prices
            .iter()
            .map(|(bits, count)| (f32::from_bits(*bits), *count))
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.total_cmp(&a.0)))
            .map(|(price, _)| price)
    }

    /// Feature rows for the `pool_size` most popular items, as seen by `customer_id`.
    pub fn candidate_rows(&self, customer_id: &str, pool_size: usize) -> Vec<CandidateRow> {
        let country = self.customer_country(customer_id).unwrap_or(UNKNOWN_COUNTRY).to_owned();

        self.top_items(pool_size)
            .into_iter()
            .map(|item| CandidateRow {
                description: self.item_description(&item.stock_code).unwrap_or_default().to_owned(),
                unit_price: self.item_price(&item.stock_code).unwrap_or_default(),
                customer_id: customer_id.to_owned(),
                country: country.clone(),
                stock_code: item.stock_code,
            })
            .collect()
    }
}

fn mode_str(counts: &HashMap<String, usize>) -> Option<&str> {
    counts
        .iter()
        .max_by(|a, b| match a.1.cmp(b.1) {
            Ordering::Equal => b.0.cmp(a.0),
            other => other,
        })
        .map(|(value, _)| value.as_str())
}
