use std::collections::HashSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::{PalettaError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Cart,
    Collection,
}

/// What happens when an id that is already present is added again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicatePolicy {
    Accumulate,
    Reject,
}

impl StoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::Cart => "cart",
            StoreKind::Collection => "collection",
        }
    }

    pub fn parse(s: &str) -> Option<StoreKind> {
        match s {
            "cart" => Some(StoreKind::Cart),
            "collection" => Some(StoreKind::Collection),
            _ => None,
        }
    }

    /// Canonical key the whole sequence is persisted under.
    pub fn storage_key(&self) -> &'static str {
        self.as_str()
    }

    pub fn duplicate_policy(&self) -> DuplicatePolicy {
        match self {
            StoreKind::Cart => DuplicatePolicy::Accumulate,
            StoreKind::Collection => DuplicatePolicy::Reject,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    pub unit_price: Decimal,
    pub quantity: u32,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub resolution: Option<String>,
}

impl LineItem {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Rejects a loaded sequence that repeats an id or holds a zero quantity.
pub fn check_loaded(items: &[LineItem]) -> Result<()> {
    let mut seen = HashSet::with_capacity(items.len());
    for item in items {
        if !seen.insert(item.id) {
            return Err(PalettaError::Corrupt(format!(
                "item #{} appears more than once",
                item.id
            )));
        }
        if item.quantity == 0 {
            return Err(PalettaError::Corrupt(format!("item #{} has quantity 0", item.id)));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewLineItem {
    pub id: i64,
    pub title: String,
    pub thumbnail_url: Option<String>,
    pub unit_price: Decimal,
    pub tags: Vec<String>,
    pub category: Option<String>,
    pub resolution: Option<String>,
}

impl NewLineItem {
    pub fn new(id: i64, title: impl Into<String>, unit_price: Decimal) -> Self {
        Self {
            id,
            title: title.into(),
            thumbnail_url: None,
            unit_price,
            tags: Vec::new(),
            category: None,
            resolution: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.id <= 0 {
            return Err(PalettaError::InvalidInput(format!(
                "item id must be positive, got {}",
                self.id
            )));
        }
        if self.title.trim().is_empty() {
            return Err(PalettaError::InvalidInput(format!(
                "item #{} has an empty title",
                self.id
            )));
        }
        if self.unit_price.is_sign_negative() {
            return Err(PalettaError::InvalidInput(format!(
                "item #{} has a negative price",
                self.id
            )));
        }
        Ok(())
    }

    /// A fresh entry with quantity 1. Metadata is cached as given.
    pub fn into_line_item(self) -> LineItem {
        LineItem {
            id: self.id,
            title: self.title,
            thumbnail_url: self.thumbnail_url,
            unit_price: self.unit_price,
            quantity: 1,
            tags: self.tags,
            category: self.category,
            resolution: self.resolution,
        }
    }
}

/// A clip record as served by the catalog and video listing endpoints.
/// Only the fields the store caches are modelled.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CatalogEntry {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub category: Option<String>,
}

impl From<CatalogEntry> for NewLineItem {
    fn from(entry: CatalogEntry) -> Self {
        NewLineItem {
            id: entry.id,
            title: entry.title,
            thumbnail_url: entry.thumbnail_url,
            unit_price: entry.price,
            tags: entry.tags,
            category: entry.category,
            resolution: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AddOutcome {
    Added(LineItem),
    Incremented(LineItem),
}

impl AddOutcome {
    pub fn item(&self) -> &LineItem {
        match self {
            AddOutcome::Added(item) | AddOutcome::Incremented(item) => item,
        }
    }
}

/// Read-only view of a store at one revision.
///
/// Positions are only meaningful for the revision they were rendered at.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub revision: u64,
    pub items: Vec<LineItem>,
}

impl Snapshot {
    pub fn id_at(&self, index: usize) -> Option<i64> {
        self.items.get(index).map(|item| item.id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub entries: usize,
    pub units: u64,
    pub total: Decimal,
}
