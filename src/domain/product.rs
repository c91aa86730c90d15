use serde::{Deserialize, Serialize};
use std::fmt;

/// Wildberries article number (`nm id`)
pub type ProductId = u64;

/// Where a listing was first seen: 1-based page, 0-based index within that page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagePosition {
    pub page: u32,
    pub index: u32,
}

impl PagePosition {
    pub fn new(page: u32, index: u32) -> Self {
        Self { page, index }
    }
}

/// Raw product entry from one catalog page, before deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: ProductId,
    pub name: Option<String>,
}

impl CatalogItem {
    pub fn new(id: ProductId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: Some(name.into()),
        }
    }
}

/// A distinct product of the category, ready for a frequency lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductListing {
    pub product_id: ProductId,
    pub name: String,
    pub position: PagePosition,
}

impl ProductListing {
    pub fn new(product_id: ProductId, name: impl Into<String>, position: PagePosition) -> Self {
        Self {
            product_id,
            name: name.into(),
            position,
        }
    }

    /// The provider is queried with the product name as its primary query.
    pub fn primary_query(&self) -> &str {
        self.name.trim()
    }
}

impl fmt::Display for ProductListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} '{}' (page: {}, index: {})",
            self.product_id, self.name, self.position.page, self.position.index
        )
    }
}
