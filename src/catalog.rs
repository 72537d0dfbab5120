use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};

use crate::domain::order::MenuItemId;
use crate::store::StoreError;

// ============================================================================
// Catalog Lookup - read-only price/availability source
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CatalogItem {
    pub price: Decimal,
    pub available: bool,
}

#[async_trait]
pub trait CatalogLookup: Send + Sync {
    /// `Ok(None)` when the item does not exist
    async fn get(&self, id: MenuItemId) -> Result<Option<CatalogItem>, StoreError>;
}

/// Catalog backed by the `menu_items` table
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogLookup for PgCatalog {
    async fn get(&self, id: MenuItemId) -> Result<Option<CatalogItem>, StoreError> {
        let row = sqlx::query("SELECT price, is_available FROM menu_items WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| {
            Ok(CatalogItem {
                price: row.try_get("price")?,
                available: row.try_get("is_available")?,
            })
        })
        .transpose()
    }
}

/// In-process catalog, used by tests and local runs
#[derive(Default)]
pub struct InMemoryCatalog {
    items: RwLock<HashMap<MenuItemId, CatalogItem>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: impl IntoIterator<Item = (MenuItemId, Decimal)>) -> Self {
        let catalog = Self::new();
        for (id, price) in items {
            catalog.set_price(id, price);
        }
        catalog
    }

    pub fn set_price(&self, id: MenuItemId, price: Decimal) {
        let mut items = self.items.write().unwrap_or_else(|e| e.into_inner());
        let entry = items.entry(id).or_insert(CatalogItem { price, available: true });
        entry.price = price;
    }

    pub fn set_available(&self, id: MenuItemId, available: bool) {
        let mut items = self.items.write().unwrap_or_else(|e| e.into_inner());
        if let Some(item) = items.get_mut(&id) {
            item.available = available;
        }
    }
}

#[async_trait]
impl CatalogLookup for InMemoryCatalog {
    async fn get(&self, id: MenuItemId) -> Result<Option<CatalogItem>, StoreError> {
        let items = self.items.read().unwrap_or_else(|e| e.into_inner());
        Ok(items.get(&id).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_catalog_lookup() {
        let catalog = InMemoryCatalog::with_items([(1, Decimal::new(1000, 2))]);

        let item = catalog.get(1).await.unwrap().unwrap();
        assert_eq!(item.price, Decimal::new(1000, 2));
        assert!(item.available);
        assert!(catalog.get(2).await.unwrap().is_none());

        catalog.set_available(1, false);
        catalog.set_price(1, Decimal::new(1200, 2));
        let item = catalog.get(1).await.unwrap().unwrap();
        assert_eq!(item.price, Decimal::new(1200, 2));
        assert!(!item.available);
    }
}
