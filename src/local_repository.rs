use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{
    shop_models::{Category, Order, Product, ShopEntity},
    shop_repository::{RepositoryBackend, RepositoryError, ShopRepository},
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct ShopSnapshot {
    products: Vec<Product>,
    categories: Vec<Category>,
    orders: Vec<Order>,
}

fn products_of(snapshot: &mut ShopSnapshot) -> &mut Vec<Product> {
    &mut snapshot.products
}

fn categories_of(snapshot: &mut ShopSnapshot) -> &mut Vec<Category> {
    &mut snapshot.categories
}

fn orders_of(snapshot: &mut ShopSnapshot) -> &mut Vec<Order> {
    &mut snapshot.orders
}

/// Offline backend: the whole shop lives in one JSON file, loaded on first
/// access and rewritten after every mutation.
pub struct LocalShopRepository {
    store_path: PathBuf,
    snapshot: Mutex<Option<ShopSnapshot>>,
}

impl LocalShopRepository {
    pub fn new(store_path: impl Into<PathBuf>) -> Self {
        Self {
            store_path: store_path.into(),
            snapshot: Mutex::new(None),
        }
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    async fn read_snapshot(&self) -> Result<ShopSnapshot, RepositoryError> {
        let raw = match tokio::fs::read_to_string(&self.store_path).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(
                    target: "repository",
                    path = %self.store_path.display(),
                    "local store does not exist yet; starting empty"
                );
                return Ok(ShopSnapshot::default());
            }
            Err(source) => {
                return Err(RepositoryError::Io {
                    path: self.store_path.clone(),
                    source,
                });
            }
        };

        serde_json::from_str(&raw).map_err(|source| RepositoryError::Corrupt {
            path: self.store_path.clone(),
            source,
        })
    }

    async fn write_snapshot(&self, snapshot: &ShopSnapshot) -> Result<(), RepositoryError> {
        let io_error = |source| RepositoryError::Io {
            path: self.store_path.clone(),
            source,
        };

        if let Some(parent_dir) = self.store_path.parent() {
            if !parent_dir.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent_dir).await.map_err(io_error)?;
            }
        }

        let serialized =
            serde_json::to_string_pretty(snapshot).map_err(|source| RepositoryError::Corrupt {
                path: self.store_path.clone(),
                source,
            })?;
        let staging_path = self.store_path.with_extension("json.tmp");
        tokio::fs::write(&staging_path, serialized)
            .await
            .map_err(io_error)?;
        tokio::fs::rename(&staging_path, &self.store_path)
            .await
            .map_err(io_error)
    }

    async fn list<T: ShopEntity>(
        &self,
        collection: fn(&mut ShopSnapshot) -> &mut Vec<T>,
    ) -> Result<Vec<T>, RepositoryError> {
        let mut guard = self.snapshot.lock().await;
        if guard.is_none() {
            *guard = Some(self.read_snapshot().await?);
        }
        Ok(guard
            .as_mut()
            .map(|snapshot| collection(snapshot).clone())
            .unwrap_or_default())
    }

    async fn find<T: ShopEntity>(
        &self,
        id: i64,
        collection: fn(&mut ShopSnapshot) -> &mut Vec<T>,
    ) -> Result<Option<T>, RepositoryError> {
        let items = self.list(collection).await?;
        Ok(items.into_iter().find(|item| item.id() == id))
    }

    /// Applies `change` to a copy of the snapshot, writes the copy and only
    /// then makes it the cached snapshot. A failed write leaves the cache as
    /// it was.
    async fn mutate<R>(
        &self,
        change: impl FnOnce(&mut ShopSnapshot) -> Result<R, RepositoryError>,
    ) -> Result<R, RepositoryError> {
        let mut guard = self.snapshot.lock().await;
        let mut updated = match guard.as_ref() {
            Some(snapshot) => snapshot.clone(),
            None => self.read_snapshot().await?,
        };

        let outcome = change(&mut updated)?;
        self.write_snapshot(&updated).await?;
        *guard = Some(updated);
        Ok(outcome)
    }

    async fn save<T: ShopEntity>(
        &self,
        mut entity: T,
        collection: fn(&mut ShopSnapshot) -> &mut Vec<T>,
    ) -> Result<T, RepositoryError> {
        self.mutate(|snapshot| {
            let items = collection(snapshot);
            if entity.id() == 0 {
                let next_id = items.iter().map(|item| item.id()).max().unwrap_or(0) + 1;
                entity.set_id(next_id);
                items.push(entity.clone());
            } else if let Some(existing) = items.iter_mut().find(|item| item.id() == entity.id()) {
                *existing = entity.clone();
            } else {
                return Err(RepositoryError::NotFound {
                    collection: T::COLLECTION,
                    id: entity.id(),
                });
            }
            Ok(entity)
        })
        .await
    }

    async fn remove<T: ShopEntity>(
        &self,
        id: i64,
        collection: fn(&mut ShopSnapshot) -> &mut Vec<T>,
    ) -> Result<(), RepositoryError> {
        self.mutate(|snapshot| {
            let items = collection(snapshot);
            let before = items.len();
            items.retain(|item| item.id() != id);
            if items.len() == before {
                return Err(RepositoryError::NotFound {
                    collection: T::COLLECTION,
                    id,
                });
            }
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl ShopRepository for LocalShopRepository {
    fn backend(&self) -> RepositoryBackend {
        RepositoryBackend::Local
    }

    async fn products(&self) -> Result<Vec<Product>, RepositoryError> {
        self.list(products_of).await
    }

    async fn product(&self, id: i64) -> Result<Option<Product>, RepositoryError> {
        self.find(id, products_of).await
    }

    async fn save_product(&self, product: Product) -> Result<Product, RepositoryError> {
        self.save(product, products_of).await
    }

    async fn delete_product(&self, id: i64) -> Result<(), RepositoryError> {
        self.remove(id, products_of).await
    }

    async fn categories(&self) -> Result<Vec<Category>, RepositoryError> {
        self.list(categories_of).await
    }

    async fn category(&self, id: i64) -> Result<Option<Category>, RepositoryError> {
        self.find(id, categories_of).await
    }

    async fn save_category(&self, category: Category) -> Result<Category, RepositoryError> {
        self.save(category, categories_of).await
    }

    async fn delete_category(&self, id: i64) -> Result<(), RepositoryError> {
        self.remove(id, categories_of).await
    }

    async fn orders(&self) -> Result<Vec<Order>, RepositoryError> {
        self.list(orders_of).await
    }

    async fn order(&self, id: i64) -> Result<Option<Order>, RepositoryError> {
        self.find(id, orders_of).await
    }

    async fn save_order(&self, order: Order) -> Result<Order, RepositoryError> {
        self.save(order, orders_of).await
    }

    async fn delete_order(&self, id: i64) -> Result<(), RepositoryError> {
        self.remove(id, orders_of).await
    }
}
