//! Data-access capability shared by every page view-model.
//!
//! The concrete backend is chosen once at startup by
//! [`crate::repository_selector::RepositorySelector`] and published as an
//! `Arc<dyn ShopRepository>` singleton.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::shop_models::{Category, Order, Product};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryBackend {
    Remote,
    Local,
}

impl RepositoryBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::Local => "local",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} responded with {status}: {body}")]
    Status { url: String, status: u16, body: String },
    #[error("invalid endpoint for {collection}: {reason}")]
    InvalidEndpoint {
        collection: &'static str,
        reason: String,
    },
    #[error("failed to access local store {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("local store {} is corrupt: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{collection} {id} does not exist")]
    NotFound { collection: &'static str, id: i64 },
}

#[async_trait]
pub trait ShopRepository: Send + Sync {
    fn backend(&self) -> RepositoryBackend;

    async fn products(&self) -> Result<Vec<Product>, RepositoryError>;
    async fn product(&self, id: i64) -> Result<Option<Product>, RepositoryError>;
    /// Creates the product when its id is `0`, updates it otherwise.
    async fn save_product(&self, product: Product) -> Result<Product, RepositoryError>;
    async fn delete_product(&self, id: i64) -> Result<(), RepositoryError>;

    async fn categories(&self) -> Result<Vec<Category>, RepositoryError>;
    async fn category(&self, id: i64) -> Result<Option<Category>, RepositoryError>;
    async fn save_category(&self, category: Category) -> Result<Category, RepositoryError>;
    async fn delete_category(&self, id: i64) -> Result<(), RepositoryError>;

    async fn orders(&self) -> Result<Vec<Order>, RepositoryError>;
    async fn order(&self, id: i64) -> Result<Option<Order>, RepositoryError>;
    async fn save_order(&self, order: Order) -> Result<Order, RepositoryError>;
    async fn delete_order(&self, id: i64) -> Result<(), RepositoryError>;
}
