//! Page view-models. Each one is resolved fresh per navigation and reaches
//! the data layer only through the published `dyn ShopRepository`.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::{
    app_settings::AppSettings,
    page_registry::{NavigationAware, NavigationParameter, PageKey, PageViewModel},
    service_registry::{RegistryError, ServiceRegistry},
    shop_models::{Category, Order, OrderItem, OrderStatus, Product},
    shop_repository::{RepositoryBackend, RepositoryError, ShopRepository},
    DATA_MODE_REMOTE, SETTING_BASE_URL, SETTING_DATA_MODE,
};

fn shop_repository(registry: &ServiceRegistry) -> Result<Arc<dyn ShopRepository>, RegistryError> {
    registry.resolve::<dyn ShopRepository>()
}

pub struct LoginViewModel {
    repository: Arc<dyn ShopRepository>,
}

impl LoginViewModel {
    pub fn from_registry(registry: &ServiceRegistry) -> Result<Self, RegistryError> {
        Ok(Self {
            repository: shop_repository(registry)?,
        })
    }

    pub fn backend(&self) -> RepositoryBackend {
        self.repository.backend()
    }

    /// Checks that the shop answers before leaving the login page.
    pub async fn sign_in(&self) -> Result<PageKey, RepositoryError> {
        self.repository.categories().await?;
        Ok(PageKey::Dashboard)
    }
}

impl PageViewModel for LoginViewModel {
    fn page(&self) -> PageKey {
        PageKey::Login
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardSummary {
    pub product_count: usize,
    pub category_count: usize,
    pub order_count: usize,
    pub pending_orders: usize,
    pub low_stock: Vec<Product>,
    pub revenue: f64,
}

const LOW_STOCK_THRESHOLD: u32 = 5;

pub struct DashboardViewModel {
    repository: Arc<dyn ShopRepository>,
    summary: RwLock<DashboardSummary>,
}

impl DashboardViewModel {
    pub fn from_registry(registry: &ServiceRegistry) -> Result<Self, RegistryError> {
        Ok(Self {
            repository: shop_repository(registry)?,
            summary: RwLock::new(DashboardSummary::default()),
        })
    }

    pub fn summary(&self) -> DashboardSummary {
        self.summary.read().clone()
    }

    pub async fn refresh(&self) -> Result<DashboardSummary, RepositoryError> {
        let products = self.repository.products().await?;
        let categories = self.repository.categories().await?;
        let orders = self.repository.orders().await?;

        let summary = DashboardSummary {
            product_count: products.len(),
            category_count: categories.len(),
            order_count: orders.len(),
            pending_orders: orders
                .iter()
                .filter(|order| order.status == OrderStatus::Pending)
                .count(),
            revenue: orders
                .iter()
                .filter(|order| order.status != OrderStatus::Cancelled)
                .map(Order::total)
                .sum(),
            low_stock: products
                .into_iter()
                .filter(|product| product.quantity < LOW_STOCK_THRESHOLD)
                .collect(),
        };
        *self.summary.write() = summary.clone();
        Ok(summary)
    }
}

impl PageViewModel for DashboardViewModel {
    fn page(&self) -> PageKey {
        PageKey::Dashboard
    }
}

pub struct ProductsViewModel {
    repository: Arc<dyn ShopRepository>,
    products: RwLock<Vec<Product>>,
    category_filter: RwLock<Option<Category>>,
}

impl ProductsViewModel {
    pub fn from_registry(registry: &ServiceRegistry) -> Result<Self, RegistryError> {
        Ok(Self {
            repository: shop_repository(registry)?,
            products: RwLock::new(Vec::new()),
            category_filter: RwLock::new(None),
        })
    }

    pub fn products(&self) -> Vec<Product> {
        self.products.read().clone()
    }

    pub fn category_filter(&self) -> Option<Category> {
        self.category_filter.read().clone()
    }

    pub async fn refresh(&self) -> Result<usize, RepositoryError> {
        let filter = self.category_filter().map(|category| category.id);
        let products: Vec<Product> = self
            .repository
            .products()
            .await?
            .into_iter()
            .filter(|product| filter.is_none_or(|id| product.category_id == id))
            .collect();
        let count = products.len();
        *self.products.write() = products;
        Ok(count)
    }

    pub fn detail_parameter(&self, product_id: i64) -> Option<NavigationParameter> {
        self.products
            .read()
            .iter()
            .find(|product| product.id == product_id)
            .cloned()
            .map(NavigationParameter::Product)
    }

    /// Parameter for the add-product page, which checks drafts against the
    /// products already loaded here.
    pub fn add_product_parameter(&self) -> NavigationParameter {
        NavigationParameter::Products(self.products())
    }

    pub async fn delete(&self, product_id: i64) -> Result<(), RepositoryError> {
        self.repository.delete_product(product_id).await?;
        self.products.write().retain(|product| product.id != product_id);
        Ok(())
    }
}

impl PageViewModel for ProductsViewModel {
    fn page(&self) -> PageKey {
        PageKey::Products
    }

    fn as_navigation_aware(&self) -> Option<&dyn NavigationAware> {
        Some(self)
    }
}

impl NavigationAware for ProductsViewModel {
    fn on_navigated_to(&self, parameter: Option<&NavigationParameter>) {
        *self.category_filter.write() = match parameter {
            Some(NavigationParameter::Category(category)) => Some(category.clone()),
            _ => None,
        };
    }

    fn on_navigated_from(&self) {}
}

pub struct ProductDetailViewModel {
    repository: Arc<dyn ShopRepository>,
    item: RwLock<Option<Product>>,
}

impl ProductDetailViewModel {
    pub fn from_registry(registry: &ServiceRegistry) -> Result<Self, RegistryError> {
        Ok(Self {
            repository: shop_repository(registry)?,
            item: RwLock::new(None),
        })
    }

    pub fn item(&self) -> Option<Product> {
        self.item.read().clone()
    }

    pub fn edit<F>(&self, change: F)
    where
        F: FnOnce(&mut Product),
    {
        if let Some(item) = self.item.write().as_mut() {
            change(item);
        }
    }

    /// Re-reads the product so the page shows what the shop has now.
    pub async fn reload(&self) -> Result<Option<Product>, RepositoryError> {
        let Some(id) = self.item().map(|item| item.id) else {
            return Ok(None);
        };
        let fresh = self.repository.product(id).await?;
        *self.item.write() = fresh.clone();
        Ok(fresh)
    }

    pub async fn save(&self) -> Result<Option<Product>, RepositoryError> {
        let Some(item) = self.item() else {
            return Ok(None);
        };
        let saved = self.repository.save_product(item).await?;
        *self.item.write() = Some(saved.clone());
        Ok(Some(saved))
    }
}

impl PageViewModel for ProductDetailViewModel {
    fn page(&self) -> PageKey {
        PageKey::ProductDetail
    }

    fn as_navigation_aware(&self) -> Option<&dyn NavigationAware> {
        Some(self)
    }
}

impl NavigationAware for ProductDetailViewModel {
    fn on_navigated_to(&self, parameter: Option<&NavigationParameter>) {
        if let Some(NavigationParameter::Product(product)) = parameter {
            *self.item.write() = Some(product.clone());
        }
    }

    fn on_navigated_from(&self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DraftError {
    #[error("Must choose a product image")]
    MissingImage,
    #[error("Must fill all required fields")]
    MissingFields,
    #[error("Product is already existed")]
    AlreadyExists,
}

pub struct AddProductViewModel {
    repository: Arc<dyn ShopRepository>,
    draft: RwLock<Product>,
    known_products: RwLock<Vec<Product>>,
}

impl AddProductViewModel {
    pub fn from_registry(registry: &ServiceRegistry) -> Result<Self, RegistryError> {
        Ok(Self {
            repository: shop_repository(registry)?,
            draft: RwLock::new(Product::default()),
            known_products: RwLock::new(Vec::new()),
        })
    }

    pub fn draft(&self) -> Product {
        self.draft.read().clone()
    }

    pub fn edit<F>(&self, change: F)
    where
        F: FnOnce(&mut Product),
    {
        change(&mut *self.draft.write());
    }

    pub fn validate(&self) -> Result<(), DraftError> {
        let draft = self.draft.read();
        if draft.image.trim().is_empty() {
            return Err(DraftError::MissingImage);
        }
        if draft.name.trim().is_empty() || draft.author.trim().is_empty() || draft.price <= 0.0 {
            return Err(DraftError::MissingFields);
        }
        let duplicate = self.known_products.read().iter().any(|product| {
            product.name.eq_ignore_ascii_case(draft.name.trim())
                && product.author.eq_ignore_ascii_case(draft.author.trim())
        });
        if duplicate {
            return Err(DraftError::AlreadyExists);
        }
        Ok(())
    }

    pub async fn submit(&self) -> Result<Product, AddProductError> {
        self.validate()?;
        let saved = self.repository.save_product(self.draft()).await?;
        self.known_products.write().push(saved.clone());
        *self.draft.write() = Product::default();
        Ok(saved)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AddProductError {
    #[error(transparent)]
    Invalid(#[from] DraftError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl PageViewModel for AddProductViewModel {
    fn page(&self) -> PageKey {
        PageKey::AddProduct
    }

    fn as_navigation_aware(&self) -> Option<&dyn NavigationAware> {
        Some(self)
    }
}

impl NavigationAware for AddProductViewModel {
    fn on_navigated_to(&self, parameter: Option<&NavigationParameter>) {
        if let Some(NavigationParameter::Products(products)) = parameter {
            *self.known_products.write() = products.clone();
        }
        *self.draft.write() = Product::default();
    }

    fn on_navigated_from(&self) {}
}

pub struct CategoriesViewModel {
    repository: Arc<dyn ShopRepository>,
    categories: RwLock<Vec<Category>>,
}

impl CategoriesViewModel {
    pub fn from_registry(registry: &ServiceRegistry) -> Result<Self, RegistryError> {
        Ok(Self {
            repository: shop_repository(registry)?,
            categories: RwLock::new(Vec::new()),
        })
    }

    pub fn categories(&self) -> Vec<Category> {
        self.categories.read().clone()
    }

    pub async fn refresh(&self) -> Result<usize, RepositoryError> {
        let categories = self.repository.categories().await?;
        let count = categories.len();
        *self.categories.write() = categories;
        Ok(count)
    }

    pub async fn add(&self, name: &str, description: &str) -> Result<Category, RepositoryError> {
        let saved = self
            .repository
            .save_category(Category {
                id: 0,
                name: name.trim().to_string(),
                description: description.trim().to_string(),
            })
            .await?;
        self.categories.write().push(saved.clone());
        Ok(saved)
    }

    pub async fn delete(&self, category_id: i64) -> Result<(), RepositoryError> {
        self.repository.delete_category(category_id).await?;
        self.categories
            .write()
            .retain(|category| category.id != category_id);
        Ok(())
    }

    /// Parameter that opens the products page filtered to one category.
    pub fn products_parameter(&self, category_id: i64) -> Option<NavigationParameter> {
        self.categories
            .read()
            .iter()
            .find(|category| category.id == category_id)
            .cloned()
            .map(NavigationParameter::Category)
    }
}

impl PageViewModel for CategoriesViewModel {
    fn page(&self) -> PageKey {
        PageKey::Categories
    }
}

pub struct OrdersViewModel {
    repository: Arc<dyn ShopRepository>,
    orders: RwLock<Vec<Order>>,
}

impl OrdersViewModel {
    pub fn from_registry(registry: &ServiceRegistry) -> Result<Self, RegistryError> {
        Ok(Self {
            repository: shop_repository(registry)?,
            orders: RwLock::new(Vec::new()),
        })
    }

    pub fn orders(&self) -> Vec<Order> {
        self.orders.read().clone()
    }

    pub async fn refresh(&self) -> Result<usize, RepositoryError> {
        let mut orders = self.repository.orders().await?;
        orders.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        let count = orders.len();
        *self.orders.write() = orders;
        Ok(count)
    }

    pub async fn set_status(&self, order_id: i64, status: OrderStatus) -> Result<Order, RepositoryError> {
        let mut order = self
            .repository
            .order(order_id)
            .await?
            .ok_or(RepositoryError::NotFound {
                collection: "orders",
                id: order_id,
            })?;
        order.status = status;
        let saved = self.repository.save_order(order).await?;
        if let Some(existing) = self
            .orders
            .write()
            .iter_mut()
            .find(|order| order.id == saved.id)
        {
            *existing = saved.clone();
        }
        Ok(saved)
    }

    pub fn edit_parameter(&self, order_id: i64) -> Option<NavigationParameter> {
        self.orders
            .read()
            .iter()
            .find(|order| order.id == order_id)
            .cloned()
            .map(NavigationParameter::Order)
    }
}

impl PageViewModel for OrdersViewModel {
    fn page(&self) -> PageKey {
        PageKey::Orders
    }
}

pub struct CreateOrderViewModel {
    repository: Arc<dyn ShopRepository>,
    draft: RwLock<Order>,
}

impl CreateOrderViewModel {
    pub fn from_registry(registry: &ServiceRegistry) -> Result<Self, RegistryError> {
        Ok(Self {
            repository: shop_repository(registry)?,
            draft: RwLock::new(Order::new("")),
        })
    }

    pub fn draft(&self) -> Order {
        self.draft.read().clone()
    }

    pub fn set_customer(&self, customer_name: &str) {
        self.draft.write().customer_name = customer_name.trim().to_string();
    }

    /// Adds `quantity` of `product`, merging with an existing line.
    pub fn add_item(&self, product: &Product, quantity: u32) {
        if quantity == 0 {
            return;
        }
        let mut draft = self.draft.write();
        match draft
            .items
            .iter_mut()
            .find(|item| item.product_id == product.id)
        {
            Some(item) => item.quantity += quantity,
            None => draft.items.push(OrderItem {
                product_id: product.id,
                quantity,
                unit_price: product.price,
            }),
        }
    }

    pub fn remove_item(&self, product_id: i64) {
        self.draft
            .write()
            .items
            .retain(|item| item.product_id != product_id);
    }

    pub async fn submit(&self) -> Result<Order, RepositoryError> {
        let saved = self.repository.save_order(self.draft()).await?;
        *self.draft.write() = Order::new("");
        Ok(saved)
    }
}

impl PageViewModel for CreateOrderViewModel {
    fn page(&self) -> PageKey {
        PageKey::CreateOrder
    }

    fn as_navigation_aware(&self) -> Option<&dyn NavigationAware> {
        Some(self)
    }
}

impl NavigationAware for CreateOrderViewModel {
    fn on_navigated_to(&self, parameter: Option<&NavigationParameter>) {
        *self.draft.write() = match parameter {
            Some(NavigationParameter::Order(order)) => order.clone(),
            _ => Order::new(""),
        };
    }

    fn on_navigated_from(&self) {}
}

pub struct SettingsViewModel {
    settings: Arc<AppSettings>,
    backend: RepositoryBackend,
}

impl SettingsViewModel {
    pub fn from_registry(registry: &ServiceRegistry) -> Result<Self, RegistryError> {
        Ok(Self {
            settings: registry.resolve::<AppSettings>()?,
            backend: shop_repository(registry)?.backend(),
        })
    }

    pub fn backend(&self) -> RepositoryBackend {
        self.backend
    }

    pub fn data_mode(&self) -> &str {
        self.settings
            .get(SETTING_DATA_MODE)
            .unwrap_or(DATA_MODE_REMOTE)
    }

    pub fn base_url(&self) -> Option<&str> {
        self.settings.get(SETTING_BASE_URL)
    }
}

impl PageViewModel for SettingsViewModel {
    fn page(&self) -> PageKey {
        PageKey::Settings
    }
}
