use std::{collections::HashMap, sync::Arc};

use crate::{
    service_registry::{RegistryError, ServiceRegistry},
    shop_models::{Category, Order, Product},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageKey {
    Login,
    Dashboard,
    Products,
    ProductDetail,
    AddProduct,
    Categories,
    Orders,
    CreateOrder,
    Settings,
}

impl PageKey {
    pub const ALL: [PageKey; 9] = [
        PageKey::Login,
        PageKey::Dashboard,
        PageKey::Products,
        PageKey::ProductDetail,
        PageKey::AddProduct,
        PageKey::Categories,
        PageKey::Orders,
        PageKey::CreateOrder,
        PageKey::Settings,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Dashboard => "dashboard",
            Self::Products => "products",
            Self::ProductDetail => "product-detail",
            Self::AddProduct => "add-product",
            Self::Categories => "categories",
            Self::Orders => "orders",
            Self::CreateOrder => "create-order",
            Self::Settings => "settings",
        }
    }
}

pub fn page_key_from_name(name: &str) -> Option<PageKey> {
    let name = name.trim().trim_matches('/');
    PageKey::ALL
        .into_iter()
        .find(|page| page.name().eq_ignore_ascii_case(name))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    Product,
    Products,
    Category,
    Order,
}

/// Payload handed to the destination page's view-model.
#[derive(Debug, Clone, PartialEq)]
pub enum NavigationParameter {
    Product(Product),
    Products(Vec<Product>),
    Category(Category),
    Order(Order),
}

impl NavigationParameter {
    pub fn kind(&self) -> ParameterKind {
        match self {
            Self::Product(_) => ParameterKind::Product,
            Self::Products(_) => ParameterKind::Products,
            Self::Category(_) => ParameterKind::Category,
            Self::Order(_) => ParameterKind::Order,
        }
    }
}

pub trait NavigationAware: Send + Sync {
    fn on_navigated_to(&self, parameter: Option<&NavigationParameter>);
    fn on_navigated_from(&self);
}

pub trait PageViewModel: Send + Sync {
    fn page(&self) -> PageKey;

    fn as_navigation_aware(&self) -> Option<&dyn NavigationAware> {
        None
    }
}

pub type ViewModelResolver = fn(&ServiceRegistry) -> Result<Arc<dyn PageViewModel>, RegistryError>;

/// Resolver for any view-model registered in the service registry under its
/// concrete type.
pub fn resolve_view_model<V>(registry: &ServiceRegistry) -> Result<Arc<dyn PageViewModel>, RegistryError>
where
    V: PageViewModel + 'static,
{
    let view_model: Arc<V> = registry.resolve::<V>()?;
    Ok(view_model)
}

#[derive(Clone, Copy)]
pub struct PageDescriptor {
    resolver: ViewModelResolver,
    accepts: Option<ParameterKind>,
}

impl PageDescriptor {
    pub fn accepts(&self) -> Option<ParameterKind> {
        self.accepts
    }

    pub fn resolve(&self, registry: &ServiceRegistry) -> Result<Arc<dyn PageViewModel>, RegistryError> {
        (self.resolver)(registry)
    }
}

#[derive(Default)]
pub struct PageRegistry {
    pages: HashMap<PageKey, PageDescriptor>,
}

impl PageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a page. A key that is already present keeps its first descriptor.
    pub fn register(
        &mut self,
        page: PageKey,
        accepts: Option<ParameterKind>,
        resolver: ViewModelResolver,
    ) -> &mut Self {
        if self.pages.contains_key(&page) {
            tracing::warn!(
                target: "navigation",
                page = page.name(),
                "page registered twice; keeping the first registration"
            );
            return self;
        }
        self.pages.insert(page, PageDescriptor { resolver, accepts });
        self
    }

    pub fn descriptor(&self, page: PageKey) -> Option<&PageDescriptor> {
        self.pages.get(&page)
    }

    pub fn contains(&self, page: PageKey) -> bool {
        self.pages.contains_key(&page)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BlankViewModel;

    impl PageViewModel for BlankViewModel {
        fn page(&self) -> PageKey {
            PageKey::Dashboard
        }
    }

    #[test]
    fn page_names_round_trip_through_lookup() {
        for page in PageKey::ALL {
            assert_eq!(page_key_from_name(page.name()), Some(page));
        }
    }

    #[test]
    fn page_lookup_ignores_case_and_slashes() {
        assert_eq!(page_key_from_name(" /Create-Order/ "), Some(PageKey::CreateOrder));
        assert_eq!(page_key_from_name("checkout"), None);
        assert_eq!(page_key_from_name(""), None);
    }

    #[test]
    fn parameter_kind_follows_variant() {
        assert_eq!(
            NavigationParameter::Products(Vec::new()).kind(),
            ParameterKind::Products
        );
        assert_eq!(
            NavigationParameter::Order(Order::new("Ada")).kind(),
            ParameterKind::Order
        );
    }

    #[test]
    fn register_keeps_first_descriptor_for_a_page() {
        let mut pages = PageRegistry::new();
        pages
            .register(
                PageKey::Dashboard,
                None,
                resolve_view_model::<BlankViewModel>,
            )
            .register(
                PageKey::Dashboard,
                Some(ParameterKind::Order),
                resolve_view_model::<BlankViewModel>,
            );

        assert_eq!(pages.len(), 1);
        assert_eq!(
            pages.descriptor(PageKey::Dashboard).and_then(PageDescriptor::accepts),
            None
        );
        assert!(!pages.contains(PageKey::Orders));
    }

    #[test]
    fn descriptor_resolves_view_model_through_registry() {
        let mut builder = ServiceRegistry::builder();
        builder
            .register_transient::<BlankViewModel, _>(|_| Ok(Arc::new(BlankViewModel)))
            .expect("register view-model");
        let registry = builder.build();

        let mut pages = PageRegistry::new();
        pages.register(
            PageKey::Dashboard,
            None,
            resolve_view_model::<BlankViewModel>,
        );

        let view_model = pages
            .descriptor(PageKey::Dashboard)
            .expect("dashboard registered")
            .resolve(&registry)
            .expect("resolve view-model");
        assert_eq!(view_model.page(), PageKey::Dashboard);
        assert!(view_model.as_navigation_aware().is_none());
    }

    #[test]
    fn descriptor_reports_unregistered_view_model() {
        let registry = ServiceRegistry::builder().build();
        let mut pages = PageRegistry::new();
        pages.register(
            PageKey::Dashboard,
            None,
            resolve_view_model::<BlankViewModel>,
        );

        assert!(matches!(
            pages
                .descriptor(PageKey::Dashboard)
                .expect("dashboard registered")
                .resolve(&registry),
            Err(RegistryError::UnregisteredService(_))
        ));
    }
}
