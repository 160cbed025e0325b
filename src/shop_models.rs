use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Entities stored by both repository backends, addressed by numeric id.
/// An id of `0` means "not saved yet".
pub trait ShopEntity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const COLLECTION: &'static str;

    fn id(&self) -> i64;
    fn set_id(&mut self, id: i64);
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub author: String,
    pub category_id: i64,
    pub price: f64,
    pub quantity: u32,
    pub image: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Paid,
    Shipped,
    Cancelled,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderItem {
    pub product_id: i64,
    pub quantity: u32,
    pub unit_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub customer_name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub status: OrderStatus,
    #[serde(default)]
    pub items: Vec<OrderItem>,
}

impl Order {
    pub fn new(customer_name: impl Into<String>) -> Self {
        Self {
            id: 0,
            customer_name: customer_name.into(),
            created_at: Utc::now(),
            status: OrderStatus::Pending,
            items: Vec::new(),
        }
    }

    pub fn total(&self) -> f64 {
        self.items
            .iter()
            .map(|item| item.unit_price * f64::from(item.quantity))
            .sum()
    }
}

impl ShopEntity for Category {
    const COLLECTION: &'static str = "categories";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }
}

impl ShopEntity for Product {
    const COLLECTION: &'static str = "products";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }
}

impl ShopEntity for Order {
    const COLLECTION: &'static str = "orders";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_total_sums_line_items() {
        let mut order = Order::new("Ada");
        order.items = vec![
            OrderItem {
                product_id: 1,
                quantity: 2,
                unit_price: 12.5,
            },
            OrderItem {
                product_id: 2,
                quantity: 1,
                unit_price: 5.0,
            },
        ];
        assert_eq!(order.total(), 30.0);
    }

    #[test]
    fn product_deserializes_camel_case_with_missing_fields() {
        let product: Product =
            serde_json::from_str(r#"{"id": 4, "name": "Dune", "categoryId": 2}"#).expect("parse");
        assert_eq!(product.id, 4);
        assert_eq!(product.category_id, 2);
        assert_eq!(product.quantity, 0);
        assert!(product.image.is_empty());
    }
}
