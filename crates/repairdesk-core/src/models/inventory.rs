use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct Supplier {
    pub id: i64,
    pub name: String,
    #[serde(default, alias = "contact_person")]
    pub contact_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct Location {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default, rename = "type")]
    pub location_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct StockType {
    pub id: i64,
    pub name: String,
}

/// A sellable part or device. Prices are decimal strings as sent by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct Product {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub ean13: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub repair_price: Option<String>,
    #[serde(default)]
    pub special_price: Option<String>,
    #[serde(default)]
    pub other_price: Option<String>,
    #[serde(default)]
    pub brand: Option<i64>,
    #[serde(default)]
    pub brand_name: Option<String>,
    #[serde(default)]
    pub model: Option<i64>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Spare parts come back in the product shape.
pub type Part = Product;

/// POST body for a new product.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct NewProduct {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ean13: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub price: String,
    pub repair_price: String,
    pub special_price: String,
    pub other_price: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<i64>,
}

/// PATCH body for a product; only set fields are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct ProductUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repair_price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub special_price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub other_price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct StockItem {
    pub id: i64,
    #[serde(default, alias = "part")]
    pub product: Option<Product>,
    #[serde(default)]
    pub location: Option<i64>,
    #[serde(default)]
    pub location_name: Option<String>,
    #[serde(default)]
    pub stock_type: Option<StockType>,
    #[serde(default)]
    pub quantity: u32,
    #[serde(default)]
    pub serial_number: Option<String>,
}

impl StockItem {
    pub fn product_name(&self) -> &str {
        self.product.as_ref().map_or("(unknown part)", |p| p.name.as_str())
    }

    /// Below this many units an item is flagged for reorder
    pub const LOW_STOCK_THRESHOLD: u32 = 3;

    pub fn is_low(&self) -> bool {
        self.quantity < Self::LOW_STOCK_THRESHOLD
    }
}

/// PATCH body for a stock item; only set fields are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct StockItemUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct Brand {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub enum DeviceDomain {
    Computers,
    Phones,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct DeviceType {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub domain: Option<DeviceDomain>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct ProductModel {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub brand: Option<i64>,
    #[serde(default)]
    pub series: Option<i64>,
    #[serde(default)]
    pub is_popular: bool,
}

/// A common repair issue offered for a device type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct Issue {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub device_types: Vec<i64>,
    #[serde(default)]
    pub requires_part: bool,
    #[serde(default)]
    pub base_price: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_item_with_nested_part() {
        let item: StockItem = serde_json::from_str(
            r#"{"id": 4, "part": {"id": 9, "name": "iPhone 12 screen", "price": "89.90",
                 "brand": 1, "brand_name": "Apple", "model": 20, "model_name": "iPhone 12"},
                "location": 2, "location_name": "Atelier", "quantity": 2, "serial_number": null}"#,
        )
        .unwrap();
        assert_eq!(item.product_name(), "iPhone 12 screen");
        assert_eq!(item.location_name.as_deref(), Some("Atelier"));
        assert!(item.is_low());
    }

    #[test]
    fn test_stock_update_sends_only_set_fields() {
        let update = StockItemUpdate {
            quantity: Some(12),
            ..Default::default()
        };
        assert_eq!(serde_json::to_string(&update).unwrap(), r#"{"quantity":12}"#);
    }

    #[test]
    fn test_new_product_omits_unset_references() {
        let product = NewProduct {
            name: "Galaxy S21 battery".to_string(),
            price: "39.90".to_string(),
            repair_price: "69.00".to_string(),
            special_price: "35.00".to_string(),
            other_price: "0".to_string(),
            brand: Some(2),
            ..Default::default()
        };
        let value = serde_json::to_value(&product).unwrap();
        assert_eq!(value["brand"], 2);
        assert!(value.get("model").is_none());
        assert!(value.get("sku").is_none());
    }

    #[test]
    fn test_part_reads_product_shape() {
        let part: Part = serde_json::from_str(
            r#"{"id": 3, "name": "Nappe de charge", "ean13": null, "sku": "NC-3",
                "serial_number": "", "image_url": "", "price": "12.00", "repair_price": "30.00",
                "special_price": "10.00", "other_price": "0.00", "brand": null, "brand_name": null,
                "model": null, "model_name": null, "created_at": "2024-03-02T10:00:00Z",
                "updated_at": "2024-03-02T10:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(part.sku.as_deref(), Some("NC-3"));
        assert_eq!(part.special_price.as_deref(), Some("10.00"));
        assert!(part.brand.is_none());
    }

    #[test]
    fn test_device_type_domain() {
        let device: DeviceType = serde_json::from_str(
            r#"{"id": 1, "name": "Smartphone", "slug": "smartphone", "description": "",
                "icon": null, "domain": "PHONES"}"#,
        )
        .unwrap();
        assert_eq!(device.domain, Some(DeviceDomain::Phones));
    }
}
