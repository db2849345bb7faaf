//! Typed client for the repair shop REST API.
//!
//! This module provides the `ApiClient` struct, a thin layer of endpoint
//! methods over `Transport`. Every call carries the session cookies and
//! recovers from an expired access token transparently.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::models::{
    Brand, DeviceType, Issue, Listing, Location, NewProduct, NewRepair, NewStoreOrder,
    PaginatedResponse, Part, Product, ProductModel, ProductUpdate, ProfileType, Repair,
    RepairStatus, RepairUpdate, StockItem, StockItemUpdate, StoreOrder, StoreOrderStatus,
    StoreOrderUpdate, Supplier, User,
};

use super::transport::{Request, Transport};
use super::ApiError;

// ============================================================================
// Endpoints
// ============================================================================

const LOGIN_ENDPOINT: &str = "/auth/login/";
const LOGOUT_ENDPOINT: &str = "/auth/logout/";
const REPAIRS_ENDPOINT: &str = "/repairs/repairs/";
const ISSUES_ENDPOINT: &str = "/repairs/issues/";
const STORE_ORDERS_ENDPOINT: &str = "/tech/store-orders/";
const STOCK_ITEMS_ENDPOINT: &str = "/tech/stock-items/";
const SUPPLIERS_ENDPOINT: &str = "/tech/suppliers/";
const LOCATIONS_ENDPOINT: &str = "/tech/locations/";
const DEVICE_TYPES_ENDPOINT: &str = "/tech/device-types/";
const BRANDS_ENDPOINT: &str = "/tech/brands/";
const PRODUCT_MODELS_ENDPOINT: &str = "/tech/product-models/";
const PRODUCTS_ENDPOINT: &str = "/tech/products/";
const PARTS_ENDPOINT: &str = "/tech/parts/";
const USERS_ENDPOINT: &str = "/users/";

/// Optional filters of the repairs listing. Unset filters are not sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RepairFilter {
    pub status: Option<RepairStatus>,
    pub client: Option<i64>,
    pub device_type: Option<String>,
}

/// Optional filters of the products listing. Prices are decimal strings,
/// as the backend sends them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ProductFilter {
    pub search: Option<String>,
    pub brand: Option<i64>,
    pub model: Option<i64>,
    pub device_type: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    pub in_stock: Option<bool>,
}

#[derive(Serialize)]
struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

/// Cookie-mode login answers with the user; the tokens travel as cookies.
#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    user: Option<User>,
}

/// API client for the repair shop backend.
/// Clone is cheap - the transport is shared behind an Arc.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<Transport>,
}

impl ApiClient {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    async fn call<T: DeserializeOwned>(&self, request: Request) -> Result<T, ApiError> {
        let path = request.path.clone();
        let response = self.transport.send(request).await?;
        let value = response.json()?;
        debug!(path = %path, "Decoded response");
        Ok(value)
    }

    fn detail_path(endpoint: &str, id: impl std::fmt::Display) -> String {
        format!("{}{}/", endpoint, id)
    }

    // ===== Session =====

    /// Log in with username and password. The backend answers with
    /// HTTP-only session cookies, which the connector keeps.
    pub async fn login(&self, username: &str, password: &str) -> Result<Option<User>, ApiError> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(ApiError::Validation(
                "Username and password are required".to_string(),
            ));
        }
        let request = Request::post(LOGIN_ENDPOINT).json(&Credentials { username, password })?;
        let response: LoginResponse = self.call(request).await?;
        info!(username = %username, "Logged in");
        Ok(response.user)
    }

    pub async fn logout(&self) -> Result<(), ApiError> {
        self.transport.send(Request::post(LOGOUT_ENDPOINT)).await?;
        info!("Logged out");
        Ok(())
    }

    // ===== Repairs =====

    pub async fn fetch_repairs(
        &self,
        page: u32,
        filter: &RepairFilter,
    ) -> Result<PaginatedResponse<Repair>, ApiError> {
        let request = Request::get(REPAIRS_ENDPOINT)
            .query("page", page)
            .query_opt("status", filter.status)
            .query_opt("client", filter.client)
            .query_opt("device_type", filter.device_type.as_deref());
        self.call(request).await
    }

    pub async fn fetch_repair(&self, id: &str) -> Result<Repair, ApiError> {
        if id.is_empty() {
            return Err(ApiError::Validation("Repair id is required".to_string()));
        }
        self.call(Request::get(Self::detail_path(REPAIRS_ENDPOINT, id)))
            .await
    }

    pub async fn create_repair(&self, repair: &NewRepair) -> Result<Repair, ApiError> {
        self.call(Request::post(REPAIRS_ENDPOINT).json(repair)?).await
    }

    pub async fn update_repair(&self, id: i64, update: &RepairUpdate) -> Result<Repair, ApiError> {
        let request = Request::patch(Self::detail_path(REPAIRS_ENDPOINT, id)).json(update)?;
        self.call(request).await
    }

    // ===== Store orders =====

    pub async fn fetch_store_orders(
        &self,
        page: u32,
    ) -> Result<PaginatedResponse<StoreOrder>, ApiError> {
        self.call(Request::get(STORE_ORDERS_ENDPOINT).query("page", page))
            .await
    }

    pub async fn fetch_store_order(&self, id: i64) -> Result<StoreOrder, ApiError> {
        self.call(Request::get(Self::detail_path(STORE_ORDERS_ENDPOINT, id)))
            .await
    }

    pub async fn create_store_order(&self, order: &NewStoreOrder) -> Result<StoreOrder, ApiError> {
        self.call(Request::post(STORE_ORDERS_ENDPOINT).json(order)?)
            .await
    }

    pub async fn update_store_order(
        &self,
        id: i64,
        update: &StoreOrderUpdate,
    ) -> Result<StoreOrder, ApiError> {
        let request = Request::patch(Self::detail_path(STORE_ORDERS_ENDPOINT, id)).json(update)?;
        self.call(request).await
    }

    pub async fn update_store_order_status(
        &self,
        id: i64,
        status: StoreOrderStatus,
    ) -> Result<StoreOrder, ApiError> {
        let request = Request::patch(Self::detail_path(STORE_ORDERS_ENDPOINT, id))
            .json(&json!({ "status": status }))?;
        self.call(request).await
    }

    pub async fn delete_store_order(&self, id: i64) -> Result<(), ApiError> {
        self.transport
            .send(Request::delete(Self::detail_path(STORE_ORDERS_ENDPOINT, id)))
            .await?;
        Ok(())
    }

    // ===== Clients =====

    /// Users, optionally filtered by a name search and by profile type
    pub async fn fetch_clients(
        &self,
        page: u32,
        search: Option<&str>,
        profile_type: Option<ProfileType>,
    ) -> Result<PaginatedResponse<User>, ApiError> {
        let request = Request::get(USERS_ENDPOINT)
            .query("page", page)
            .query_opt("search", search.filter(|s| !s.is_empty()))
            .query_opt("role_name", profile_type.map(|p| p.as_str()));
        self.call(request).await
    }

    // ===== Inventory =====

    pub async fn fetch_suppliers(&self) -> Result<PaginatedResponse<Supplier>, ApiError> {
        self.call(Request::get(SUPPLIERS_ENDPOINT)).await
    }

    pub async fn fetch_locations(&self) -> Result<Vec<Location>, ApiError> {
        let listing: Listing<Location> = self.call(Request::get(LOCATIONS_ENDPOINT)).await?;
        Ok(listing.into_vec())
    }

    pub async fn fetch_stock_items(
        &self,
        page: u32,
    ) -> Result<PaginatedResponse<StockItem>, ApiError> {
        self.call(Request::get(STOCK_ITEMS_ENDPOINT).query("page", page))
            .await
    }

    pub async fn update_stock_item(
        &self,
        id: i64,
        update: &StockItemUpdate,
    ) -> Result<StockItem, ApiError> {
        let request = Request::patch(Self::detail_path(STOCK_ITEMS_ENDPOINT, id)).json(update)?;
        self.call(request).await
    }

    // ===== Products =====

    pub async fn fetch_products(
        &self,
        page: u32,
        filter: &ProductFilter,
    ) -> Result<PaginatedResponse<Product>, ApiError> {
        let request = Request::get(PRODUCTS_ENDPOINT)
            .query("page", page)
            .query_opt("search", filter.search.as_deref().filter(|s| !s.is_empty()))
            .query_opt("brand", filter.brand)
            .query_opt("model", filter.model)
            .query_opt("device_type", filter.device_type.as_deref().filter(|d| !d.is_empty()))
            .query_opt("min_price", filter.min_price.as_deref())
            .query_opt("max_price", filter.max_price.as_deref())
            .query_opt("in_stock", filter.in_stock);
        self.call(request).await
    }

    pub async fn fetch_product(&self, id: i64) -> Result<Product, ApiError> {
        self.call(Request::get(Self::detail_path(PRODUCTS_ENDPOINT, id)))
            .await
    }

    pub async fn create_product(&self, product: &NewProduct) -> Result<Product, ApiError> {
        if product.name.trim().is_empty() {
            return Err(ApiError::Validation("Product name is required".to_string()));
        }
        self.call(Request::post(PRODUCTS_ENDPOINT).json(product)?)
            .await
    }

    pub async fn update_product(
        &self,
        id: i64,
        update: &ProductUpdate,
    ) -> Result<Product, ApiError> {
        let request = Request::patch(Self::detail_path(PRODUCTS_ENDPOINT, id)).json(update)?;
        self.call(request).await
    }

    pub async fn delete_product(&self, id: i64) -> Result<(), ApiError> {
        self.transport
            .send(Request::delete(Self::detail_path(PRODUCTS_ENDPOINT, id)))
            .await?;
        info!(product = id, "Product deleted");
        Ok(())
    }

    pub async fn fetch_parts(&self, page: u32) -> Result<PaginatedResponse<Part>, ApiError> {
        self.call(Request::get(PARTS_ENDPOINT).query("page", page))
            .await
    }

    // ===== Catalogue =====

    pub async fn fetch_device_types(&self) -> Result<PaginatedResponse<DeviceType>, ApiError> {
        self.call(Request::get(DEVICE_TYPES_ENDPOINT)).await
    }

    pub async fn fetch_brands(&self, device_type: Option<i64>) -> Result<Vec<Brand>, ApiError> {
        let request = Request::get(BRANDS_ENDPOINT).query_opt("device_type", device_type);
        let listing: Listing<Brand> = self.call(request).await?;
        Ok(listing.into_vec())
    }

    pub async fn fetch_common_issues(
        &self,
        device_type: Option<&str>,
    ) -> Result<Vec<Issue>, ApiError> {
        let request = Request::get(ISSUES_ENDPOINT)
            .query_opt("device_types", device_type.filter(|d| !d.is_empty()));
        let listing: Listing<Issue> = self.call(request).await?;
        Ok(listing.into_vec())
    }

    pub async fn fetch_product_models(
        &self,
        brand: Option<&str>,
        device_type: Option<i64>,
    ) -> Result<Vec<ProductModel>, ApiError> {
        let request = Request::get(PRODUCT_MODELS_ENDPOINT)
            .query_opt("brand", brand.filter(|b| !b.is_empty()))
            .query_opt("device_type", device_type);
        let listing: Listing<ProductModel> = self.call(request).await?;
        Ok(listing.into_vec())
    }
}
