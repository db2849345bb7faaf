//! Query and mutation catalogue.
//!
//! Each read pairs a `QueryKey` with the `ApiClient` call that fills it, so
//! every consumer of the same data shares one cache entry. Writes go through
//! `QueryCache::mutate` and name the keys they make stale.

use std::future::Future;

use futures::future::{BoxFuture, FutureExt};

use crate::api::{ApiClient, ApiError, ProductFilter, RepairFilter};
use crate::cache::{QueryCache, QueryKey, QueryOptions, Subscription};
use crate::models::{
    Brand, DeviceType, Issue, Location, NewProduct, NewRepair, NewStoreOrder, PaginatedResponse,
    Part, Product, ProductModel, ProductUpdate, ProfileType, Repair, RepairUpdate, StockItem,
    StockItemUpdate, StoreOrder, StoreOrderStatus, StoreOrderUpdate, Supplier, User,
};

/// Query keys, shared by reads and by the invalidations of writes.
pub mod keys {
    use super::{ProductFilter, ProfileType, QueryKey, RepairFilter};
    use crate::query_key;

    pub fn repairs_root() -> QueryKey {
        query_key!["repairs"]
    }

    /// `["repairs", page, status, client, device_type]`
    pub fn repairs(page: u32, filter: &RepairFilter) -> QueryKey {
        query_key![
            "repairs",
            page,
            filter.status.map(|s| s.as_str()),
            filter.client,
            filter.device_type.as_deref()
        ]
    }

    pub fn repair(id: &str) -> QueryKey {
        query_key!["repair", id]
    }

    pub fn store_orders() -> QueryKey {
        query_key!["storeOrders"]
    }

    pub fn store_order(id: i64) -> QueryKey {
        query_key!["storeOrder", id]
    }

    pub fn stock_items_root() -> QueryKey {
        query_key!["stock-items"]
    }

    pub fn stock_items(page: u32) -> QueryKey {
        query_key!["stock-items", page]
    }

    pub fn products_root() -> QueryKey {
        query_key!["products"]
    }

    /// `["products", page, search, brand, model, device_type, min_price, max_price, in_stock]`
    pub fn products(page: u32, filter: &ProductFilter) -> QueryKey {
        query_key![
            "products",
            page,
            filter.search.as_deref(),
            filter.brand,
            filter.model,
            filter.device_type.as_deref(),
            filter.min_price.as_deref(),
            filter.max_price.as_deref(),
            filter.in_stock
        ]
    }

    pub fn product(id: i64) -> QueryKey {
        query_key!["product", id]
    }

    pub fn parts(page: u32) -> QueryKey {
        query_key!["parts", page]
    }

    pub fn clients(page: u32, search: Option<&str>, profile_type: Option<ProfileType>) -> QueryKey {
        query_key!["clients", page, search, profile_type.map(|p| p.as_str())]
    }

    pub fn suppliers() -> QueryKey {
        query_key!["suppliers"]
    }

    pub fn locations() -> QueryKey {
        query_key!["inventoryLocations"]
    }

    pub fn device_types() -> QueryKey {
        query_key!["device-types"]
    }

    pub fn brands(device_type: Option<i64>) -> QueryKey {
        query_key!["brands", device_type]
    }

    pub fn common_issues(device_type: Option<&str>) -> QueryKey {
        query_key!["common-issues", device_type]
    }

    pub fn product_models(brand: Option<&str>, device_type: Option<i64>) -> QueryKey {
        query_key!["product-models", brand, device_type]
    }
}

/// The reads and writes available to the UI layer.
/// Clone is cheap - both the cache and the client are shared handles.
#[derive(Clone)]
pub struct Queries {
    cache: QueryCache,
    api: ApiClient,
    defaults: QueryOptions,
}

impl Queries {
    pub fn new(cache: QueryCache, api: ApiClient, defaults: QueryOptions) -> Self {
        Self {
            cache,
            api,
            defaults,
        }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Build a fetcher that clones the client into every call.
    fn fetcher<T, F, Fut>(
        &self,
        call: F,
    ) -> impl Fn() -> Fut + Send + Sync + 'static
    where
        F: Fn(ApiClient) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let api = self.api.clone();
        move || call(api.clone())
    }

    // ===== Repairs =====

    /// Paginated repairs. Changing page or filters through
    /// [`Queries::show_repairs_page`] keeps the previous page on screen
    /// until the new one arrives.
    pub fn repairs(
        &self,
        page: u32,
        filter: RepairFilter,
    ) -> Subscription<PaginatedResponse<Repair>> {
        let key = keys::repairs(page, &filter);
        let fetch = self.repairs_fetcher(page, filter);
        self.cache
            .subscribe(key, fetch, self.defaults.clone().keep_previous_page(1))
    }

    pub fn show_repairs_page(
        &self,
        subscription: &mut Subscription<PaginatedResponse<Repair>>,
        page: u32,
        filter: RepairFilter,
    ) {
        let key = keys::repairs(page, &filter);
        subscription.set_key(key, self.repairs_fetcher(page, filter));
    }

    fn repairs_fetcher(
        &self,
        page: u32,
        filter: RepairFilter,
    ) -> impl Fn() -> BoxFuture<'static, Result<PaginatedResponse<Repair>, ApiError>>
           + Send
           + Sync
           + 'static {
        self.fetcher(move |api| {
            let filter = filter.clone();
            async move { api.fetch_repairs(page, &filter).await }.boxed()
        })
    }

    /// A single repair. Stays idle while `id` is empty.
    pub fn repair(&self, id: &str) -> Subscription<Repair> {
        let owned = id.to_string();
        let fetch = self.fetcher(move |api| {
            let id = owned.clone();
            async move { api.fetch_repair(&id).await }
        });
        self.cache.subscribe(
            keys::repair(id),
            fetch,
            self.defaults.clone().enabled(!id.is_empty()),
        )
    }

    pub async fn create_repair(&self, repair: &NewRepair) -> Result<Repair, ApiError> {
        self.cache
            .mutate(self.api.create_repair(repair), [keys::repairs_root()])
            .await
    }

    pub async fn update_repair(&self, id: i64, update: &RepairUpdate) -> Result<Repair, ApiError> {
        self.cache
            .mutate(
                self.api.update_repair(id, update),
                [keys::repairs_root(), keys::repair(&id.to_string())],
            )
            .await
    }

    // ===== Store orders =====

    pub fn store_orders(&self) -> Subscription<PaginatedResponse<StoreOrder>> {
        let fetch = self.fetcher(|api| async move { api.fetch_store_orders(1).await });
        self.cache
            .subscribe(keys::store_orders(), fetch, self.defaults.clone())
    }

    /// A single store order. Stays idle while `id` is 0.
    pub fn store_order(&self, id: i64) -> Subscription<StoreOrder> {
        let fetch = self.fetcher(move |api| async move { api.fetch_store_order(id).await });
        self.cache.subscribe(
            keys::store_order(id),
            fetch,
            self.defaults.clone().enabled(id != 0),
        )
    }

    pub async fn create_store_order(&self, order: &NewStoreOrder) -> Result<StoreOrder, ApiError> {
        self.cache
            .mutate(self.api.create_store_order(order), [keys::store_orders()])
            .await
    }

    pub async fn update_store_order(
        &self,
        id: i64,
        update: &StoreOrderUpdate,
    ) -> Result<StoreOrder, ApiError> {
        self.cache
            .mutate(
                self.api.update_store_order(id, update),
                [keys::store_orders(), keys::store_order(id)],
            )
            .await
    }

    pub async fn update_store_order_status(
        &self,
        id: i64,
        status: StoreOrderStatus,
    ) -> Result<StoreOrder, ApiError> {
        self.cache
            .mutate(
                self.api.update_store_order_status(id, status),
                [keys::store_orders(), keys::store_order(id)],
            )
            .await
    }

    pub async fn delete_store_order(&self, id: i64) -> Result<(), ApiError> {
        self.cache
            .mutate(
                self.api.delete_store_order(id),
                [keys::store_orders(), keys::store_order(id)],
            )
            .await
    }

    // ===== Inventory =====

    pub fn stock_items(&self, page: u32) -> Subscription<PaginatedResponse<StockItem>> {
        let fetch = self.fetcher(move |api| async move { api.fetch_stock_items(page).await });
        self.cache.subscribe(
            keys::stock_items(page),
            fetch,
            self.defaults.clone().keep_previous_page(1),
        )
    }

    pub fn show_stock_page(
        &self,
        subscription: &mut Subscription<PaginatedResponse<StockItem>>,
        page: u32,
    ) {
        let fetch = self.fetcher(move |api| async move { api.fetch_stock_items(page).await });
        subscription.set_key(keys::stock_items(page), fetch);
    }

    pub async fn update_stock_item(
        &self,
        id: i64,
        update: &StockItemUpdate,
    ) -> Result<StockItem, ApiError> {
        self.cache
            .mutate(self.api.update_stock_item(id, update), [keys::stock_items_root()])
            .await
    }

    // ===== Products =====

    /// Paginated products. Page changes through [`Queries::show_products_page`]
    /// keep the previous page on screen; filter changes do not.
    pub fn products(
        &self,
        page: u32,
        filter: ProductFilter,
    ) -> Subscription<PaginatedResponse<Product>> {
        let key = keys::products(page, &filter);
        let fetch = self.products_fetcher(page, filter);
        self.cache
            .subscribe(key, fetch, self.defaults.clone().keep_previous_page(1))
    }

    pub fn show_products_page(
        &self,
        subscription: &mut Subscription<PaginatedResponse<Product>>,
        page: u32,
        filter: ProductFilter,
    ) {
        let key = keys::products(page, &filter);
        subscription.set_key(key, self.products_fetcher(page, filter));
    }

    fn products_fetcher(
        &self,
        page: u32,
        filter: ProductFilter,
    ) -> impl Fn() -> BoxFuture<'static, Result<PaginatedResponse<Product>, ApiError>>
           + Send
           + Sync
           + 'static {
        self.fetcher(move |api| {
            let filter = filter.clone();
            async move { api.fetch_products(page, &filter).await }.boxed()
        })
    }

    /// A single product. Stays idle while `id` is 0.
    pub fn product(&self, id: i64) -> Subscription<Product> {
        let fetch = self.fetcher(move |api| async move { api.fetch_product(id).await });
        self.cache.subscribe(
            keys::product(id),
            fetch,
            self.defaults.clone().enabled(id != 0),
        )
    }

    pub async fn create_product(&self, product: &NewProduct) -> Result<Product, ApiError> {
        self.cache
            .mutate(self.api.create_product(product), [keys::products_root()])
            .await
    }

    pub async fn update_product(
        &self,
        id: i64,
        update: &ProductUpdate,
    ) -> Result<Product, ApiError> {
        self.cache
            .mutate(
                self.api.update_product(id, update),
                [keys::products_root(), keys::product(id)],
            )
            .await
    }

    pub async fn delete_product(&self, id: i64) -> Result<(), ApiError> {
        self.cache
            .mutate(
                self.api.delete_product(id),
                [keys::products_root(), keys::product(id)],
            )
            .await
    }

    pub fn parts(&self, page: u32) -> Subscription<PaginatedResponse<Part>> {
        let fetch = self.fetcher(move |api| async move { api.fetch_parts(page).await });
        self.cache
            .subscribe(keys::parts(page), fetch, self.defaults.clone())
    }

    pub fn suppliers(&self) -> Subscription<PaginatedResponse<Supplier>> {
        let fetch = self.fetcher(|api| async move { api.fetch_suppliers().await });
        self.cache
            .subscribe(keys::suppliers(), fetch, self.defaults.clone())
    }

    pub fn locations(&self) -> Subscription<Vec<Location>> {
        let fetch = self.fetcher(|api| async move { api.fetch_locations().await });
        self.cache
            .subscribe(keys::locations(), fetch, self.defaults.clone())
    }

    // ===== Clients =====

    pub fn clients(
        &self,
        page: u32,
        search: Option<String>,
        profile_type: Option<ProfileType>,
    ) -> Subscription<PaginatedResponse<User>> {
        let key = keys::clients(page, search.as_deref(), profile_type);
        let fetch = self.fetcher(move |api| {
            let search = search.clone();
            async move {
                api.fetch_clients(page, search.as_deref(), profile_type)
                    .await
            }
        });
        self.cache
            .subscribe(key, fetch, self.defaults.clone().keep_previous_page(1))
    }

    // ===== Catalogue =====

    pub fn device_types(&self) -> Subscription<PaginatedResponse<DeviceType>> {
        let fetch = self.fetcher(|api| async move { api.fetch_device_types().await });
        self.cache
            .subscribe(keys::device_types(), fetch, self.defaults.clone())
    }

    pub fn brands(&self, device_type: Option<i64>) -> Subscription<Vec<Brand>> {
        let fetch = self.fetcher(move |api| async move { api.fetch_brands(device_type).await });
        self.cache
            .subscribe(keys::brands(device_type), fetch, self.defaults.clone())
    }

    /// Issues for a device type. Stays idle until a device type is chosen.
    pub fn common_issues(&self, device_type: Option<String>) -> Subscription<Vec<Issue>> {
        let key = keys::common_issues(device_type.as_deref());
        let enabled = device_type.as_deref().is_some_and(|d| !d.is_empty());
        let fetch = self.fetcher(move |api| {
            let device_type = device_type.clone();
            async move { api.fetch_common_issues(device_type.as_deref()).await }
        });
        self.cache
            .subscribe(key, fetch, self.defaults.clone().enabled(enabled))
    }

    /// Models of a brand. Stays idle until a brand is chosen.
    pub fn product_models(
        &self,
        brand: Option<String>,
        device_type: Option<i64>,
    ) -> Subscription<Vec<ProductModel>> {
        let key = keys::product_models(brand.as_deref(), device_type);
        let enabled = brand.as_deref().is_some_and(|b| !b.is_empty());
        let fetch = self.fetcher(move |api| {
            let brand = brand.clone();
            async move {
                api.fetch_product_models(brand.as_deref(), device_type)
                    .await
            }
        });
        self.cache
            .subscribe(key, fetch, self.defaults.clone().enabled(enabled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{MockBackend, MockBackendExt};
    use crate::cache::{KeyPart, QueryStatus};
    use crate::models::RepairStatus;
    use reqwest::{Method, StatusCode};
    use std::sync::Arc;

    const REPAIRS_PAGE: &str = r#"{"count": 1, "next": null, "previous": null, "results": [
        {"id": 42, "uid": "R-42", "date": "2024-03-02", "client": {"id": 7, "username": "client7"},
         "description": "Broken screen", "price": "120.00", "status": "saisie"}]}"#;

    const REPAIR_42: &str = r#"{"id": 42, "uid": "R-42", "date": "2024-03-02",
        "client": {"id": 7, "username": "client7"}, "description": "Broken screen",
        "price": "120.00", "status": "prete"}"#;

    fn queries(backend: &Arc<MockBackend>) -> Queries {
        let api = ApiClient::new(Arc::new(backend.transport()));
        Queries::new(QueryCache::new(), api, QueryOptions::default())
    }

    fn repairs_calls(backend: &MockBackend) -> usize {
        backend
            .requests()
            .iter()
            .filter(|r| r.method == Method::GET && r.path == "/repairs/repairs/")
            .count()
    }

    #[test]
    fn test_repairs_key_layout() {
        let filter = RepairFilter {
            status: Some(RepairStatus::EnCours),
            client: None,
            device_type: Some("smartphone".to_string()),
        };
        let key = keys::repairs(2, &filter);
        assert_eq!(key.serialized(), r#"["repairs",2,"en-cours",null,"smartphone"]"#);
        assert_eq!(key.parts()[0], KeyPart::from("repairs"));
    }

    #[tokio::test]
    async fn test_repairs_are_fetched_and_shared() {
        let backend = MockBackend::new().route(
            Method::GET,
            "/repairs/repairs/",
            StatusCode::OK,
            REPAIRS_PAGE,
        );
        let queries = queries(&backend);

        let mut first = queries.repairs(1, RepairFilter::default());
        let mut second = queries.repairs(1, RepairFilter::default());
        let (a, b) = tokio::join!(first.settled(), second.settled());

        assert_eq!(a.status, QueryStatus::Success);
        assert_eq!(b.data.map(|p| p.count), Some(1));
        assert_eq!(repairs_calls(&backend), 1);
    }

    #[tokio::test]
    async fn test_repair_without_id_is_idle() {
        let backend = MockBackend::new();
        let queries = queries(&backend);

        let repair = queries.repair("");
        tokio::task::yield_now().await;
        assert_eq!(repair.snapshot().status, QueryStatus::Idle);
        assert_eq!(backend.data_calls(), 0);
    }

    #[tokio::test]
    async fn test_update_repair_refreshes_list_and_detail() {
        let backend = MockBackend::new()
            .route(Method::GET, "/repairs/repairs/", StatusCode::OK, REPAIRS_PAGE)
            .route(Method::GET, "/repairs/repairs/42/", StatusCode::OK, REPAIR_42)
            .route(Method::PATCH, "/repairs/repairs/42/", StatusCode::OK, REPAIR_42);
        let queries = queries(&backend);

        let mut list = queries.repairs(1, RepairFilter::default());
        let mut detail = queries.repair("42");
        list.settled().await;
        detail.settled().await;

        let update = RepairUpdate {
            status: Some(RepairStatus::Prete),
            ..Default::default()
        };
        let updated = queries.update_repair(42, &update).await.unwrap();
        assert_eq!(updated.status, RepairStatus::Prete);

        list.settled().await;
        let detail_state = detail.settled().await;
        assert_eq!(repairs_calls(&backend), 2);
        assert_eq!(detail_state.data.map(|r| r.status), Some(RepairStatus::Prete));
    }

    #[tokio::test]
    async fn test_failed_write_keeps_cached_orders() {
        let backend = MockBackend::new()
            .route(
                Method::GET,
                "/tech/store-orders/",
                StatusCode::OK,
                r#"{"count": 0, "next": null, "previous": null, "results": []}"#,
            )
            .route(
                Method::PATCH,
                "/tech/store-orders/3/",
                StatusCode::BAD_REQUEST,
                r#"{"status": ["\"shipped\" is not a valid choice."]}"#,
            );
        let queries = queries(&backend);

        let mut orders = queries.store_orders();
        orders.settled().await;

        let result = queries
            .update_store_order_status(3, StoreOrderStatus::Received)
            .await;
        assert!(matches!(result, Err(ApiError::Server { status: 400, .. })));

        let info = queries.cache().entry_info(&keys::store_orders()).unwrap();
        assert!(!info.is_stale);
        assert_eq!(info.status, QueryStatus::Success);
    }

    #[tokio::test]
    async fn test_page_change_keeps_previous_page() {
        let backend = MockBackend::new().route(
            Method::GET,
            "/repairs/repairs/",
            StatusCode::OK,
            REPAIRS_PAGE,
        );
        let queries = queries(&backend);

        let mut list = queries.repairs(1, RepairFilter::default());
        list.settled().await;

        queries.show_repairs_page(&mut list, 2, RepairFilter::default());
        let waiting = list.snapshot();
        assert_eq!(waiting.status, QueryStatus::Loading);
        assert!(waiting.is_placeholder);
        assert!(waiting.data.is_some());

        let next = list.settled().await;
        assert!(!next.is_placeholder);
        assert_eq!(list.key(), &keys::repairs(2, &RepairFilter::default()));
    }

    #[tokio::test]
    async fn test_filter_change_does_not_show_other_filter_rows() {
        let backend = MockBackend::new().route(
            Method::GET,
            "/repairs/repairs/",
            StatusCode::OK,
            REPAIRS_PAGE,
        );
        let queries = queries(&backend);

        let in_progress = RepairFilter {
            status: Some(RepairStatus::EnCours),
            ..Default::default()
        };
        let mut list = queries.repairs(1, in_progress);
        list.settled().await;

        let ready = RepairFilter {
            status: Some(RepairStatus::Prete),
            ..Default::default()
        };
        queries.show_repairs_page(&mut list, 1, ready);
        let waiting = list.snapshot();
        assert_eq!(waiting.status, QueryStatus::Loading);
        assert!(!waiting.is_placeholder);
        assert!(waiting.data.is_none());
    }

    #[tokio::test]
    async fn test_update_product_refreshes_product_lists() {
        let backend = MockBackend::new()
            .route(
                Method::GET,
                "/tech/products/",
                StatusCode::OK,
                r#"{"count": 1, "next": null, "previous": null, "results": [
                    {"id": 5, "name": "iPhone 12 screen", "price": "89.90"}]}"#,
            )
            .route(
                Method::PATCH,
                "/tech/products/5/",
                StatusCode::OK,
                r#"{"id": 5, "name": "iPhone 12 screen", "price": "79.90"}"#,
            );
        let queries = queries(&backend);

        let mut products = queries.products(1, ProductFilter::default());
        products.settled().await;

        let update = ProductUpdate {
            price: Some("79.90".to_string()),
            ..Default::default()
        };
        let updated = queries.update_product(5, &update).await.unwrap();
        assert_eq!(updated.price.as_deref(), Some("79.90"));

        products.settled().await;
        let product_list_calls = backend
            .requests()
            .iter()
            .filter(|r| r.method == Method::GET && r.path == "/tech/products/")
            .count();
        assert_eq!(product_list_calls, 2);
    }

    #[test]
    fn test_product_key_layout() {
        let filter = ProductFilter {
            brand: Some(1),
            in_stock: Some(true),
            ..Default::default()
        };
        assert_eq!(
            keys::products(3, &filter).serialized(),
            r#"["products",3,null,1,null,null,null,null,true]"#
        );
        assert_eq!(keys::parts(2).serialized(), r#"["parts",2]"#);
    }

    #[tokio::test]
    async fn test_product_models_wait_for_brand() {
        let backend = MockBackend::new().route(
            Method::GET,
            "/tech/product-models/",
            StatusCode::OK,
            r#"[{"id": 20, "name": "iPhone 12", "brand": 1}]"#,
        );
        let queries = queries(&backend);

        let idle = queries.product_models(None, Some(1));
        assert_eq!(idle.snapshot().status, QueryStatus::Idle);

        let mut models = queries.product_models(Some("1".to_string()), Some(1));
        let state = models.settled().await;
        assert_eq!(state.data.map(|m| m.len()), Some(1));
    }
}
