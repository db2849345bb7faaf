//! Data models for the repair shop backend.
//!
//! This module contains the serde structures for the data the dashboard
//! reads and writes:
//!
//! - `Repair`, `RepairStatus`: repair tickets and their write bodies
//! - `StoreOrder`, `StoreOrderStatus`: parts orders placed with suppliers
//! - Inventory: `StockItem`, `Product` (and `Part`), `Supplier`, `Location`
//! - Catalogue: `DeviceType`, `Brand`, `ProductModel`, `Issue`
//! - `User`, `Profile`: accounts, including shop clients
//! - `PaginatedResponse`, `Listing`: list envelopes

pub mod common;
pub mod inventory;
pub mod repair;
pub mod store_order;
pub mod user;

pub use common::{Listing, PaginatedResponse};
pub use inventory::{
    Brand, DeviceDomain, DeviceType, Issue, Location, NewProduct, Part, Product, ProductModel,
    ProductUpdate, StockItem, StockItemUpdate, StockType, Supplier,
};
pub use repair::{NewRepair, Repair, RepairStatus, RepairUpdate};
pub use store_order::{NewStoreOrder, StoreOrder, StoreOrderStatus, StoreOrderUpdate};
pub use user::{Profile, ProfileType, User};
