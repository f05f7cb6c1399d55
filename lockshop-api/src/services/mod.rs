//! Service Layer
//!
//! Business rules over the record store. Route handlers stay thin and call
//! into these functions with the injected `ShopStore` handle.

pub mod account_service;
pub mod audit_service;
pub mod balance_service;
pub mod password;
pub mod settings_service;
pub mod stock_service;

pub use audit_service::record_admin_action;
pub use balance_service::Adjustment;
