// Core ban tracking module - records, classification and comment requests.

pub mod classifier;
pub mod glob;
pub mod request_router;
pub mod tracking_config;
pub mod tracking_models;
pub mod tracking_service;

pub use tracking_config::*;
pub use tracking_models::*;
pub use tracking_service::*;
