//! Infrastructure layer - External service implementations

pub mod classifier;
pub mod data;
pub mod database;
pub mod logging;
pub mod services;
pub mod store;
pub mod tracking;
