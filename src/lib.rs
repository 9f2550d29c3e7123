// Library exports for testing
pub mod audit;
pub mod certs;
pub mod config;
pub mod error;
pub mod handlers;
pub mod locks;
pub mod models;
pub mod signing;
pub mod storage;
pub mod workflow;
