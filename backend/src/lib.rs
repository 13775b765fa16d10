pub mod auth;
pub mod automation;
pub mod config;
pub mod error;
pub mod notify;
pub mod routes;
pub mod scheduler;
pub mod store;
pub mod telemetry;
