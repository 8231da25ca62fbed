pub mod aggregate;
pub mod combine;
pub mod config;
pub mod constants;
pub mod error;
pub mod join;
pub mod logging;
pub mod observability;
pub mod pipeline;
pub mod sources;
pub mod table;

// Publishing boundary: the object-store port and its adapters
pub mod app;
pub mod infra;
