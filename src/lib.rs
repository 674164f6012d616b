pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod geo;
pub mod models;
pub mod observability;
pub mod platform;
pub mod settings;
pub mod state;
pub mod store;
