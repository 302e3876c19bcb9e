pub mod api;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod geo;
pub mod models;
pub mod observability;
pub mod sources;
pub mod state;
