pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod geo;
pub mod map;
pub mod models;
pub mod observability;
pub mod state;
pub mod tracking;

#[cfg(test)]
pub(crate) mod testing;
