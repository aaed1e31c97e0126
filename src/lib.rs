//! Quitanda API Library
//!
//! Checkout intent issuance, payment webhook reconciliation, and order
//! status tracking for the Quitanda grocery storefront.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod payments;
pub mod services;
pub mod store;
pub mod tracing;

use std::sync::Arc;

use axum::Router;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: config::AppConfig,
    pub store: Arc<dyn store::OrderStore>,
    pub services: handlers::AppServices,
}

/// Versioned API surface, nested under `/api/v1`.
pub fn api_v1_routes() -> Router<AppState> {
    handlers::routes()
}
