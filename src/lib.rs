//! Dineline API Library
//!
//! Order & payment orchestration engine for a multi-tenant restaurant
//! ordering platform: atomic order intake, a strict status state machine,
//! role-scoped realtime fan-out, and idempotent reconciliation of
//! split-settlement gateway webhooks.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod cache;
pub mod common;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod handlers;
pub mod migrator;
pub mod openapi;
pub mod services;

use std::sync::Arc;

use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use utoipa::ToSchema;

use events::broadcaster::Broadcaster;
use gateway::PaymentGateway;

pub use handlers::router;

// App state shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
    pub broadcaster: Arc<dyn Broadcaster>,
}

impl AppState {
    pub fn new(
        config: config::AppConfig,
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        broadcaster: Arc<dyn Broadcaster>,
        event_sender: events::EventSender,
    ) -> Self {
        let services = handlers::AppServices::new(
            db.clone(),
            &config,
            Arc::new(event_sender.clone()),
            gateway,
        );
        Self {
            db,
            config,
            event_sender,
            services,
            broadcaster,
        }
    }
}

// Common response wrapper
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}
