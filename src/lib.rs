//! StateSet Warehouse
//!
//! Scan-driven reconciliation of warehouse documents: receiving, placement, picking,
//! shipment, returns and inventory counts. Every document type runs through the same
//! engine and differs only by its [`models::ReconcilePolicy`].
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod commands;
pub mod config;
pub mod errors;
pub mod events;
pub mod models;
pub mod repositories;
pub mod services;
pub mod sources;
pub mod sync_queue;

pub use commands::Command;
pub use errors::{PolicyViolation, ServiceError};
pub use services::factory::{ServiceContainer, ServiceFactory};
pub use services::scan_engine::{ScanEngine, ScanOutcome, ScanSession};
