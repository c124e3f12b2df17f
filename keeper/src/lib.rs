//! Release Keeper Library
//!
//! Deployment history, health validation and rollback for a single
//! self-hosted service.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod models;
pub mod notify;
pub mod server;
pub mod storage;
pub mod telemetry;
pub mod utils;
pub mod workers;
