//! Release Keeper HTTP API models

pub mod models;
