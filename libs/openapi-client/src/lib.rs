//! Outbound wire models for Release Keeper

pub mod models;
