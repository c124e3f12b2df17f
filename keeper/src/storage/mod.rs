//! Persistent storage

pub mod layout;
pub mod records;
pub mod settings;
