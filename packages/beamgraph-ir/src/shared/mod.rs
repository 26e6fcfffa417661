//! Shared models, ports and utilities

pub mod models;
pub mod ports;
pub mod utils;
