// src/lib.rs
//! Schema, role provisioning and typed data access for the swiftnotes
//! PostgreSQL database.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod provision;

pub use db::MIGRATOR;
pub use error::{Constraint, StoreError, Violation};
