//! Library crate for dirtrace-rs: scan session engine, result aggregation and reporting.
pub mod aggregate;
pub mod backend;
pub mod classify;
pub mod dictionary;
pub mod error;
pub mod report;
pub mod server;
pub mod session;
pub mod types;
