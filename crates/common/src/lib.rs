//! Common record, query, and error types shared across `record-crypt` crates.

pub mod error;
pub mod protocol;

pub use error::StoreError;
