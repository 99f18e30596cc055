//! Envelope encryption primitives.
//!
//! This module is free of storage and transport concerns. [`cipher`] holds
//! the AES-256-GCM and PBKDF2 primitives; [`envelope`] layers the versioned
//! `<tag>:<payload>` format and custom-cipher dispatch on top.
//!
//! # Envelope format
//!
//! ```text
//! 2:<base64(salt ‖ nonce ‖ ciphertext ‖ tag)>
//! ```
//!
//! `v1` envelopes (hex payload) are accepted on read only; all built-in
//! writes use `v2`.

pub mod cipher;
pub mod envelope;

pub use cipher::KEY_LEN;
pub use envelope::{Encrypted, EnvelopeEngine, EnvelopeError, VersionTag};
