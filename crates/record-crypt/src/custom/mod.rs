//! Pluggable custom ciphers.
//!
//! Applications may replace the built-in AES-GCM write path with their own
//! cipher. Each cipher is registered under a version label that is packed into
//! the envelope tag, so records written by older ciphers stay readable as long
//! as their config remains registered.
//!
//! Custom ciphers only ever see secrets flagged `isForCustomEncryption`.
//! Because they are arbitrary user code, [`CustomCipherRegistry::validate`]
//! round-trips sample text through every cipher and custom secret at setup.

pub mod registry;

pub use registry::{
    CustomCipher, CustomCipherError, CustomCipherRegistry, CustomEncryptionConfig, CustomHandle,
    SelfTestFailure,
};
