//! `record-crypt`: client-side protection for records bound for a regional
//! record store.
//!
//! Before a record leaves the process its searchable fields are replaced by
//! environment-scoped SHA-256 hashes and its body is sealed in a versioned
//! envelope. Reads reverse the pipeline, and [`Storage::migrate`] moves
//! records written under older secrets onto the current one.
//!
//! ```text
//! SecretSource ──► SecretResolver ──┐
//! CustomCipherRegistry ─────────────┼─► EnvelopeEngine ─► RecordCodec ─► Storage ─► RecordStore
//! ```

pub mod codec;
pub mod config;
pub mod crypto;
pub mod custom;
pub mod error;
pub mod secrets;
pub mod storage;

pub use codec::{DecodeFailure, RecordCodec};
pub use config::CryptConfig;
pub use crypto::{Encrypted, EnvelopeEngine, EnvelopeError};
pub use custom::{CustomCipher, CustomEncryptionConfig};
pub use error::{Error, ErrorKind};
pub use secrets::{SecretOrKey, SecretSource, SecretsData, SecretsInput};
pub use storage::{FindResult, RecordStore, Storage, StorageBuilder};
