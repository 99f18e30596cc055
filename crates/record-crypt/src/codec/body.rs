//! The JSON document sealed inside every record envelope.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Envelope contents before encryption.
///
/// `meta` carries the original values of fields that were hashed for
/// transport; `payload` carries the application body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordBody {
    pub meta: BTreeMap<String, Option<String>>,
    #[serde(default)]
    pub payload: Option<String>,
}

impl RecordBody {
    /// Parse a decrypted envelope.
    ///
    /// Returns `None` when the text is not a `{meta, payload}` document, which
    /// is how bodies written before meta packing look.
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}
