use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;

use crate::error::{invalid_argument, DocSyncResult};

/// Opaque byte payload stored in a document field.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BytesValue {
    bytes: Vec<u8>,
}

impl BytesValue {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn from_base64(encoded: &str) -> DocSyncResult<Self> {
        let bytes = BASE64_STANDARD
            .decode(encoded)
            .map_err(|err| invalid_argument(format!("Invalid base64 bytes: {err}")))?;
        Ok(Self { bytes })
    }

    pub fn to_base64(&self) -> String {
        BASE64_STANDARD.encode(&self.bytes)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_base64() {
        let value = BytesValue::new(vec![1, 2, 3]);
        let encoded = value.to_base64();
        assert_eq!(BytesValue::from_base64(&encoded).unwrap(), value);
    }

    #[test]
    fn rejects_invalid_base64() {
        assert!(BytesValue::from_base64("!!!").is_err());
    }
}
