//! Payload codec seam.
//!
//! Typed requests and responses cross the core as opaque bytes; this module
//! is the single place that turns values into bytes and back. The wire
//! format is postcard, but nothing outside this module depends on that.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::RpcError;

/// Marshal a typed message into body bytes.
pub fn to_bytes<T: Serialize>(value: &T) -> Result<Bytes, RpcError> {
    postcard::to_allocvec(value)
        .map(Bytes::from)
        .map_err(RpcError::Encode)
}

/// Unmarshal body bytes into a typed message.
pub fn from_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, RpcError> {
    postcard::from_bytes(bytes).map_err(RpcError::Decode)
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;
    use crate::RpcError;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Ping {
        seq: u64,
        note: String,
    }

    #[test]
    fn round_trip() {
        let ping = Ping {
            seq: 42,
            note: "hello".into(),
        };
        let bytes = to_bytes(&ping).unwrap();
        let back: Ping = from_bytes(&bytes).unwrap();
        assert_eq!(back, ping);
    }

    #[test]
    fn unit_payload_is_empty() {
        let bytes = to_bytes(&()).unwrap();
        assert!(bytes.is_empty());
        from_bytes::<()>(&bytes).unwrap();
    }

    #[test]
    fn garbage_fails_to_decode() {
        // 0xFF opens a varint that never terminates.
        let err = from_bytes::<Ping>(&[0xFF]).unwrap_err();
        assert!(matches!(err, RpcError::Decode(_)));
    }
}
