//! Content address computation
//!
//! An address is the base58 encoding of a multihash over the canonical
//! serialization of a value: JSON with object keys in sorted order.

use crate::types::{Address, Hash};
use serde::Serialize;

/// Multihash code for BLAKE3-256
pub const MULTIHASH_BLAKE3: u8 = 0x1e;

/// Digest length prefix for 256-bit digests
pub const MULTIHASH_LEN: u8 = 0x20;

/// Length of every computed address string
pub const ADDRESS_LEN: usize = 46;

/// Canonical bytes of a serializable value.
///
/// Going through `serde_json::Value` sorts object keys, so two values that
/// differ only in key order serialize identically.
pub fn canonical_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let value = serde_json::to_value(value)?;
    serde_json::to_vec(&value)
}

/// Raw BLAKE3 digest of some bytes
pub fn digest(bytes: &[u8]) -> Hash {
    *blake3::hash(bytes).as_bytes()
}

/// Address of raw bytes
pub fn address_of_bytes(bytes: &[u8]) -> Address {
    let hash = digest(bytes);
    let mut multihash = Vec::with_capacity(2 + hash.len());
    multihash.push(MULTIHASH_BLAKE3);
    multihash.push(MULTIHASH_LEN);
    multihash.extend_from_slice(&hash);
    Address::new(bs58::encode(multihash).into_string())
}

/// Address of a serializable value
pub fn address_of<T: Serialize + ?Sized>(value: &T) -> Result<Address, serde_json::Error> {
    Ok(address_of_bytes(&canonical_bytes(value)?))
}

/// Check that a string decodes to a BLAKE3 multihash address
pub fn is_well_formed(address: &Address) -> bool {
    match bs58::decode(address.as_str()).into_vec() {
        Ok(bytes) => {
            bytes.len() == 34 && bytes[0] == MULTIHASH_BLAKE3 && bytes[1] == MULTIHASH_LEN
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_key_order_does_not_change_address() {
        let a: serde_json::Value = serde_json::from_str(r#"{"b":1,"a":2}"#).unwrap();
        let b: serde_json::Value = serde_json::from_str(r#"{"a":2,"b":1}"#).unwrap();
        assert_eq!(address_of(&a).unwrap(), address_of(&b).unwrap());
    }

    #[test]
    fn test_different_content_different_address() {
        let a = address_of(&json!({"content": "hello"})).unwrap();
        let b = address_of(&json!({"content": "hello!"})).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_address_is_well_formed() {
        let address = address_of(&json!("x")).unwrap();
        assert!(is_well_formed(&address));
        assert!(!is_well_formed(&Address::from("QmNotAnAddress")));
        assert!(!is_well_formed(&Address::from("")));
    }

    proptest! {
        #[test]
        fn prop_address_is_46_chars_and_deterministic(content in ".{0,400}") {
            let first = address_of(&json!({ "content": content })).unwrap();
            let second = address_of(&json!({ "content": content })).unwrap();
            prop_assert_eq!(first.as_str().len(), ADDRESS_LEN);
            prop_assert_eq!(first, second);
        }
    }
}
