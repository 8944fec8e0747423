use serde::Serialize;
use sha2::{Digest, Sha256};

/// Render `value` as compact JSON with lexicographically sorted keys.
///
/// Every content hash in the system is SHA-256 over this rendering, so it
/// must be byte-identical on all nodes. Converting to [`serde_json::Value`]
/// first forces sorted keys (`serde_json`'s default map is a `BTreeMap`),
/// and floats come out in shortest round-trip form.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(value)?;
    serde_json::to_string(&value)
}

/// Hex-encoded SHA-256 digest of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use serde::Serialize;

    use super::*;

    #[derive(Serialize)]
    struct Unordered {
        zebra: u32,
        apple: u32,
        mango: Option<u32>,
    }

    #[test]
    fn keys_are_sorted_regardless_of_field_order() {
        let v = Unordered {
            zebra: 1,
            apple: 2,
            mango: None,
        };
        assert_eq!(
            canonical_json(&v).unwrap(),
            r#"{"apple":2,"mango":null,"zebra":1}"#
        );
    }

    #[test]
    fn floats_render_shortest_round_trip() {
        assert_eq!(canonical_json(&0.0_f64).unwrap(), "0.0");
        assert_eq!(canonical_json(&1.5_f64).unwrap(), "1.5");
    }

    #[test]
    fn sha256_hex_of_empty_input() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
