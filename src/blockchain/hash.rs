use serde_json::Value;
use sha2::{Digest, Sha256};

/// Calculates an order-independent SHA-256 commitment over a list of values
///
/// Every value is serialized to JSON, the serialized strings are sorted and
/// joined with a single space before hashing, so `[a, b]` and `[b, a]`
/// produce the same digest.
///
/// # Returns
///
/// The digest as a lowercase hexadecimal string (64 characters)
pub fn crypto_hash(inputs: &[Value]) -> String {
    let mut serialized: Vec<String> = inputs.iter().map(Value::to_string).collect();
    serialized.sort();

    let mut hasher = Sha256::new();
    hasher.update(serialized.join(" ").as_bytes());

    format!("{:x}", hasher.finalize())
}

/// Counts the leading zero bits of a hex encoded hash
///
/// Input that is not valid hex has no proof of work, so it counts as zero.
pub fn leading_zero_bits(hash: &str) -> u32 {
    let Ok(bytes) = hex::decode(hash) else {
        return 0;
    };

    let mut zeros = 0;
    for byte in bytes {
        if byte == 0 {
            zeros += 8;
        } else {
            zeros += byte.leading_zeros();
            break;
        }
    }

    zeros
}

/// Checks that a hash carries at least `difficulty` leading zero bits
pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    leading_zero_bits(hash) >= difficulty
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_known_digest() {
        assert_eq!(
            crypto_hash(&[json!("foo")]),
            "b2213295d564916f89a6a42455567c87c3f480fcd7a1c15e220f17d7169a790b"
        );
    }

    #[test]
    fn test_argument_order_does_not_matter() {
        assert_eq!(
            crypto_hash(&[json!("one"), json!("two"), json!("three")]),
            crypto_hash(&[json!("two"), json!("three"), json!("one")])
        );
        assert_eq!(
            crypto_hash(&[json!(1), json!("1"), json!({ "a": 1 })]),
            crypto_hash(&[json!({ "a": 1 }), json!(1), json!("1")])
        );
    }

    #[test]
    fn test_content_change_changes_digest() {
        let mut value = json!({});
        let original = crypto_hash(&[value.clone()]);

        value["a"] = json!("a");
        assert_ne!(crypto_hash(&[value]), original);

        // The number 1 and the string "1" serialize differently
        assert_ne!(crypto_hash(&[json!(1)]), crypto_hash(&[json!("1")]));
    }

    #[test]
    fn test_leading_zero_bits() {
        assert_eq!(leading_zero_bits("ff"), 0);
        assert_eq!(leading_zero_bits("7f"), 1);
        assert_eq!(leading_zero_bits("0f"), 4);
        assert_eq!(leading_zero_bits("00ff"), 8);
        assert_eq!(leading_zero_bits("0001"), 15);
        assert_eq!(leading_zero_bits("0000"), 16);
        assert_eq!(leading_zero_bits("hash-one"), 0);
        assert_eq!(leading_zero_bits(""), 0);
    }

    #[test]
    fn test_meets_difficulty() {
        assert!(meets_difficulty("0fff", 4));
        assert!(meets_difficulty("0fff", 3));
        assert!(!meets_difficulty("0fff", 5));
        assert!(meets_difficulty("ffff", 0));
    }
}
