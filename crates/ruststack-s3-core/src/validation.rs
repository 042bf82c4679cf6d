//! Bucket name and object key validation.
//!
//! Bucket names follow the provider's naming rules. Keys get one extra
//! restriction the real service does not have: no empty, `.` or `..` segments, since
//! keys map directly onto directories of the filesystem engine.

use std::net::Ipv4Addr;

use crate::error::StorageError;

/// Minimum bucket name length.
const MIN_BUCKET_NAME_LEN: usize = 3;

/// Maximum bucket name length.
const MAX_BUCKET_NAME_LEN: usize = 63;

/// Maximum object key length in bytes.
const MAX_KEY_BYTES: usize = 1024;

/// Validate a bucket name.
///
/// Names are 3-63 characters of lowercase letters, digits, hyphens and dots,
/// start and end with a letter or digit, contain no `..`, and are not
/// formatted as an IPv4 address.
///
/// # Examples
///
/// ```
/// use ruststack_s3_core::validation::validate_bucket_name;
///
/// assert!(validate_bucket_name("access-logs").is_ok());
/// assert!(validate_bucket_name("AB").is_err());
/// ```
pub fn validate_bucket_name(name: &str) -> Result<(), StorageError> {
    let invalid = |reason: &str| StorageError::InvalidBucketName {
        name: name.to_owned(),
        reason: reason.to_owned(),
    };

    if !(MIN_BUCKET_NAME_LEN..=MAX_BUCKET_NAME_LEN).contains(&name.len()) {
        return Err(invalid("Bucket name must be between 3 and 63 characters long"));
    }

    if !name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'.')
    {
        return Err(invalid(
            "Bucket name must only contain lowercase letters, numbers, hyphens, and dots",
        ));
    }

    let alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    let bytes = name.as_bytes();
    if !alnum(bytes[0]) || !alnum(bytes[bytes.len() - 1]) {
        return Err(invalid("Bucket name must start and end with a letter or number"));
    }

    if name.contains("..") {
        return Err(invalid("Bucket name must not contain consecutive dots"));
    }

    if name.parse::<Ipv4Addr>().is_ok() {
        return Err(invalid("Bucket name must not be formatted as an IP address"));
    }

    Ok(())
}

/// Validate an object key for storage on disk.
pub fn validate_object_key(key: &str) -> Result<(), StorageError> {
    let invalid = |reason: &str| StorageError::InvalidKey {
        key: key.to_owned(),
        reason: reason.to_owned(),
    };

    if key.is_empty() {
        return Err(invalid("Object key must not be empty"));
    }
    if key.len() > MAX_KEY_BYTES {
        return Err(invalid("Object key must be at most 1024 bytes"));
    }
    for segment in key.split('/') {
        if segment.is_empty() {
            return Err(invalid("Object key must not contain empty path segments"));
        }
        if segment == "." || segment == ".." {
            return Err(invalid("Object key must not contain '.' or '..' segments"));
        }
        if segment.starts_with(".content") || segment.starts_with(".metadata") {
            return Err(invalid("Object key segment collides with a reserved name"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_accept_valid_bucket_names() {
        for name in ["abc", "my-bucket", "logs.example.com", "a1b2c3"] {
            assert!(validate_bucket_name(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn test_should_reject_invalid_bucket_names() {
        let long = "a".repeat(64);
        for name in [
            "ab",
            long.as_str(),
            "MyBucket",
            "-bucket",
            "bucket-",
            "my..bucket",
            "192.168.0.1",
            "under_score",
        ] {
            assert!(
                matches!(
                    validate_bucket_name(name),
                    Err(StorageError::InvalidBucketName { .. })
                ),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn test_should_accept_nested_keys() {
        assert!(validate_object_key("file.txt").is_ok());
        assert!(validate_object_key("a/b/c.json").is_ok());
        assert!(validate_object_key("with space/and.dots..txt").is_ok());
    }

    #[test]
    fn test_should_reject_traversal_keys() {
        assert!(validate_object_key("").is_err());
        assert!(validate_object_key("../etc/passwd").is_err());
        assert!(validate_object_key("a/./b").is_err());
        assert!(validate_object_key("a/.content").is_err());
        assert!(validate_object_key("folder/").is_err());
        assert!(validate_object_key(&"k".repeat(1025)).is_err());
    }
}
