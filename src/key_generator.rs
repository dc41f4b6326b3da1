//! Key generation for throttle bookkeeping.
//!
//! Every error is tracked under an [`ErrorIdentity`]. The throttle record lives
//! under the identity itself and the grace record under the identity with
//! [`GRACE_KEY_SUFFIX`] appended.

use std::fmt;

/// Suffix of the key holding the first-detection time of an error.
pub const GRACE_KEY_SUFFIX: &str = "_detectionTime";

const MAX_READABLE_FILE_PREFIX: usize = 64;

/// The key under which throttle and grace state is tracked for an error.
///
/// Errors whose messages render identically share an identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ErrorIdentity(String);

impl ErrorIdentity {
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    /// Derive the identity from the error's `Display` output.
    pub fn from_error(err: &(dyn std::error::Error + '_)) -> Self {
        Self(err.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn throttle_key(&self) -> &str {
        &self.0
    }

    pub fn grace_key(&self) -> String {
        format!("{}{}", self.0, GRACE_KEY_SUFFIX)
    }
}

impl fmt::Display for ErrorIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ErrorIdentity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ErrorIdentity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Maps arbitrary store keys onto names usable as file names.
pub struct KeyGenerator;

impl KeyGenerator {
    /// Sanitize key components to a file-system friendly alphabet
    pub fn sanitize_key(key: &str) -> String {
        key.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }

    /// File name for a store key: a readable prefix plus a stable hash of the full key.
    ///
    /// The hash keeps keys that sanitize to the same prefix apart.
    pub fn file_name(key: &str) -> String {
        let mut readable = Self::sanitize_key(key);
        readable.truncate(MAX_READABLE_FILE_PREFIX);
        format!("{}-{:016x}", readable, fnv1a64(key.as_bytes()))
    }

    /// Whether `name` has the shape produced by [`KeyGenerator::file_name`].
    pub fn is_record_file_name(name: &str) -> bool {
        let Some((readable, hash)) = name.rsplit_once('-') else {
            return false;
        };
        readable.len() <= MAX_READABLE_FILE_PREFIX
            && readable
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            && hash.len() == 16
            && hash.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f'))
    }
}

// FNV-1a, stable across builds and platforms.
fn fnv1a64(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes.iter().fold(OFFSET, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(PRIME)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct DbTimeout;

    impl fmt::Display for DbTimeout {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "db timeout")
        }
    }

    impl std::error::Error for DbTimeout {}

    #[test]
    fn test_identity_from_error_message() {
        let identity = ErrorIdentity::from_error(&DbTimeout);
        assert_eq!(identity.as_str(), "db timeout");
        assert_eq!(identity, ErrorIdentity::from("db timeout"));
    }

    #[test]
    fn test_grace_key() {
        let identity = ErrorIdentity::new("db timeout");
        assert_eq!(identity.throttle_key(), "db timeout");
        assert_eq!(identity.grace_key(), "db timeout_detectionTime");
    }

    #[test]
    fn test_sanitize_key() {
        let sanitized = KeyGenerator::sanitize_key("test@key#with$special%chars");
        assert_eq!(sanitized, "test_key_with_special_chars");
    }

    #[test]
    fn test_file_names_distinguish_colliding_sanitized_keys() {
        let a = KeyGenerator::file_name("db/timeout");
        let b = KeyGenerator::file_name("db:timeout");
        assert!(a.starts_with("db_timeout-"));
        assert!(b.starts_with("db_timeout-"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_record_file_name_shape() {
        assert!(KeyGenerator::is_record_file_name(&KeyGenerator::file_name("db timeout")));
        assert!(KeyGenerator::is_record_file_name(&KeyGenerator::file_name(
            &"x".repeat(200)
        )));
        assert!(!KeyGenerator::is_record_file_name("notes.txt"));
        assert!(!KeyGenerator::is_record_file_name("backup-2024"));
        assert!(!KeyGenerator::is_record_file_name("db_timeout-0123456789ABCDEF"));
    }

    #[test]
    fn test_file_name_is_stable_and_bounded() {
        let long = "x".repeat(1000);
        let name = KeyGenerator::file_name(&long);
        assert_eq!(name, KeyGenerator::file_name(&long));
        assert_eq!(name.len(), MAX_READABLE_FILE_PREFIX + 1 + 16);
    }
}
