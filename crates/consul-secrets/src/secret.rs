//! Redacting wrapper for token material.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Placeholder printed instead of secret values.
pub const REDACTED: &str = "[REDACTED]";

/// A token that must not show up in logs or debug output.
///
/// `Debug` and `Display` print [`REDACTED`] and the memory is zeroized on
/// drop. Serialization writes the raw value. It is used for the persisted
/// access record and for the single response that reveals an issued token.
#[derive(Clone, Default, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the raw value.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SecretString").field(&REDACTED).finish()
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl Serialize for SecretString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SecretString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(SecretString)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_and_display_are_redacted() {
        let token = SecretString::new("6a1f0b2c-secret");
        assert_eq!(format!("{token:?}"), "SecretString(\"[REDACTED]\")");
        assert_eq!(format!("{token}"), REDACTED);
        assert_eq!(token.expose(), "6a1f0b2c-secret");
    }

    #[test]
    fn serializes_raw_value_for_storage() {
        let token = SecretString::new("abc");
        assert_eq!(serde_json::to_string(&token).unwrap(), "\"abc\"");
        let back: SecretString = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(back, token);
    }
}
