//! # Identity Newtypes
//!
//! Newtype wrappers for every identifier namespace in the engine. You cannot
//! pass a `ReviewId` where a `SessionId` is expected.
//!
//! ## Security Invariant
//!
//! `SubjectId` is the single canonical subject key. It is trimmed and
//! validated once at construction, so the credential store's uniqueness
//! constraint cannot be bypassed with `" alice"` vs `"alice"`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::KycError;

/// Maximum length of a subject identifier after trimming.
pub const MAX_SUBJECT_ID_LEN: usize = 128;

/// Canonical identifier of the person being verified.
///
/// Constructed only through [`SubjectId::new`], which trims surrounding
/// whitespace and rejects empty, oversized or control-character inputs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
    /// Validate and normalize a subject identifier.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, KycError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(KycError::InvalidIdentifier(
                "subject id must not be empty".into(),
            ));
        }
        if trimmed.chars().count() > MAX_SUBJECT_ID_LEN {
            return Err(KycError::InvalidIdentifier(format!(
                "subject id exceeds {MAX_SUBJECT_ID_LEN} characters"
            )));
        }
        if trimmed.chars().any(char::is_control) {
            return Err(KycError::InvalidIdentifier(
                "subject id must not contain control characters".into(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// The normalized identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for SubjectId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        SubjectId::new(raw).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Display for SubjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Access the inner UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a verification session.
    SessionId,
    "session"
);
uuid_id!(
    /// Unique identifier for a manual review task.
    ReviewId,
    "review"
);
uuid_id!(
    /// Unique identifier for a risk score snapshot.
    SnapshotId,
    "snapshot"
);
uuid_id!(
    /// Unique identifier for an analyzed document record.
    DocumentId,
    "document"
);
uuid_id!(
    /// Unique identifier for a biometric capture record.
    BiometricId,
    "biometric"
);

/// Identifier of a long-lived KYC credential: `KYC-` followed by 16
/// uppercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct CredentialId(String);

impl CredentialId {
    const PREFIX: &'static str = "KYC-";
    const HEX_LEN: usize = 16;

    /// Generate a fresh random credential identifier.
    pub fn generate() -> Self {
        let simple = Uuid::new_v4().simple().to_string().to_uppercase();
        Self(format!("{}{}", Self::PREFIX, &simple[..Self::HEX_LEN]))
    }

    /// Parse and validate an existing credential identifier.
    pub fn parse(s: &str) -> Result<Self, KycError> {
        let hex = s.strip_prefix(Self::PREFIX).ok_or_else(|| {
            KycError::InvalidIdentifier(format!("credential id must start with KYC-: {s:?}"))
        })?;
        let well_formed = hex.len() == Self::HEX_LEN
            && hex
                .chars()
                .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c));
        if !well_formed {
            return Err(KycError::InvalidIdentifier(format!(
                "credential id must carry 16 uppercase hex characters: {s:?}"
            )));
        }
        Ok(Self(s.to_string()))
    }

    /// The identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for CredentialId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        CredentialId::parse(&raw).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Display for CredentialId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_id_is_trimmed() {
        let a = SubjectId::new("  alice@example.com ").unwrap();
        let b = SubjectId::new("alice@example.com").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "alice@example.com");
    }

    #[test]
    fn subject_id_rejects_blank() {
        assert!(matches!(
            SubjectId::new("   "),
            Err(KycError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn subject_id_rejects_oversized() {
        let long = "x".repeat(MAX_SUBJECT_ID_LEN + 1);
        assert!(SubjectId::new(long).is_err());
        assert!(SubjectId::new("x".repeat(MAX_SUBJECT_ID_LEN)).is_ok());
    }

    #[test]
    fn subject_id_rejects_control_chars() {
        assert!(SubjectId::new("ali\nce").is_err());
    }

    #[test]
    fn subject_id_deserialize_validates() {
        let ok: SubjectId = serde_json::from_str("\" bob \"").unwrap();
        assert_eq!(ok.as_str(), "bob");
        assert!(serde_json::from_str::<SubjectId>("\"\"").is_err());
    }

    #[test]
    fn credential_id_format() {
        let id = CredentialId::generate();
        assert!(id.as_str().starts_with("KYC-"));
        assert_eq!(id.as_str().len(), 20);
        assert!(CredentialId::parse(id.as_str()).is_ok());
    }

    #[test]
    fn credential_id_parse_rejects_lowercase() {
        assert!(CredentialId::parse("KYC-abcdef0123456789").is_err());
        assert!(CredentialId::parse("KYC-ABCDEF0123456789").is_ok());
        assert!(CredentialId::parse("ABCDEF0123456789").is_err());
        assert!(CredentialId::parse("KYC-ABC").is_err());
    }

    #[test]
    fn uuid_ids_are_distinct_and_prefixed() {
        let a = SessionId::new();
        let b = SessionId::new();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("session:"));
        assert!(ReviewId::new().to_string().starts_with("review:"));
    }
}
