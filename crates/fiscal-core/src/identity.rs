//! # Identity Newtypes
//!
//! Domain-primitive newtypes for identifiers. UUID-based identifiers
//! ([`OrganizationId`], [`BranchId`], [`DocumentId`], [`JobId`]) are valid by
//! construction. String-based identifiers ([`Cnpj`], [`ClassificationCode`])
//! validate format at construction time and on deserialization.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

// ---------------------------------------------------------------------------
// UUID-based identifiers
// ---------------------------------------------------------------------------

macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Access the underlying UUID.
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
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_identifier!(
    /// A tenant of the ERP. Every rule, document and job is scoped to one.
    OrganizationId
);
uuid_identifier!(
    /// A branch (establishment) of an organization. Fiscal numbering is
    /// allocated per branch.
    BranchId
);
uuid_identifier!(
    /// An uploaded fiscal artifact.
    DocumentId
);
uuid_identifier!(
    /// An asynchronous processing job driving one document.
    JobId
);

// ---------------------------------------------------------------------------
// String-based identifiers
// ---------------------------------------------------------------------------

/// Brazilian company tax id (CNPJ), stored as 14 bare digits.
///
/// Punctuated input (`12.345.678/0001-95`) is accepted and normalized.
/// Only the shape is validated; the registry is the authority on whether
/// a CNPJ exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cnpj(String);

impl Cnpj {
    /// Parse and normalize a CNPJ.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidTaxId`] unless the input holds
    /// exactly 14 digits after stripping `.`, `/`, `-` and whitespace.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = value.into();
        let digits: String = raw
            .chars()
            .filter(|c| !matches!(c, '.' | '/' | '-') && !c.is_whitespace())
            .collect();
        if digits.len() != 14 || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(ValidationError::InvalidTaxId(raw));
        }
        Ok(Self(digits))
    }

    /// The 14 bare digits.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Cnpj {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Cnpj {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Cnpj> for String {
    fn from(value: Cnpj) -> Self {
        value.0
    }
}

/// Mercosur product classification code (NCM): exactly 8 digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClassificationCode(String);

impl ClassificationCode {
    /// Validate an NCM code.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidClassificationCode`] unless the
    /// trimmed input is exactly 8 ASCII digits.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = value.into();
        let trimmed = raw.trim();
        if trimmed.len() != 8 || !trimmed.chars().all(|c| c.is_ascii_digit()) {
            return Err(ValidationError::InvalidClassificationCode(raw));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// The 8 digits.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClassificationCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ClassificationCode {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ClassificationCode> for String {
    fn from(value: ClassificationCode) -> Self {
        value.0
    }
}
