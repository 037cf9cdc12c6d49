use std::collections::BTreeMap;

use anyhow::anyhow;
use serde::Serialize;

pub type Result<T> = std::result::Result<T, LibError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Database,
    InvalidInput,
    NotFound,
    Conflict,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ErrorDetails {
    /// Field name to validation message, one entry per rejected field.
    InvalidFields {
        fields: BTreeMap<&'static str, &'static str>,
    },
}

#[derive(Debug)]
pub struct LibError {
    pub kind: ErrorKind,
    pub code: &'static str,
    pub public: &'static str,
    pub details: Option<ErrorDetails>,
    pub source: anyhow::Error,
}

impl LibError {
    pub fn database(public: &'static str, source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::Database,
            code: "database_error",
            public,
            details: None,
            source,
        }
    }

    pub fn invalid(public: &'static str, source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::InvalidInput,
            code: "invalid_input",
            public,
            details: None,
            source,
        }
    }

    pub fn invalid_fields(fields: BTreeMap<&'static str, &'static str>) -> Self {
        let source = anyhow!("validation failed for fields {:?}", fields.keys());
        Self {
            kind: ErrorKind::InvalidInput,
            code: "invalid_input",
            public: "Validation error",
            details: Some(ErrorDetails::InvalidFields { fields }),
            source,
        }
    }

    pub fn not_found_with_code(
        code: &'static str,
        public: &'static str,
        source: anyhow::Error,
    ) -> Self {
        Self {
            kind: ErrorKind::NotFound,
            code,
            public,
            details: None,
            source,
        }
    }

    pub fn conflict(code: &'static str, public: &'static str, source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::Conflict,
            code,
            public,
            details: None,
            source,
        }
    }

    /// Stored data breaks a hierarchy invariant the engine relies on.
    pub fn inconsistent(public: &'static str, source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::Unknown,
            code: "hierarchy_inconsistent",
            public,
            details: None,
            source,
        }
    }
}

impl std::fmt::Display for LibError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.public, self.code, self.source)
    }
}

#[cfg(feature = "sqlx")]
impl From<sqlx::Error> for LibError {
    fn from(value: sqlx::Error) -> Self {
        let sqlstate = value
            .as_database_error()
            .and_then(|err| err.code())
            .map(|code| code.into_owned());
        match sqlstate.as_deref() {
            // serialization_failure / deadlock_detected
            Some("40001") | Some("40P01") => Self::conflict(
                "serialization_conflict",
                "The hierarchy changed concurrently, retry the request",
                anyhow!(value),
            ),
            // foreign_key_violation
            Some("23503") => Self::conflict(
                "hierarchy_reference_conflict",
                "Request conflicts with the current reporting hierarchy",
                anyhow!(value),
            ),
            _ => Self::database("Database request failed", anyhow!(value)),
        }
    }
}
