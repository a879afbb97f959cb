//! Error types for Lineage Core

use std::fmt;

use thiserror::Error;

use crate::limits::ValidationError;

/// Result type alias using Lineage's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Which kind of record a lookup failed to find
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Individual,
    Union,
    ChildLink,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Individual => write!(f, "individual"),
            Self::Union => write!(f, "union"),
            Self::ChildLink => write!(f, "child link"),
        }
    }
}

/// Lineage error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: RecordKind, id: String },

    #[error("Gender mismatch: {0}")]
    GenderMismatch(String),

    #[error("Invalid relation: {0}")]
    InvalidRelation(String),

    #[error("Circular relation: {0}")]
    CircularRelation(String),

    #[error("Record has children: {0}")]
    HasChildren(String),

    #[error("Individual belongs to a family: {0}")]
    InFamily(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Payload-free discriminant of [`Error`], for mapping to transport codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    GenderMismatch,
    InvalidRelation,
    CircularRelation,
    HasChildren,
    InFamily,
    AlreadyExists,
    Cancelled,
    Storage,
    Serialization,
}

impl Error {
    pub fn not_found(kind: RecordKind, id: impl fmt::Display) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::GenderMismatch(_) => ErrorKind::GenderMismatch,
            Self::InvalidRelation(_) => ErrorKind::InvalidRelation,
            Self::CircularRelation(_) => ErrorKind::CircularRelation,
            Self::HasChildren(_) => ErrorKind::HasChildren,
            Self::InFamily(_) => ErrorKind::InFamily,
            Self::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::Storage(_) => ErrorKind::Storage,
            Self::Serialization(_) => ErrorKind::Serialization,
        }
    }
}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}
