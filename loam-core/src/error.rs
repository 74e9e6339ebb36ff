use thiserror::Error;

/// Declaration-level failure: the entity type's field declarations are
/// inconsistent or incomplete. Structural, never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MetadataError {
    #[error("field `{field}` of `{entity}` carries no column, custom column or one-to-many binding")]
    UnboundField {
        entity: &'static str,
        field: &'static str,
    },
    #[error("field `{field}` of `{entity}` mixes mutually exclusive bindings")]
    ConflictingBindings {
        entity: &'static str,
        field: &'static str,
    },
    #[error("many-to-one field `{field}` of `{entity}` does not bind the foreign key column")]
    ManyToOneWithoutColumn {
        entity: &'static str,
        field: &'static str,
    },
    #[error("relationship field `{field}` of `{entity}` does not name its join column")]
    MissingJoinColumn {
        entity: &'static str,
        field: &'static str,
    },
    #[error("field `{field}` of `{entity}` has no accessor")]
    MissingAccessor {
        entity: &'static str,
        field: &'static str,
    },
    #[error("identifier field `{field}` of `{entity}` must be a plain column")]
    InvalidIdentifier {
        entity: &'static str,
        field: &'static str,
    },
    #[error("entity `{entity}` declares no identifier column")]
    MissingIdentifier { entity: &'static str },
    #[error("entity `{entity}` declares column `{column}` twice")]
    DuplicateColumn {
        entity: &'static str,
        column: &'static str,
    },
    #[error("entity `{entity}` declares custom field id {field_id} twice")]
    DuplicateCustomField { entity: &'static str, field_id: i32 },
    #[error("custom columns of `{entity}` point at more than one custom table")]
    MixedCustomTables { entity: &'static str },
    #[error("entity `{entity}` has no column `{column}`")]
    UnknownColumn {
        entity: &'static str,
        column: String,
    },
}

/// Failure reported by a [`Connection`](crate::Connection). The engine treats
/// every database-level failure as transient and retries it uniformly; no
/// classification is attempted yet.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct DbError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl DbError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    /// Contract violation by the caller, e.g. updating an entity whose
    /// identifier was never assigned. Never retried.
    #[error("an entity needs a valid identifier in order to be updated")]
    MissingIdentifier,
    /// A database operation kept failing until the retry budget ran out.
    #[error("{operation} failed after {attempts} attempts: {source}")]
    Persistence {
        operation: String,
        attempts: u32,
        source: DbError,
    },
    /// A statement kept failing until the retry budget ran out; carries the
    /// offending SQL text.
    #[error("statement failed after {attempts} attempts: {sql}")]
    Statement {
        sql: String,
        attempts: u32,
        source: DbError,
    },
    #[error("conversion failed: {0}")]
    Conversion(String),
    #[error("entity `{entity}` with identifier {identifier} could not be re-read after persist")]
    ReloadFailed {
        entity: &'static str,
        identifier: i64,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
