use needle_api::ValidationError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Connectivity or transaction failure, retriable by the caller
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Naming service responded with status {status}")]
    Remote { status: u16 },

    #[error("Naming service transport error: {0}")]
    Transport(String),

    #[error("No instance of {logical_name} found for version {version}")]
    InstanceNotFound {
        logical_name: String,
        version: String,
    },

    #[error("{count} instances of {logical_name} found for version {version}")]
    AmbiguousInstance {
        logical_name: String,
        version: String,
        count: usize,
    },

    #[error("Instance {instance} missing annotation {annotation} ({which})")]
    MissingAnnotation {
        instance: String,
        which: &'static str,
        annotation: &'static str,
    },

    #[error("Invalid priority annotation value: {0:?}")]
    InvalidPriority(String),

    #[error("Kubernetes error: {0}")]
    Cluster(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ValidationError> for CoreError {
    fn from(e: ValidationError) -> Self {
        CoreError::InvalidArgument(e.to_string())
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => CoreError::NotFound(e.to_string()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                CoreError::Conflict(db.message().to_string())
            }
            _ => CoreError::Storage(e.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for CoreError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        CoreError::Storage(e.to_string())
    }
}

impl From<kube::Error> for CoreError {
    fn from(e: kube::Error) -> Self {
        CoreError::Cluster(e.to_string())
    }
}
