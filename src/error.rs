/// Error types for the appointment scheduling core.
///
/// Store adapters report a structured `StoreError`; everything above the
/// store works with `AppointmentError`, whose variants map one-to-one to the
/// messages shown to the user.

use thiserror::Error;

/// Category of a document store failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreErrorKind {
    /// A composite index exists but is still being built.
    IndexBuilding,
    /// The query needs an index that was never created.
    MissingIndex,
    /// The addressed document does not exist.
    NotFound,
    /// The backend could not be reached.
    Unavailable,
    Failed,
}

/// Failure reported by a `DocumentStore` implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub message: String,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        StoreError {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::NotFound, message)
    }

    /// Build a store error from the text of a backend that only reports
    /// failures as messages.
    ///
    /// This is the only place that looks at message contents; callers above
    /// the store match on `kind`.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lowered = message.to_lowercase();

        let kind = if lowered.contains("building") {
            StoreErrorKind::IndexBuilding
        } else if lowered.contains("index") {
            StoreErrorKind::MissingIndex
        } else if lowered.contains("not found") || lowered.contains("no document") {
            StoreErrorKind::NotFound
        } else if lowered.contains("unavailable") || lowered.contains("offline") {
            StoreErrorKind::Unavailable
        } else {
            StoreErrorKind::Failed
        };

        StoreError { kind, message }
    }
}

/// Reasons a form submission is rejected before anything reaches the store.
///
/// Variants are declared in the order the checks run, after the signed-in
/// check that reports `AppointmentError::Unauthenticated`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("the appointment needs both a start and an end time")]
    MissingTimes,

    #[error("select a client")]
    ClientNotSelected,

    #[error("invalid date")]
    InvalidDate,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppointmentError {
    #[error("no user is signed in")]
    Unauthenticated,

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),

    #[error("index is still building: {0}")]
    TransientIndexBuilding(String),

    #[error("missing index: {0}")]
    MissingIndex(String),

    #[error("query failed: {0}")]
    QueryFailed(String),
}

impl AppointmentError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        AppointmentError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Map a store failure on a single record, naming the record when it is
    /// missing.
    pub fn from_store(err: StoreError, entity: &'static str, id: &str) -> Self {
        match err.kind {
            StoreErrorKind::NotFound => Self::not_found(entity, id),
            _ => err.into(),
        }
    }

    /// Message shown to the user for this error.
    pub fn user_message(&self) -> String {
        match self {
            AppointmentError::Unauthenticated => "You need to sign in.".to_string(),
            AppointmentError::NotFound { entity, .. } => {
                format!("The {} no longer exists.", entity)
            }
            AppointmentError::ValidationFailed(e) => {
                let text = e.to_string();
                let mut chars = text.chars();
                match chars.next() {
                    Some(first) => format!("{}{}.", first.to_uppercase(), chars.as_str()),
                    None => String::new(),
                }
            }
            AppointmentError::TransientIndexBuilding(_) => {
                "The calendar index is still being built. Wait a moment and retry.".to_string()
            }
            AppointmentError::MissingIndex(_) => {
                "A database index for the calendar is missing.".to_string()
            }
            AppointmentError::QueryFailed(msg) if !msg.is_empty() => msg.clone(),
            AppointmentError::QueryFailed(_) => "The calendar could not be loaded.".to_string(),
        }
    }

    /// Store-query failures that a manual retry may resolve.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppointmentError::TransientIndexBuilding(_)
                | AppointmentError::MissingIndex(_)
                | AppointmentError::QueryFailed(_)
        )
    }
}

impl From<StoreError> for AppointmentError {
    fn from(err: StoreError) -> Self {
        match err.kind {
            StoreErrorKind::IndexBuilding => AppointmentError::TransientIndexBuilding(err.message),
            StoreErrorKind::MissingIndex => AppointmentError::MissingIndex(err.message),
            StoreErrorKind::NotFound => AppointmentError::NotFound {
                entity: "document",
                id: err.message,
            },
            StoreErrorKind::Unavailable | StoreErrorKind::Failed => {
                AppointmentError::QueryFailed(err.message)
            }
        }
    }
}

/// Result alias used throughout the scheduling core.
pub type Result<T, E = AppointmentError> = std::result::Result<T, E>;
