use crate::entities::AmbulanceStatus;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("operation not permitted in current state: {0}")]
    InvalidState(String),
    #[error("ambulance {ambulance_id} is not available for dispatch (status: {status})")]
    AmbulanceUnavailable {
        ambulance_id: String,
        status: AmbulanceStatus,
    },
    #[error("failed to create data directory: {0}")]
    StorageDirCreation(std::io::Error),
    #[error("failed to write store snapshot: {0}")]
    SnapshotWrite(std::io::Error),
    #[error("failed to read store snapshot: {0}")]
    SnapshotRead(std::io::Error),
    #[error("failed to serialize store snapshot: {0}")]
    Serialization(serde_json::Error),
    #[error("failed to deserialize store snapshot: {0}")]
    Deserialization(serde_json::Error),
}

impl DispatchError {
    /// Shorthand for a [`DispatchError::NotFound`] with the given entity kind.
    pub(crate) fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}

pub type DispatchResult<T> = std::result::Result<T, DispatchError>;
