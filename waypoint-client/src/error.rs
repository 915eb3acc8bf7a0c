use crate::config::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("unable to connect to Waypoint server at {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    #[error("gRPC status error: {0}")]
    Rpc(#[from] tonic::Status),

    #[error("Server response is missing `{0}`")]
    EmptyResponse(&'static str),
}

impl Error {
    pub(crate) fn connection_failed(address: &str, reason: impl Into<String>) -> Self {
        Error::ConnectionFailed {
            address: address.to_string(),
            reason: reason.into(),
        }
    }

    /// The gRPC status behind this error, if it came from an RPC.
    pub fn status(&self) -> Option<&tonic::Status> {
        match self {
            Error::Rpc(status) => Some(status),
            _ => None,
        }
    }

    /// Returns true if the server reported that the addressed object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self.status(), Some(status) if status.code() == tonic::Code::NotFound)
    }

    /// Returns true if the server rejected the token or its permissions.
    pub fn is_auth_error(&self) -> bool {
        match self.status() {
            Some(status) => matches!(
                status.code(),
                tonic::Code::Unauthenticated | tonic::Code::PermissionDenied
            ),
            None => false,
        }
    }
}
