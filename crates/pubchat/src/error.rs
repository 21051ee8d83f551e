use crate::protocol::Operation;

/// Everything a session operation can fail with.
///
/// `Transport`, `Encode` and `Decode` come from the layers below the
/// session. `Protocol` means the broker answered with something the
/// operation cannot interpret. `Rejected` is the broker saying no through
/// the normal response path (`status: "erro"`).
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to encode envelope: {0}")]
    Encode(String),

    #[error("failed to decode envelope: {0}")]
    Decode(String),

    #[error("{op}: unexpected response: {detail}")]
    Protocol { op: Operation, detail: String },

    #[error("{op} failed: {reason}")]
    Rejected { op: Operation, reason: String },
}

impl ClientError {
    pub(crate) fn transport(msg: impl std::fmt::Display) -> Self {
        ClientError::Transport(msg.to_string())
    }

    /// True when the broker explicitly refused the operation.
    pub fn is_rejected(&self) -> bool {
        matches!(self, ClientError::Rejected { .. })
    }

    /// True for socket-level failures.
    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Transport(_))
    }
}

impl From<zeromq::ZmqError> for ClientError {
    fn from(e: zeromq::ZmqError) -> Self {
        ClientError::Transport(e.to_string())
    }
}

pub type Result<T, E = ClientError> = std::result::Result<T, E>;
