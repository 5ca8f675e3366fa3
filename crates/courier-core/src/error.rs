//! Error codes and error types.

use core::fmt;

/// RPC error codes.
///
/// Codes align with gRPC for familiarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorCode {
    Ok = 0,
    Cancelled = 1,
    DeadlineExceeded = 2,
    InvalidArgument = 3,
    NotFound = 4,
    AlreadyExists = 5,
    PermissionDenied = 6,
    ResourceExhausted = 7,
    FailedPrecondition = 8,
    Aborted = 9,
    OutOfRange = 10,
    Unimplemented = 11,
    Internal = 12,
    Unavailable = 13,
    DataLoss = 14,
}

impl ErrorCode {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Ok),
            1 => Some(Self::Cancelled),
            2 => Some(Self::DeadlineExceeded),
            3 => Some(Self::InvalidArgument),
            4 => Some(Self::NotFound),
            5 => Some(Self::AlreadyExists),
            6 => Some(Self::PermissionDenied),
            7 => Some(Self::ResourceExhausted),
            8 => Some(Self::FailedPrecondition),
            9 => Some(Self::Aborted),
            10 => Some(Self::OutOfRange),
            11 => Some(Self::Unimplemented),
            12 => Some(Self::Internal),
            13 => Some(Self::Unavailable),
            14 => Some(Self::DataLoss),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::DeadlineExceeded => write!(f, "deadline exceeded"),
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::NotFound => write!(f, "not found"),
            Self::AlreadyExists => write!(f, "already exists"),
            Self::PermissionDenied => write!(f, "permission denied"),
            Self::ResourceExhausted => write!(f, "resource exhausted"),
            Self::FailedPrecondition => write!(f, "failed precondition"),
            Self::Aborted => write!(f, "aborted"),
            Self::OutOfRange => write!(f, "out of range"),
            Self::Unimplemented => write!(f, "unimplemented"),
            Self::Internal => write!(f, "internal error"),
            Self::Unavailable => write!(f, "unavailable"),
            Self::DataLoss => write!(f, "data loss"),
        }
    }
}

/// Error descriptor carried in a response envelope.
///
/// The envelope format offers a single error slot; the code is the
/// discriminant between protocol failures (routing, server-side codec) and
/// application failures returned by handlers. The dispatcher reserves
/// `Unimplemented`, `InvalidArgument` and `Internal` for its own outcomes;
/// handler errors pass through with whatever code the handler chose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    pub code: ErrorCode,
    pub message: String,
}

impl RemoteError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// The canonical routing failure: no handler is registered for the
    /// requested method. Terminal and non-retryable.
    pub fn unsupported_method() -> Self {
        Self::new(ErrorCode::Unimplemented, "unsupported method")
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for RemoteError {}

/// Transport-level errors.
///
/// A transport error means the call may never have reached the remote side;
/// callers must treat the remote outcome as unknown.
#[derive(Debug)]
pub enum TransportError {
    Closed,
    Io(std::io::Error),
    /// Too many calls in flight on this transport instance.
    ResourceExhausted { pending: usize, max: usize },
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "transport closed"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::ResourceExhausted { pending, max } => {
                write!(f, "too many pending calls: {pending} (max {max})")
            }
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// High-level RPC errors returned to callers.
///
/// The variants keep the failure classes the caller must tell apart:
/// [`Remote`](Self::Remote) means the remote side ran and reported failure;
/// [`Transport`](Self::Transport) means delivery itself failed locally;
/// cancellation and deadline expiry are their own kinds.
#[derive(Debug)]
pub enum RpcError {
    Transport(TransportError),
    Remote(RemoteError),
    Cancelled,
    DeadlineExceeded,
    /// Payload serialization error.
    Encode(postcard::Error),
    /// Payload deserialization error.
    Decode(postcard::Error),
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport error: {e}"),
            Self::Remote(e) => write!(f, "remote error: {e}"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::DeadlineExceeded => write!(f, "deadline exceeded"),
            Self::Encode(e) => write!(f, "encode error: {e}"),
            Self::Decode(e) => write!(f, "decode error: {e}"),
        }
    }
}

impl std::error::Error for RpcError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            Self::Remote(e) => Some(e),
            Self::Encode(e) => Some(e),
            Self::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransportError> for RpcError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<RemoteError> for RpcError {
    fn from(e: RemoteError) -> Self {
        Self::Remote(e)
    }
}
