//! The envelope: the single unit of transport exchange.

use core::fmt;

use bytes::Bytes;

use crate::{Metadata, RemoteError};

/// Correlation token linking a response to its originating request.
///
/// Assigned by the client transport when the request is handed over; unique
/// per in-flight call on a given transport instance. A request and its
/// response share the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CallId(pub u64);

impl CallId {
    /// Placeholder on a request that has not been handed to a transport yet.
    pub const UNASSIGNED: Self = Self(0);

    /// Create a new call id.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw u64 value.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl From<u64> for CallId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<CallId> for u64 {
    fn from(id: CallId) -> Self {
        id.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "call:{}", self.0)
    }
}

/// One request or one response on the wire.
///
/// An envelope is created fresh per call attempt and per call completion. It
/// is never mutated after being handed to a transport and never retained
/// beyond one send/receive cycle. Responses are built from their request via
/// [`Envelope::reply`] / [`Envelope::reply_error`], which carry the id,
/// method and metadata over unchanged.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Correlation token; request and response share it.
    pub id: CallId,
    /// Fully-qualified method name. Case-sensitive; the stable, versioned
    /// contract between client and server.
    pub method: String,
    /// Serialized typed request or response. Empty only when the method
    /// takes or returns no payload.
    pub body: Bytes,
    /// Out-of-band context. Passed through verbatim by both sides.
    pub metadata: Metadata,
    /// Set only on a response that represents failure; mutually exclusive
    /// with a meaningful body.
    pub error: Option<RemoteError>,
}

impl Envelope {
    /// Build a request envelope.
    ///
    /// The correlation id is left unassigned; the client transport fills it
    /// in when the request is sent.
    pub fn request(method: impl Into<String>, body: Bytes, metadata: Metadata) -> Self {
        Self {
            id: CallId::UNASSIGNED,
            method: method.into(),
            body,
            metadata,
            error: None,
        }
    }

    /// Build the success response for this request.
    pub fn reply(&self, body: Bytes) -> Self {
        Self {
            id: self.id,
            method: self.method.clone(),
            body,
            metadata: self.metadata.clone(),
            error: None,
        }
    }

    /// Build the failure response for this request. The body is left empty.
    pub fn reply_error(&self, error: RemoteError) -> Self {
        Self {
            id: self.id,
            method: self.method.clone(),
            body: Bytes::new(),
            metadata: self.metadata.clone(),
            error: Some(error),
        }
    }

    /// True if this envelope is a failed response.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
