/// Errors caused by the caller: bad property values, unknown property names
/// supplied by configuration, malformed destination URIs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DestinationError {
    #[error("Invalid value `{value}` for destination property `{name}`")]
    InvalidValue { name: String, value: String },
    #[error("Unknown destination property `{0}`")]
    UnknownProperty(String),
    #[error("Malformed destination URI element `{element}`: {reason}")]
    MalformedUri { element: String, reason: &'static str },
    #[error("Destination URI `{0}` uses a reserved prefix")]
    ReservedPrefix(String),
    #[error("Queue manager `{qmgr}` is not supported in destination URI `{uri}`")]
    QueueManagerNotSupported { qmgr: String, uri: String },
}

impl DestinationError {
    #[inline]
    pub(crate) fn invalid<N: Into<String>, V: ToString>(name: N, value: V) -> Self {
        DestinationError::InvalidValue { name: name.into(), value: value.to_string() }
    }

    #[inline]
    pub(crate) fn malformed<E: Into<String>>(element: E, reason: &'static str) -> Self {
        DestinationError::MalformedUri { element: element.into(), reason }
    }
}

/// Errors raised while producing the binary form of a destination.
///
/// Both kinds indicate a defect in the codec: every property that reaches the
/// encoder has already been validated by a setter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error("Internal error, property `{0}` has no wire encoding")]
    UnknownProperty(String),
    #[error("Internal error, value `{value}` cannot be encoded for `{name}`")]
    InvalidValue { name: &'static str, value: String },
    #[error("Invalid length")]
    InvalidLength,
}

/// Errors raised while rebuilding a destination from its binary form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The peer sent a property this implementation does not know, most
    /// likely because it runs a newer version.
    #[error("Unknown property wire name `{0}`")]
    UnknownWireName(String),
    #[error("Invalid length")]
    InvalidLength,
    #[error("utf8 error")]
    Utf8Error,
    #[error("Invalid delivery mode code {0}")]
    InvalidDeliveryMode(u8),
    #[error("Property `{property}` does not apply to a {kind}")]
    KindMismatch { property: &'static str, kind: &'static str },
    #[error("Property `{0}` is encoded in the header and must not appear as an entry")]
    UnexpectedPhantom(&'static str),
    #[error("Decoded property rejected: {0}")]
    Property(#[from] DestinationError),
}

impl DecodeError {
    /// True when the failure points at a bug in the codec itself rather than
    /// at the input or at a newer peer.
    #[inline]
    pub fn is_internal(&self) -> bool {
        !matches!(self, DecodeError::UnknownWireName(_))
    }
}
