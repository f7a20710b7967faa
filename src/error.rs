use core::fmt;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The error type for JPEG stream parsing.
pub struct Error {
    repr: Repr,
}

pub(crate) enum Repr {
    NotAJpeg,
    InvalidMarker { prefix: u8 },
    TruncatedInput { what: &'static str },
    MalformedSegment(String),
}

/// Broad classification of an [`Error`], for callers that react to the failure
/// class rather than the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The stream does not begin with the SOI marker.
    NotAJpeg,
    /// A byte expected to be the `0xFF` marker prefix was something else; the
    /// cursor is no longer aligned with segment boundaries.
    InvalidMarker,
    /// Fewer bytes remained than a fixed-layout read required.
    TruncatedInput,
    /// A segment's content is internally inconsistent.
    MalformedSegment,
}

impl Error {
    pub(crate) fn not_a_jpeg() -> Self {
        Self {
            repr: Repr::NotAJpeg,
        }
    }

    pub(crate) fn invalid_marker(prefix: u8) -> Self {
        Self {
            repr: Repr::InvalidMarker { prefix },
        }
    }

    pub(crate) fn truncated(what: &'static str) -> Self {
        Self {
            repr: Repr::TruncatedInput { what },
        }
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self {
            repr: Repr::MalformedSegment(message.into()),
        }
    }

    /// Returns the broad class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            Repr::NotAJpeg => ErrorKind::NotAJpeg,
            Repr::InvalidMarker { .. } => ErrorKind::InvalidMarker,
            Repr::TruncatedInput { .. } => ErrorKind::TruncatedInput,
            Repr::MalformedSegment(_) => ErrorKind::MalformedSegment,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::NotAJpeg => f.write_str("JPEG image does not start with SOI marker"),
            Repr::InvalidMarker { prefix } => {
                write!(f, "expected ff marker prefix, found {prefix:02x}")
            }
            Repr::TruncatedInput { what } => {
                write!(f, "reached end of data while reading {what}")
            }
            Repr::MalformedSegment(message) => f.write_str(message),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl std::error::Error for Error {}
