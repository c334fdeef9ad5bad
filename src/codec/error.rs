use base64::DecodeError as Base64Error;
use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
    io::{Error as IoError, ErrorKind},
};

/// Errors encountered while decoding a track descriptor.
#[derive(Debug)]
#[non_exhaustive]
pub enum DecodeError {
    /// The descriptor ended before all of its fields were read.
    Truncated,
    /// The descriptor declared a format version this library cannot read.
    Unsupported(u8),
    /// The descriptor text was not valid standard-alphabet base64.
    Base64(Base64Error),
    /// The underlying reader failed for a reason other than running dry.
    Io(IoError),
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str("failed to decode track descriptor: ")?;
        match self {
            Self::Truncated => f.write_str("input ended early"),
            Self::Unsupported(v) => write!(f, "unsupported descriptor version {}", v),
            Self::Base64(e) => write!(f, "invalid base64 ({})", e),
            Self::Io(e) => write!(f, "read failed ({})", e),
        }
    }
}

impl Error for DecodeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Base64(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<Base64Error> for DecodeError {
    fn from(e: Base64Error) -> Self {
        Self::Base64(e)
    }
}

impl From<IoError> for DecodeError {
    fn from(e: IoError) -> Self {
        match e.kind() {
            ErrorKind::UnexpectedEof => Self::Truncated,
            _ => Self::Io(e),
        }
    }
}
