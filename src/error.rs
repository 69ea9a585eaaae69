use std::fmt::{self, Debug, Display, Formatter};
use std::sync::Arc;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;
pub(crate) type SharedError = Arc<dyn std::error::Error + Send + Sync>;

/// The configured ceiling that a [`Error::LimitExceeded`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Limit {
    /// Number of headers in one part.
    HeaderCount,
    /// Size of a single header line.
    HeaderSize,
    /// Combined size of one part's header block.
    TotalHeaderSize,
    /// Number of parts in the stream.
    Parts,
    /// Size of a single text field.
    TextFieldSize,
    /// Combined size of all text fields.
    TotalTextFieldSize,
    /// Size of a single file.
    FileSize,
    /// Combined size of all files.
    TotalFileSize,
}

impl Display for Limit {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Limit::HeaderCount => "header count",
            Limit::HeaderSize => "header size",
            Limit::TotalHeaderSize => "total header size",
            Limit::Parts => "part count",
            Limit::TextFieldSize => "text field size",
            Limit::TotalTextFieldSize => "total text field size",
            Limit::FileSize => "file size",
            Limit::TotalFileSize => "total file size",
        };
        f.write_str(name)
    }
}

/// A set of errors that can occur during parsing a multipart stream and
/// assembling the form data.
///
/// All variants are cheaply cloneable so that a failed parse can keep
/// replaying the same error on every subsequent read.
#[derive(Clone)]
#[non_exhaustive]
pub enum Error {
    /// The underlying byte stream failed.
    StreamReadFailed(SharedError),

    /// The multipart stream ended before the grammar allowed it to.
    IncompleteStream,

    /// A part's header block could not be read completely.
    IncompleteHeaders,

    /// Failed to parse a part's header block.
    ReadHeaderFailed(httparse::Error),

    /// Failed to decode a raw header name to a
    /// [`HeaderName`](http::header::HeaderName).
    DecodeHeaderName { name: String, cause: SharedError },

    /// Failed to decode a raw header value to a
    /// [`HeaderValue`](http::header::HeaderValue).
    DecodeHeaderValue { cause: SharedError },

    /// The `Content-Type` header is not `multipart/form-data`.
    NoMultipart,

    /// Failed to parse the `Content-Type` header as a [`mime::Mime`].
    DecodeContentType(Arc<mime::FromStrError>),

    /// No boundary parameter found in the `Content-Type` header.
    NoBoundary,

    /// A part carried a `Content-Disposition` header that could not be
    /// parsed.
    DecodeContentDisposition(String),

    /// One of the configured ceilings was crossed.
    LimitExceeded {
        limit: Limit,
        observed: u64,
        allowed: u64,
    },

    /// The caller-supplied file handler failed.
    HandleFile(SharedError),

    /// Failed to decode a part's data as JSON in
    /// [`Part::json()`](crate::Part::json).
    #[cfg(feature = "json")]
    #[cfg_attr(nightly, doc(cfg(feature = "json")))]
    DecodeJson(Arc<serde_json::Error>),
}

impl Error {
    pub(crate) fn limit_exceeded(limit: Limit, observed: u64, allowed: u64) -> Self {
        Error::LimitExceeded {
            limit,
            observed,
            allowed,
        }
    }

    /// Wraps an arbitrary error produced inside a file handler so it can be
    /// propagated out of [`Multipart::assemble`](crate::Multipart::assemble).
    pub fn handle_file<E: Into<BoxError>>(err: E) -> Self {
        Error::HandleFile(Arc::from(err.into()))
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Error::StreamReadFailed(err) => write!(f, "stream read failed: {}", err),
            Error::IncompleteStream => write!(f, "incomplete multipart stream"),
            Error::IncompleteHeaders => write!(f, "failed to read part headers completely"),
            Error::ReadHeaderFailed(err) => write!(f, "failed to read part headers: {}", err),
            Error::DecodeHeaderName { name, cause } => {
                write!(f, "failed to decode raw header name {:?}: {}", name, cause)
            }
            Error::DecodeHeaderValue { cause } => {
                write!(f, "failed to decode raw header value: {}", cause)
            }
            Error::NoMultipart => write!(f, "Content-Type is not multipart/form-data"),
            Error::DecodeContentType(err) => write!(f, "failed to parse Content-Type: {}", err),
            Error::NoBoundary => write!(f, "multipart boundary not found in Content-Type"),
            Error::DecodeContentDisposition(msg) => {
                write!(f, "invalid Content-Disposition header: {}", msg)
            }
            Error::LimitExceeded {
                limit,
                observed,
                allowed,
            } => write!(
                f,
                "{} limit exceeded: observed {}, allowed {}",
                limit, observed, allowed
            ),
            Error::HandleFile(err) => write!(f, "file handler failed: {}", err),
            #[cfg(feature = "json")]
            Error::DecodeJson(err) => write!(f, "failed to decode part data as JSON: {}", err),
        }
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl std::error::Error for Error {}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.to_string().eq(&other.to_string())
    }
}

impl Eq for Error {}
