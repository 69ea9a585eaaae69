//! An async, streaming parser for the `multipart/form-data` content-type.
//!
//! The stream is consumed exactly once and never buffered whole: boundary
//! detection works across arbitrary chunk fragmentation, each part's body is
//! exposed as its own pull-based byte stream, and hard resource limits
//! (header sizes, part count, field and file sizes) are enforced as the
//! bytes arrive.
//!
//! # Usage
//!
//! Iterate over the parts yourself with [`Multipart::next_part`], or let
//! [`Multipart::assemble`] classify every part as a text field or a file and
//! hand you an ordered [`FormData`] collection:
//!
//! ```
//! use std::convert::Infallible;
//!
//! use bytes::Bytes;
//! use futures_util::stream::once;
//! use multiform::Multipart;
//!
//! # async fn run() {
//! let data = "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"my_text_field\"\r\n\r\nabcd\r\n--X-BOUNDARY--\r\n";
//! let stream = once(async move { Result::<Bytes, Infallible>::Ok(Bytes::from(data)) });
//! let mut multipart = Multipart::new(stream, "X-BOUNDARY");
//!
//! while let Some(part) = multipart.next_part().await.unwrap() {
//!     println!("Part: {:?}", part.text().await)
//! }
//! # }
//! # tokio::runtime::Runtime::new().unwrap().block_on(run());
//! ```

#![cfg_attr(nightly, feature(doc_cfg))]

use std::sync::Arc;

pub use bytes;

pub use error::{Error, Limit};
pub use form::{FileBody, FileInfo, FormData, Value};
pub use limits::Limits;
pub use multipart::Multipart;
pub use part::Part;

mod constants;
mod content_disposition;
mod error;
mod filename;
mod form;
mod helpers;
mod limits;
mod multipart;
mod part;
mod segment;
mod state;

/// A Result type often returned from methods that can have `multiform`
/// errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Parses the `Content-Type` header to extract the boundary value.
///
/// ```
/// let content_type = "multipart/form-data; boundary=ABCDEFG";
/// assert_eq!(multiform::parse_boundary(content_type), Ok("ABCDEFG".to_owned()));
/// ```
pub fn parse_boundary<T: AsRef<str>>(content_type: T) -> crate::Result<String> {
    let m = content_type
        .as_ref()
        .parse::<mime::Mime>()
        .map_err(|err| Error::DecodeContentType(Arc::new(err)))?;

    if !(m.type_() == mime::MULTIPART && m.subtype() == mime::FORM_DATA) {
        return Err(Error::NoMultipart);
    }

    m.get_param(mime::BOUNDARY)
        .map(|name| name.as_str().to_owned())
        .ok_or(Error::NoBoundary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_boundary() {
        let content_type = "multipart/form-data; boundary=ABCDEFG";
        assert_eq!(parse_boundary(content_type), Ok("ABCDEFG".to_owned()));

        let content_type = "multipart/form-data; boundary=------ABCDEFG";
        assert_eq!(parse_boundary(content_type), Ok("------ABCDEFG".to_owned()));

        let content_type = "boundary=------ABCDEFG";
        assert!(parse_boundary(content_type).is_err());

        let content_type = "text/plain";
        assert_eq!(parse_boundary(content_type), Err(Error::NoMultipart));

        let content_type = "text/plain; boundary=------ABCDEFG";
        assert_eq!(parse_boundary(content_type), Err(Error::NoMultipart));

        let content_type = "multipart/form-data";
        assert_eq!(parse_boundary(content_type), Err(Error::NoBoundary));
    }
}
