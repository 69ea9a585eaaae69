use std::convert::TryFrom;
use std::sync::Arc;

use http::header::{HeaderMap, HeaderName, HeaderValue};
use httparse::Header;

/// Converts the raw parsed headers into a [`HeaderMap`]. Names are
/// lower-cased by `HeaderName`; repeated names are folded into one value
/// joined with `", "`.
pub(crate) fn headers_from_raw(raw_headers: &[Header<'_>]) -> crate::Result<HeaderMap> {
    let mut headers: HeaderMap = HeaderMap::with_capacity(raw_headers.len());

    for raw_header in raw_headers {
        let name = HeaderName::try_from(raw_header.name).map_err(|err| {
            crate::Error::DecodeHeaderName {
                name: raw_header.name.to_owned(),
                cause: Arc::new(err),
            }
        })?;

        let value = match headers.get(&name) {
            Some(prev) => {
                let mut joined =
                    Vec::with_capacity(prev.as_bytes().len() + 2 + raw_header.value.len());
                joined.extend_from_slice(prev.as_bytes());
                joined.extend_from_slice(b", ");
                joined.extend_from_slice(raw_header.value);
                HeaderValue::try_from(joined)
            }
            None => HeaderValue::try_from(raw_header.value),
        }
        .map_err(|err| crate::Error::DecodeHeaderValue {
            cause: Arc::new(err),
        })?;

        headers.insert(&name, value);
    }

    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_headers_are_joined() {
        let raw = [
            httparse::Header {
                name: "X-Tag",
                value: b"one",
            },
            httparse::Header {
                name: "x-tag",
                value: b"two",
            },
        ];

        let headers = headers_from_raw(&raw).unwrap();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("x-tag").unwrap(), "one, two");
    }
}
