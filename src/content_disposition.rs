use http::header::{self, HeaderMap};

use crate::Error;

/// The `name` and optional `filename` directives of a part's
/// `Content-Disposition: form-data` header.
#[derive(Debug, Clone)]
pub(crate) struct ContentDisposition {
    pub(crate) field_name: Option<String>,
    pub(crate) file_name: Option<String>,
}

/// Parses the `Content-Disposition` header of a part.
///
/// Returns `Ok(None)` when the header is absent; an absent header means the
/// part is skipped, while a present-but-malformed header is an error.
pub(crate) fn parse(headers: &HeaderMap) -> crate::Result<Option<ContentDisposition>> {
    let raw = match headers.get(header::CONTENT_DISPOSITION) {
        Some(raw) => raw,
        None => return Ok(None),
    };

    // Browsers send raw UTF-8 in the filename directive, so decode the whole
    // value as UTF-8 rather than visible ASCII.
    let value = std::str::from_utf8(raw.as_bytes()).map_err(|_| {
        Error::DecodeContentDisposition("header value is not valid UTF-8".to_owned())
    })?;

    let mut params = split_params(value);

    let disposition_type = params.next().unwrap_or_default();
    if !disposition_type.trim().eq_ignore_ascii_case("form-data") {
        return Err(Error::DecodeContentDisposition(format!(
            "expected form-data, got {:?}",
            disposition_type.trim()
        )));
    }

    let mut field_name = None;
    let mut file_name = None;

    for param in params {
        let param = param.trim();
        if param.is_empty() {
            continue;
        }

        let (key, value) = match param.split_once('=') {
            Some((key, value)) => (key.trim(), value),
            None => {
                return Err(Error::DecodeContentDisposition(format!(
                    "parameter without a value: {:?}",
                    param
                )));
            }
        };

        match key.to_ascii_lowercase().as_str() {
            "name" => field_name = Some(unquote(value)),
            "filename" => file_name = Some(unquote(value)),
            _ => {}
        }
    }

    Ok(Some(ContentDisposition {
        field_name,
        file_name,
    }))
}

/// Splits on `;`, but not inside a double-quoted string.
fn split_params(value: &str) -> impl Iterator<Item = &str> {
    let mut rest = value;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }

        let mut in_quotes = false;
        let mut escaped = false;
        let mut end = rest.len();

        for (idx, ch) in rest.char_indices() {
            if escaped {
                escaped = false;
                continue;
            }
            match ch {
                '\\' if in_quotes => escaped = true,
                '"' => in_quotes = !in_quotes,
                ';' if !in_quotes => {
                    end = idx;
                    break;
                }
                _ => {}
            }
        }

        let param = &rest[..end];
        rest = if end == rest.len() { "" } else { &rest[end + 1..] };
        Some(param)
    })
}

fn unquote(value: &str) -> String {
    let value = value.trim();

    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        let inner = &value[1..value.len() - 1];
        let mut out = String::with_capacity(inner.len());
        let mut escaped = false;
        for ch in inner.chars() {
            if escaped {
                out.push(ch);
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else {
                out.push(ch);
            }
        }
        out
    } else {
        value.to_owned()
    }
}
