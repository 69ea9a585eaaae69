use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use encoding_rs::{Encoding, UTF_8};
use futures_util::stream::{Stream, TryStreamExt};

use crate::content_disposition;
use crate::error::Limit;
use crate::filename;
use crate::{Error, Multipart, Part};

/// The value of one assembled form entry: either decoded text or whatever
/// the caller's file handler returned for a file part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value<T> {
    Text(String),
    File(T),
}

impl<T> Value<T> {
    pub fn is_text(&self) -> bool {
        matches!(self, Value::Text(_))
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Value::File(_))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            Value::File(_) => None,
        }
    }

    pub fn as_file(&self) -> Option<&T> {
        match self {
            Value::Text(_) => None,
            Value::File(file) => Some(file),
        }
    }
}

/// An ordered collection of `(name, value)` form entries.
///
/// Multiple entries may share a name; iteration order always matches the
/// order the parts appeared in the stream, fields and files interleaved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormData<T> {
    entries: Vec<(String, Value<T>)>,
}

impl<T> FormData<T> {
    /// The first value under `name`, if any.
    pub fn get(&self, name: &str) -> Option<&Value<T>> {
        self.entries
            .iter()
            .find(|(entry_name, _)| entry_name == name)
            .map(|(_, value)| value)
    }

    /// All values under `name`, in encounter order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Value<T>> {
        self.entries
            .iter()
            .filter(move |(entry_name, _)| entry_name == name)
            .map(|(_, value)| value)
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// All `(name, value)` entries in encounter order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Value<T>)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value<T>> {
        self.entries.iter().map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> IntoIterator for FormData<T> {
    type Item = (String, Value<T>);
    type IntoIter = std::vec::IntoIter<(String, Value<T>)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Everything a file handler gets to see about one file part.
pub struct FileInfo<'r> {
    /// The field name.
    pub name: String,
    /// The sanitized filename.
    pub file_name: String,
    /// The filename exactly as the client sent it.
    pub raw_file_name: String,
    /// The declared content type, `application/octet-stream` when absent.
    pub content_type: mime::Mime,
    /// The file bytes. Consume or drop it before returning; either way the
    /// part is settled before the next one is parsed.
    pub body: FileBody<'r>,
}

/// A counting wrapper over a file part's body that enforces the per-file and
/// cumulative file-size limits before any over-limit byte is handed out.
pub struct FileBody<'r> {
    part: Part<'r>,
    size: u64,
}

impl<'r> FileBody<'r> {
    fn new(part: Part<'r>) -> Self {
        FileBody { part, size: 0 }
    }

    /// Reads the next chunk, if any.
    pub async fn chunk(&mut self) -> crate::Result<Option<Bytes>> {
        self.try_next().await
    }

    /// Reads the whole file into one [`Bytes`] buffer. The file-size limits
    /// still apply, so this holds at most `max_file_size` bytes.
    pub async fn bytes(mut self) -> crate::Result<Bytes> {
        let mut buf = BytesMut::new();

        while let Some(bytes) = self.chunk().await? {
            buf.extend_from_slice(&bytes);
        }

        Ok(buf.freeze())
    }
}

impl<'r> Stream for FileBody<'r> {
    type Item = crate::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        match Pin::new(&mut this.part).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.size += chunk.len() as u64;

                let mut state = this.part.state().lock();
                state.file_bytes_total += chunk.len() as u64;

                let err = if this.size > state.limits.max_file_size {
                    Some(Error::limit_exceeded(
                        Limit::FileSize,
                        this.size,
                        state.limits.max_file_size,
                    ))
                } else if state.file_bytes_total > state.limits.max_total_file_size {
                    Some(Error::limit_exceeded(
                        Limit::TotalFileSize,
                        state.file_bytes_total,
                        state.limits.max_total_file_size,
                    ))
                } else {
                    None
                };

                match err {
                    Some(err) => {
                        // Poison the parse so a handler that swallows this
                        // error cannot make the caller accept a truncated
                        // upload.
                        state.error = Some(err.clone());
                        Poll::Ready(Some(Err(err)))
                    }
                    None => Poll::Ready(Some(Ok(chunk))),
                }
            }
            other => other,
        }
    }
}

impl<'r> Multipart<'r> {
    /// Consumes the whole stream and assembles it into a [`FormData`]
    /// collection, invoking `handle_file` once per file part, strictly in
    /// stream order and never concurrently.
    ///
    /// Parts without a `Content-Disposition` header or without a `name`
    /// directive are skipped. Text parts are decoded with their declared
    /// charset (default UTF-8). Limit violations and handler errors abort
    /// the parse; no partial collection is ever returned.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::convert::Infallible;
    ///
    /// use bytes::Bytes;
    /// use futures_util::stream::once;
    /// use multiform::Multipart;
    ///
    /// # async fn run() {
    /// let data = "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"greeting\"\r\n\r\nhello\r\n--X-BOUNDARY--\r\n";
    /// let stream = once(async move { Result::<Bytes, Infallible>::Ok(Bytes::from(data)) });
    ///
    /// let form = Multipart::new(stream, "X-BOUNDARY")
    ///     .assemble(|info| async move { info.body.bytes().await })
    ///     .await
    ///     .unwrap();
    ///
    /// assert_eq!(form.get("greeting").unwrap().as_text(), Some("hello"));
    /// # }
    /// # tokio::runtime::Runtime::new().unwrap().block_on(run());
    /// ```
    pub async fn assemble<T, F, Fut>(mut self, mut handle_file: F) -> crate::Result<FormData<T>>
    where
        F: FnMut(FileInfo<'r>) -> Fut,
        Fut: Future<Output = crate::Result<T>>,
    {
        let limits = self.limits();
        let mut entries = Vec::new();
        let mut text_bytes_total: u64 = 0;

        while let Some(part) = self.next_part().await? {
            let disposition = match content_disposition::parse(part.headers())? {
                Some(disposition) => disposition,
                None => continue,
            };
            let name = match disposition.field_name {
                Some(name) => name,
                None => continue,
            };

            match disposition.file_name {
                Some(raw_file_name) => {
                    let file_name = filename::sanitize(&raw_file_name, limits.max_filename_length);
                    let content_type = part
                        .content_type()
                        .cloned()
                        .unwrap_or(mime::APPLICATION_OCTET_STREAM);

                    let value = handle_file(FileInfo {
                        name: name.clone(),
                        file_name,
                        raw_file_name,
                        content_type,
                        body: FileBody::new(part),
                    })
                    .await?;

                    entries.push((name, Value::File(value)));
                }
                None => {
                    let text = read_text_field(
                        part,
                        limits.max_text_field_size,
                        limits.max_total_text_field_size,
                        &mut text_bytes_total,
                    )
                    .await?;

                    entries.push((name, Value::Text(text)));
                }
            }
        }

        Ok(FormData { entries })
    }
}

/// Accumulates a text field's bytes, checking both text-size ceilings per
/// chunk before the chunk is retained, then decodes once at the end.
async fn read_text_field(
    mut part: Part<'_>,
    max_size: u64,
    max_total_size: u64,
    total: &mut u64,
) -> crate::Result<String> {
    let encoding_name = part
        .content_type()
        .and_then(|mime| mime.get_param(mime::CHARSET))
        .map(|charset| charset.as_str().to_owned());
    let encoding = encoding_name
        .as_deref()
        .and_then(|name| Encoding::for_label(name.as_bytes()))
        .unwrap_or(UTF_8);

    let mut buf = BytesMut::new();
    let mut size: u64 = 0;

    while let Some(chunk) = part.chunk().await? {
        size += chunk.len() as u64;
        *total += chunk.len() as u64;

        if size > max_size {
            return Err(Error::limit_exceeded(Limit::TextFieldSize, size, max_size));
        }
        if *total > max_total_size {
            return Err(Error::limit_exceeded(
                Limit::TotalTextFieldSize,
                *total,
                max_total_size,
            ));
        }

        buf.extend_from_slice(&chunk);
    }

    let (text, _, _) = encoding.decode(&buf);
    Ok(text.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FormData<u32> {
        FormData {
            entries: vec![
                ("a".to_owned(), Value::Text("one".to_owned())),
                ("b".to_owned(), Value::File(7)),
                ("a".to_owned(), Value::Text("two".to_owned())),
            ],
        }
    }

    #[test]
    fn get_returns_first_match() {
        let form = sample();
        assert_eq!(form.get("a").unwrap().as_text(), Some("one"));
        assert_eq!(form.get("b").unwrap().as_file(), Some(&7));
        assert!(form.get("missing").is_none());
    }

    #[test]
    fn get_all_preserves_order() {
        let form = sample();
        let values: Vec<_> = form.get_all("a").collect();
        assert_eq!(
            values,
            vec![
                &Value::Text("one".to_owned()),
                &Value::Text("two".to_owned())
            ]
        );
    }

    #[test]
    fn entries_interleave_fields_and_files() {
        let form = sample();
        let keys: Vec<_> = form.keys().collect();
        assert_eq!(keys, vec!["a", "b", "a"]);

        let kinds: Vec<_> = form.values().map(Value::is_file).collect();
        assert_eq!(kinds, vec![false, true, false]);
    }

    #[test]
    fn has_and_len() {
        let form = sample();
        assert!(form.has("a"));
        assert!(!form.has("z"));
        assert_eq!(form.len(), 3);
        assert!(!form.is_empty());
    }
}
