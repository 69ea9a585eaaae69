use std::borrow::Cow;
use std::fmt::{self, Debug, Formatter};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use encoding_rs::{Encoding, UTF_8};
use futures_util::stream::{Stream, TryStreamExt};
use http::header::{self, HeaderMap};
#[cfg(feature = "json")]
use serde::de::DeserializeOwned;
use spin::mutex::spin::SpinMutex;

use crate::content_disposition;
use crate::state::MultipartState;

/// A single part of a `multipart/form-data` body: its parsed header block
/// plus a pull-based stream over the body bytes.
///
/// The body is only valid until the next part is requested from the
/// [`Multipart`](crate::Multipart); any bytes still unread when this value is
/// dropped are drained internally.
pub struct Part<'r> {
    state: Arc<SpinMutex<MultipartState<'r>>>,
    headers: HeaderMap,
    done: bool,
    meta: PartMeta,
}

struct PartMeta {
    name: Option<String>,
    file_name: Option<String>,
    content_type: Option<mime::Mime>,
    idx: usize,
}

impl<'r> Part<'r> {
    pub(crate) fn new(
        state: Arc<SpinMutex<MultipartState<'r>>>,
        headers: HeaderMap,
        idx: usize,
    ) -> Self {
        let (name, file_name) = match content_disposition::parse(&headers) {
            Ok(Some(disposition)) => (disposition.field_name, disposition.file_name),
            _ => (None, None),
        };
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<mime::Mime>().ok());

        Part {
            state,
            headers,
            done: false,
            meta: PartMeta {
                name,
                file_name,
                content_type,
                idx,
            },
        }
    }

    /// The field name of this part, taken from the `Content-Disposition`
    /// header.
    pub fn name(&self) -> Option<&str> {
        self.meta.name.as_deref()
    }

    /// The file name of this part, if the `Content-Disposition` header
    /// carried one. This is the value exactly as sent by the client.
    pub fn file_name(&self) -> Option<&str> {
        self.meta.file_name.as_deref()
    }

    /// The parsed `Content-Type` of this part.
    pub fn content_type(&self) -> Option<&mime::Mime> {
        self.meta.content_type.as_ref()
    }

    /// The full header block of this part.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The position of this part in the stream, starting at `0`.
    pub fn index(&self) -> usize {
        self.meta.idx
    }

    /// Reads the next body chunk, if any.
    pub async fn chunk(&mut self) -> crate::Result<Option<Bytes>> {
        self.try_next().await
    }

    /// Reads the whole body into one [`Bytes`] buffer.
    pub async fn bytes(mut self) -> crate::Result<Bytes> {
        let mut buf = BytesMut::new();

        while let Some(bytes) = self.chunk().await? {
            buf.extend_from_slice(&bytes);
        }

        Ok(buf.freeze())
    }

    /// Reads the whole body as UTF-8 text.
    pub async fn text(self) -> crate::Result<String> {
        self.text_with_charset("utf-8").await
    }

    /// Reads the whole body as text, decoded with the charset declared in
    /// the part's `Content-Type` (falling back to `default_encoding`).
    pub async fn text_with_charset(self, default_encoding: &str) -> crate::Result<String> {
        let encoding_name = self
            .content_type()
            .and_then(|mime| mime.get_param(mime::CHARSET))
            .map(|charset| charset.as_str())
            .unwrap_or(default_encoding)
            .to_owned();

        let encoding = Encoding::for_label(encoding_name.as_bytes()).unwrap_or(UTF_8);

        let bytes = self.bytes().await?;

        let (text, _, _) = encoding.decode(&bytes);

        match text {
            Cow::Owned(s) => Ok(s),
            Cow::Borrowed(s) => Ok(String::from(s)),
        }
    }

    /// Deserializes the body as JSON.
    ///
    /// # Optional
    ///
    /// This requires the optional `json` feature to be enabled.
    #[cfg(feature = "json")]
    #[cfg_attr(nightly, doc(cfg(feature = "json")))]
    pub async fn json<T: DeserializeOwned>(self) -> crate::Result<T> {
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes)
            .map_err(|err| crate::Error::DecodeJson(std::sync::Arc::new(err)))
    }

    pub(crate) fn state(&self) -> &Arc<SpinMutex<MultipartState<'r>>> {
        &self.state
    }
}

impl<'r> Debug for Part<'r> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Part")
            .field("idx", &self.meta.idx)
            .field("name", &self.meta.name)
            .field("file_name", &self.meta.file_name)
            .finish()
    }
}

impl<'r> Stream for Part<'r> {
    type Item = crate::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if this.done {
            return Poll::Ready(None);
        }

        let mut state = this.state.lock();

        if let Some(err) = &state.error {
            return Poll::Ready(Some(Err(err.clone())));
        }

        match state.poll_body_chunk(cx) {
            Poll::Ready(Ok((true, trailing))) => {
                drop(state);
                this.done = true;
                match trailing {
                    Some(bytes) => Poll::Ready(Some(Ok(bytes))),
                    None => Poll::Ready(None),
                }
            }
            Poll::Ready(Ok((false, Some(bytes)))) => Poll::Ready(Some(Ok(bytes))),
            // `poll_body_chunk` only reports an empty read together with the
            // end of the part.
            Poll::Ready(Ok((false, None))) => Poll::Ready(None),
            Poll::Ready(Err(err)) => {
                state.error = Some(err.clone());
                Poll::Ready(Some(Err(err)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<'r> Drop for Part<'r> {
    fn drop(&mut self) {
        let mut state = self.state.lock();

        state.is_prev_part_consumed = true;

        if let Some(waker) = state.next_part_waker.take() {
            waker.wake();
        }
    }
}
