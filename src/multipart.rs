use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::stream::{Stream, TryStreamExt};
use spin::mutex::spin::SpinMutex;
#[cfg(feature = "tokio-io")]
use tokio::io::AsyncRead;
#[cfg(feature = "tokio-io")]
use tokio_util::io::ReaderStream;

use crate::error::Limit;
use crate::segment::SegmentStream;
use crate::state::{BoundaryType, MultipartState, StreamingStage};
use crate::{Error, Limits, Part};

/// Represents the implementation of `multipart/form-data` formatted data.
///
/// This will parse the source stream into [`Part`] instances via its
/// [`Stream`](futures_util::Stream) implementation.
///
/// To maintain consistency in the underlying stream, this will not yield more
/// than one [`Part`] at a time. A [`Drop`](std::ops::Drop) implementation on
/// [`Part`] is used to signal when it's time to move forward, so do avoid
/// leaking that type or anything which contains it. Any bytes of a part that
/// were not read when it was dropped are drained internally before the next
/// part is produced.
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
/// let data = "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"my_text_field\"\r\n\r\nabcd\r\n--X-BOUNDARY--\r\n";
/// let stream = once(async move { Result::<Bytes, Infallible>::Ok(Bytes::from(data)) });
/// let mut multipart = Multipart::new(stream, "X-BOUNDARY");
///
/// while let Some(part) = multipart.next_part().await.unwrap() {
///     println!("Part: {:?}", part.text().await)
/// }
/// # }
/// # tokio::runtime::Runtime::new().unwrap().block_on(run());
/// ```
pub struct Multipart<'r> {
    pub(crate) state: Arc<SpinMutex<MultipartState<'r>>>,
}

impl<'r> Multipart<'r> {
    /// Constructs a new `Multipart` instance from the given
    /// [`Bytes`](bytes::Bytes) stream and the boundary, with default
    /// [`Limits`].
    pub fn new<S, O, E, B>(stream: S, boundary: B) -> Self
    where
        S: Stream<Item = Result<O, E>> + Send + 'r,
        O: Into<Bytes> + 'r,
        E: Into<Box<dyn std::error::Error + Send + Sync>> + 'r,
        B: AsRef<str>,
    {
        Multipart::with_limits(stream, boundary, Limits::default())
    }

    /// Constructs a new `Multipart` instance with explicit [`Limits`].
    pub fn with_limits<S, O, E, B>(stream: S, boundary: B, limits: Limits) -> Self
    where
        S: Stream<Item = Result<O, E>> + Send + 'r,
        O: Into<Bytes> + 'r,
        E: Into<Box<dyn std::error::Error + Send + Sync>> + 'r,
        B: AsRef<str>,
    {
        let stream = stream
            .map_ok(|b| b.into())
            .map_err(|err| Error::StreamReadFailed(Arc::from(err.into())));

        let segments = SegmentStream::new(Box::pin(stream), boundary.as_ref());

        Multipart {
            state: Arc::new(SpinMutex::new(MultipartState::new(segments, limits))),
        }
    }

    /// Constructs a new `Multipart` instance from an
    /// [`AsyncRead`](tokio::io::AsyncRead) reader and the boundary.
    ///
    /// # Optional
    ///
    /// This requires the optional `tokio-io` feature to be enabled.
    #[cfg(feature = "tokio-io")]
    #[cfg_attr(nightly, doc(cfg(feature = "tokio-io")))]
    pub fn with_reader<R, B>(reader: R, boundary: B) -> Self
    where
        R: AsyncRead + Send + 'r,
        B: AsRef<str>,
    {
        Multipart::new(ReaderStream::new(reader), boundary)
    }

    /// Constructs a new `Multipart` instance from an
    /// [`AsyncRead`](tokio::io::AsyncRead) reader with explicit [`Limits`].
    ///
    /// # Optional
    ///
    /// This requires the optional `tokio-io` feature to be enabled.
    #[cfg(feature = "tokio-io")]
    #[cfg_attr(nightly, doc(cfg(feature = "tokio-io")))]
    pub fn with_reader_with_limits<R, B>(reader: R, boundary: B, limits: Limits) -> Self
    where
        R: AsyncRead + Send + 'r,
        B: AsRef<str>,
    {
        Multipart::with_limits(ReaderStream::new(reader), boundary, limits)
    }

    /// Yields the next [`Part`] if available.
    pub async fn next_part(&mut self) -> crate::Result<Option<Part<'r>>> {
        self.try_next().await
    }

    /// Yields the next [`Part`] with its positioning index as a tuple
    /// `(usize, Part)`.
    pub async fn next_part_with_idx(&mut self) -> crate::Result<Option<(usize, Part<'r>)>> {
        self.try_next()
            .await
            .map(|p| p.map(|part| (part.index(), part)))
    }

    /// A copy of the [`Limits`] this parse runs under.
    pub fn limits(&self) -> Limits {
        self.state.lock().limits.clone()
    }
}

impl<'r> Stream for Multipart<'r> {
    type Item = crate::Result<Part<'r>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if let Some(err) = &state.error {
            return Poll::Ready(Some(Err(err.clone())));
        }

        if state.stage == StreamingStage::Eof {
            return Poll::Ready(None);
        }

        if !state.is_prev_part_consumed {
            state.next_part_waker = Some(cx.waker().clone());
            return Poll::Pending;
        }

        loop {
            match state.stage {
                StreamingStage::FindingFirstBoundary => match state.poll_first_boundary(cx) {
                    Poll::Ready(Ok(())) => {}
                    Poll::Ready(Err(err)) => return Poll::Ready(Some(Err(fail(state, err)))),
                    Poll::Pending => return Poll::Pending,
                },

                StreamingStage::DeterminingBoundaryType => match state.poll_boundary_type(cx) {
                    Poll::Ready(Ok(BoundaryType::Final)) => {
                        #[cfg(feature = "log")]
                        log::trace!("final boundary after {} part(s)", state.parts_seen);

                        state.stage = StreamingStage::Eof;
                        return Poll::Ready(None);
                    }
                    Poll::Ready(Ok(BoundaryType::Intermediate)) => {
                        state.parts_seen += 1;
                        if state.parts_seen > state.limits.max_parts {
                            let err = Error::limit_exceeded(
                                Limit::Parts,
                                state.parts_seen as u64,
                                state.limits.max_parts as u64,
                            );
                            return Poll::Ready(Some(Err(fail(state, err))));
                        }
                        state.begin_headers();
                    }
                    Poll::Ready(Err(err)) => return Poll::Ready(Some(Err(fail(state, err)))),
                    Poll::Pending => return Poll::Pending,
                },

                StreamingStage::ReadingPartHeaders => match state.poll_headers(cx) {
                    Poll::Ready(Ok(headers)) => {
                        #[cfg(feature = "log")]
                        log::trace!(
                            "part {} started with {} header(s)",
                            state.parts_seen - 1,
                            headers.len()
                        );

                        state.stage = StreamingStage::ReadingPartBody;
                        state.is_prev_part_consumed = false;
                        let idx = state.parts_seen - 1;

                        drop(guard);

                        let part = Part::new(Arc::clone(&self.state), headers, idx);
                        return Poll::Ready(Some(Ok(part)));
                    }
                    Poll::Ready(Err(err)) => return Poll::Ready(Some(Err(fail(state, err)))),
                    Poll::Pending => return Poll::Pending,
                },

                // The previous part was dropped with unread data; drain it so
                // the cursor stays consistent.
                StreamingStage::ReadingPartBody => match state.poll_body_chunk(cx) {
                    Poll::Ready(Ok(_)) => {}
                    Poll::Ready(Err(err)) => return Poll::Ready(Some(Err(fail(state, err)))),
                    Poll::Pending => return Poll::Pending,
                },

                StreamingStage::Eof => return Poll::Ready(None),
            }
        }
    }
}

fn fail(state: &mut MultipartState<'_>, err: Error) -> Error {
    state.error = Some(err.clone());
    err
}
