use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, Bytes, BytesMut};

use crate::constants;

/// One item of the split stream: either part content or the marker that a
/// boundary occurred at this position.
///
/// Boundary bytes themselves are never emitted as data, and `Boundary` never
/// appears inside a data slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment {
    Data(Bytes),
    Boundary,
}

/// Splits a raw byte stream into [`Segment`]s on the boundary byte sequence
/// (`"--" + boundaryText`), with no knowledge of multipart semantics.
///
/// Bytes at the tail of the buffer that match a proper prefix of the boundary
/// are withheld until the next chunk confirms or refutes the match; refuted
/// bytes are re-scanned, so an occurrence starting inside the withheld region
/// is still found.
pub(crate) struct SegmentStream<'r> {
    stream: Pin<Box<dyn futures_util::Stream<Item = crate::Result<Bytes>> + Send + 'r>>,
    boundary: Bytes,
    buf: BytesMut,
    eof: bool,
}

impl<'r> SegmentStream<'r> {
    pub(crate) fn new(
        stream: Pin<Box<dyn futures_util::Stream<Item = crate::Result<Bytes>> + Send + 'r>>,
        boundary: &str,
    ) -> Self {
        SegmentStream {
            stream,
            boundary: Bytes::from(format!("{}{}", constants::BOUNDARY_EXT, boundary)),
            buf: BytesMut::new(),
            eof: false,
        }
    }

    fn next_segment(&mut self) -> Option<Segment> {
        if self.buf.is_empty() {
            return None;
        }

        let boundary = &self.boundary[..];

        if self.buf.len() >= boundary.len() && &self.buf[..boundary.len()] == boundary {
            self.buf.advance(boundary.len());
            return Some(Segment::Boundary);
        }

        match memchr::memmem::find(&self.buf, boundary) {
            Some(idx) => Some(Segment::Data(self.buf.split_to(idx).freeze())),
            None => {
                if self.eof {
                    return Some(Segment::Data(self.buf.split().freeze()));
                }

                let held = partial_match_len(&self.buf, boundary);
                let confirmed = self.buf.len() - held;
                if confirmed == 0 {
                    None
                } else {
                    Some(Segment::Data(self.buf.split_to(confirmed).freeze()))
                }
            }
        }
    }
}

impl<'r> futures_util::Stream for SegmentStream<'r> {
    type Item = crate::Result<Segment>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(segment) = this.next_segment() {
                return Poll::Ready(Some(Ok(segment)));
            }

            if this.eof {
                return Poll::Ready(None);
            }

            match this.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => this.buf.extend_from_slice(&chunk),
                Poll::Ready(Some(Err(err))) => return Poll::Ready(Some(Err(err))),
                Poll::Ready(None) => this.eof = true,
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Length of the longest suffix of `buf` that is a proper prefix of
/// `boundary`, i.e. the bytes that cannot be emitted yet.
fn partial_match_len(buf: &[u8], boundary: &[u8]) -> usize {
    let max = buf.len().min(boundary.len() - 1);
    for k in (1..=max).rev() {
        if buf[buf.len() - k..] == boundary[..k] {
            return k;
        }
    }
    0
}
