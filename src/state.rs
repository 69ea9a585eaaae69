use std::pin::Pin;
use std::task::{Context, Poll, Waker};

use bytes::{Buf, Bytes, BytesMut};
use futures_util::Stream;
use http::header::HeaderMap;

use crate::constants;
use crate::error::Limit;
use crate::helpers;
use crate::segment::{Segment, SegmentStream};
use crate::{Error, Limits};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamingStage {
    FindingFirstBoundary,
    DeterminingBoundaryType,
    ReadingPartHeaders,
    ReadingPartBody,
    Eof,
}

/// Sub-state of the header machine, tracking how much of a CRLF (or the
/// `\r\n\r\n` block terminator) has been seen so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CrLfState {
    Nil,
    Cr,
    CrLf,
    CrLfCr,
}

pub(crate) enum BoundaryType {
    /// `\r\n` followed the marker: another part starts here.
    Intermediate,
    /// `--` followed the marker: this was the final boundary.
    Final,
}

/// All per-parse state, shared between the [`Multipart`](crate::Multipart)
/// and the one live [`Part`](crate::Part) via `Arc<SpinMutex<..>>`.
pub(crate) struct MultipartState<'r> {
    pub(crate) segments: SegmentStream<'r>,
    pub(crate) limits: Limits,
    pub(crate) stage: StreamingStage,

    /// Unconsumed tail of the last data segment.
    current: Bytes,

    /// First byte of the 2-byte probe after a boundary marker, when the
    /// second byte has not arrived yet.
    probe: Option<u8>,

    // Header machine.
    header_buf: BytesMut,
    crlf_state: CrLfState,
    line_len: usize,
    header_count: usize,
    header_block_size: usize,

    /// 1–2 byte lookback so a `\r\n` split across segments can still be
    /// recognized as boundary framing and stripped from the body.
    body_tail: BytesMut,

    pub(crate) parts_seen: usize,
    pub(crate) file_bytes_total: u64,

    pub(crate) is_prev_part_consumed: bool,
    pub(crate) next_part_waker: Option<Waker>,

    /// First error raised by any layer; replayed on every later read.
    pub(crate) error: Option<Error>,
}

impl<'r> MultipartState<'r> {
    pub(crate) fn new(segments: SegmentStream<'r>, limits: Limits) -> Self {
        MultipartState {
            segments,
            limits,
            stage: StreamingStage::FindingFirstBoundary,
            current: Bytes::new(),
            probe: None,
            header_buf: BytesMut::new(),
            crlf_state: CrLfState::Nil,
            line_len: 0,
            header_count: 0,
            header_block_size: 0,
            body_tail: BytesMut::with_capacity(2),
            parts_seen: 0,
            file_bytes_total: 0,
            is_prev_part_consumed: true,
            next_part_waker: None,
            error: None,
        }
    }

    fn poll_segment(&mut self, cx: &mut Context<'_>) -> Poll<Option<crate::Result<Segment>>> {
        Pin::new(&mut self.segments).poll_next(cx)
    }

    /// Discards preamble data until the first boundary marker.
    pub(crate) fn poll_first_boundary(&mut self, cx: &mut Context<'_>) -> Poll<crate::Result<()>> {
        loop {
            match self.poll_segment(cx) {
                Poll::Ready(Some(Ok(Segment::Boundary))) => {
                    self.stage = StreamingStage::DeterminingBoundaryType;
                    self.probe = None;
                    return Poll::Ready(Ok(()));
                }
                Poll::Ready(Some(Ok(Segment::Data(_)))) => {}
                Poll::Ready(Some(Err(err))) => return Poll::Ready(Err(err)),
                Poll::Ready(None) => return Poll::Ready(Err(Error::IncompleteStream)),
                Poll::Pending => return Poll::Pending,
            }
        }
    }

    /// Reads the two bytes following a boundary marker: `\r\n` introduces the
    /// next part, `--` closes the stream.
    pub(crate) fn poll_boundary_type(
        &mut self,
        cx: &mut Context<'_>,
    ) -> Poll<crate::Result<BoundaryType>> {
        loop {
            if self.current.is_empty() {
                match self.poll_segment(cx) {
                    Poll::Ready(Some(Ok(Segment::Data(data)))) => self.current = data,
                    Poll::Ready(Some(Ok(Segment::Boundary))) => {
                        return Poll::Ready(Err(Error::IncompleteStream));
                    }
                    Poll::Ready(Some(Err(err))) => return Poll::Ready(Err(err)),
                    Poll::Ready(None) => return Poll::Ready(Err(Error::IncompleteStream)),
                    Poll::Pending => return Poll::Pending,
                }
                continue;
            }

            while !self.current.is_empty() {
                let byte = self.current[0];
                self.current.advance(1);

                match self.probe.take() {
                    None => self.probe = Some(byte),
                    Some(b'-') if byte == b'-' => return Poll::Ready(Ok(BoundaryType::Final)),
                    Some(constants::CR) if byte == constants::LF => {
                        return Poll::Ready(Ok(BoundaryType::Intermediate));
                    }
                    Some(_) => return Poll::Ready(Err(Error::IncompleteStream)),
                }
            }
        }
    }

    /// Resets the header machine for a new part. The boundary line's own CRLF
    /// has just been consumed, so the machine starts as if a line terminator
    /// was seen.
    pub(crate) fn begin_headers(&mut self) {
        self.stage = StreamingStage::ReadingPartHeaders;
        self.header_buf.clear();
        self.crlf_state = CrLfState::CrLf;
        self.line_len = 0;
        self.header_count = 0;
        self.header_block_size = 0;
    }

    /// Runs the header machine until the `\r\n\r\n` terminator, enforcing the
    /// header limits per byte, then parses the accumulated block.
    pub(crate) fn poll_headers(&mut self, cx: &mut Context<'_>) -> Poll<crate::Result<HeaderMap>> {
        loop {
            if self.current.is_empty() {
                match self.poll_segment(cx) {
                    Poll::Ready(Some(Ok(Segment::Data(data)))) => self.current = data,
                    Poll::Ready(Some(Ok(Segment::Boundary))) => {
                        return Poll::Ready(Err(Error::IncompleteHeaders));
                    }
                    Poll::Ready(Some(Err(err))) => return Poll::Ready(Err(err)),
                    Poll::Ready(None) => return Poll::Ready(Err(Error::IncompleteStream)),
                    Poll::Pending => return Poll::Pending,
                }
                continue;
            }

            let mut terminator_at = None;
            for (idx, &byte) in self.current.iter().enumerate() {
                match self.crlf_state {
                    CrLfState::Nil => {
                        if byte == constants::CR {
                            self.crlf_state = CrLfState::Cr;
                        } else {
                            self.line_len += 1;
                        }
                    }
                    CrLfState::Cr => {
                        if byte == constants::LF {
                            self.crlf_state = CrLfState::CrLf;
                            if self.line_len > 0 {
                                self.header_count += 1;
                                if self.header_count > self.limits.max_header_count {
                                    return Poll::Ready(Err(Error::limit_exceeded(
                                        Limit::HeaderCount,
                                        self.header_count as u64,
                                        self.limits.max_header_count as u64,
                                    )));
                                }
                                self.header_block_size += self.line_len;
                                if self.header_block_size > self.limits.max_total_header_size {
                                    return Poll::Ready(Err(Error::limit_exceeded(
                                        Limit::TotalHeaderSize,
                                        self.header_block_size as u64,
                                        self.limits.max_total_header_size as u64,
                                    )));
                                }
                                self.line_len = 0;
                            }
                        } else {
                            // A lone CR counts as line content.
                            self.line_len += 1;
                            if byte == constants::CR {
                                self.crlf_state = CrLfState::Cr;
                            } else {
                                self.line_len += 1;
                                self.crlf_state = CrLfState::Nil;
                            }
                        }
                    }
                    CrLfState::CrLf => {
                        if byte == constants::CR {
                            self.crlf_state = CrLfState::CrLfCr;
                        } else {
                            self.line_len = 1;
                            self.crlf_state = CrLfState::Nil;
                        }
                    }
                    CrLfState::CrLfCr => {
                        if byte == constants::LF {
                            terminator_at = Some(idx);
                            break;
                        }
                        // The CR opened a header line after all.
                        self.line_len = 1;
                        if byte == constants::CR {
                            self.crlf_state = CrLfState::Cr;
                        } else {
                            self.line_len += 1;
                            self.crlf_state = CrLfState::Nil;
                        }
                    }
                }

                if self.line_len > self.limits.max_header_size {
                    return Poll::Ready(Err(Error::limit_exceeded(
                        Limit::HeaderSize,
                        self.line_len as u64,
                        self.limits.max_header_size as u64,
                    )));
                }
            }

            match terminator_at {
                Some(idx) => {
                    self.header_buf.extend_from_slice(&self.current[..=idx]);
                    self.current.advance(idx + 1);
                    self.crlf_state = CrLfState::Nil;

                    let headers = self.parse_header_block();
                    return Poll::Ready(headers);
                }
                None => {
                    self.header_buf.extend_from_slice(&self.current);
                    let len = self.current.len();
                    self.current.advance(len);
                }
            }
        }
    }

    fn parse_header_block(&mut self) -> crate::Result<HeaderMap> {
        let mut raw_headers = vec![httparse::EMPTY_HEADER; self.limits.max_header_count.max(1)];

        match httparse::parse_headers(&self.header_buf, &mut raw_headers) {
            Ok(httparse::Status::Complete((_, parsed))) => helpers::headers_from_raw(parsed),
            Ok(httparse::Status::Partial) => Err(Error::IncompleteHeaders),
            Err(err) => Err(Error::ReadHeaderFailed(err)),
        }
    }

    /// Yields the next body chunk of the current part, with the `\r\n` that
    /// belongs to the boundary framing stripped. `(true, ..)` means the part
    /// ended and the stage has moved on to the boundary-type probe.
    pub(crate) fn poll_body_chunk(
        &mut self,
        cx: &mut Context<'_>,
    ) -> Poll<crate::Result<(bool, Option<Bytes>)>> {
        loop {
            if !self.current.is_empty() {
                let data = std::mem::take(&mut self.current);

                if self.body_tail.is_empty() {
                    let hold = tail_hold(&data);
                    let confirmed = data.len() - hold;
                    self.body_tail.extend_from_slice(&data[confirmed..]);
                    if confirmed == 0 {
                        continue;
                    }
                    return Poll::Ready(Ok((false, Some(data.slice(..confirmed)))));
                }

                let mut combined = BytesMut::with_capacity(self.body_tail.len() + data.len());
                combined.extend_from_slice(&self.body_tail);
                combined.extend_from_slice(&data);
                self.body_tail.clear();

                let hold = tail_hold(&combined);
                let confirmed = combined.len() - hold;
                self.body_tail.extend_from_slice(&combined[confirmed..]);
                if confirmed == 0 {
                    continue;
                }
                return Poll::Ready(Ok((false, Some(combined.split_to(confirmed).freeze()))));
            }

            match self.poll_segment(cx) {
                Poll::Ready(Some(Ok(Segment::Data(data)))) => self.current = data,
                Poll::Ready(Some(Ok(Segment::Boundary))) => {
                    self.stage = StreamingStage::DeterminingBoundaryType;
                    self.probe = None;

                    let trailing = if self.body_tail.as_ref() == constants::CRLF {
                        self.body_tail.clear();
                        None
                    } else if self.body_tail.is_empty() {
                        None
                    } else {
                        Some(self.body_tail.split().freeze())
                    };

                    return Poll::Ready(Ok((true, trailing)));
                }
                Poll::Ready(Some(Err(err))) => return Poll::Ready(Err(err)),
                Poll::Ready(None) => return Poll::Ready(Err(Error::IncompleteStream)),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// How many trailing bytes of `data` must be withheld because they may be the
/// CRLF that belongs to an upcoming boundary marker.
fn tail_hold(data: &[u8]) -> usize {
    if data.ends_with(constants::CRLF) {
        2
    } else if data.ends_with(&[constants::CR]) {
        1
    } else {
        0
    }
}
