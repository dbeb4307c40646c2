//! HTTP byte-range parsing and bounded/chunked readers over [`ReadAt`].
//!
//! Every read goes through an absolute offset, so concurrent range requests
//! against the same source never share a cursor.

use crate::errors::CoreError;
use crate::fs::ReadAt;
use std::io::{self, Read};

pub const STATUS_OK: u16 = 200;
pub const STATUS_PARTIAL_CONTENT: u16 = 206;
pub const STATUS_RANGE_NOT_SATISFIABLE: u16 = 416;

/// Upper bound on the payload of a single transfer-encoding chunk.
pub const MAX_CHUNK_SIZE: usize = 64 * 1024;

/// A serviceable byte window `[first, first + size)` of a `total`-byte source.
///
/// Always non-empty and inside the source: `size >= 1` and
/// `first + size <= total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeWindow {
    first: u64,
    size: u64,
    total: u64,
}

impl RangeWindow {
    /// A window of `size` bytes at `first`. `None` unless it is non-empty
    /// and fits inside `total`.
    pub fn new(first: u64, size: u64, total: u64) -> Option<Self> {
        let end = first.checked_add(size)?;
        (size > 0 && end <= total).then_some(Self { first, size, total })
    }

    /// The whole source. `None` when the source is empty.
    pub fn full(total: u64) -> Option<Self> {
        (total > 0).then_some(Self {
            first: 0,
            size: total,
            total,
        })
    }

    pub fn first(&self) -> u64 {
        self.first
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Inclusive index of the last byte.
    pub fn last(&self) -> u64 {
        self.first + (self.size - 1)
    }

    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.first, self.last(), self.total)
    }
}

fn parse_position(text: &str) -> Option<u64> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

/// Parses a `Range` header value against a known total length.
///
/// Accepts `bytes=first-last`, `bytes=first-` and `bytes=-suffix`. Anything
/// else, including multi-range requests, is unsatisfiable.
pub fn parse_range(header: &str, total: u64) -> crate::Result<RangeWindow> {
    let unsatisfiable = || CoreError::RangeNotSatisfiable { total };

    let (unit, spec) = header.trim().split_once('=').ok_or_else(unsatisfiable)?;
    if !unit.trim().eq_ignore_ascii_case("bytes") || spec.contains(',') || total == 0 {
        return Err(unsatisfiable());
    }
    let (first, last) = spec.trim().split_once('-').ok_or_else(unsatisfiable)?;

    if first.is_empty() {
        let suffix = parse_position(last).ok_or_else(unsatisfiable)?;
        if suffix == 0 {
            return Err(unsatisfiable());
        }
        let size = suffix.min(total);
        return Ok(RangeWindow {
            first: total - size,
            size,
            total,
        });
    }

    let first = parse_position(first).ok_or_else(unsatisfiable)?;
    if first >= total {
        return Err(unsatisfiable());
    }
    let last = if last.is_empty() {
        total - 1
    } else {
        parse_position(last).ok_or_else(unsatisfiable)?
    };
    if last < first {
        return Err(unsatisfiable());
    }
    let last = last.min(total - 1);
    Ok(RangeWindow {
        first,
        size: last - first + 1,
        total,
    })
}

/// Status line and headers for a (possibly ranged) content response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeResponse {
    pub status: u16,
    pub window: Option<RangeWindow>,
    pub headers: Vec<(&'static str, String)>,
}

impl RangeResponse {
    pub fn for_request(range_header: Option<&str>, total: u64) -> Self {
        let mut headers = vec![("Accept-Ranges", "bytes".to_string())];
        let Some(header) = range_header else {
            headers.push(("Content-Length", total.to_string()));
            return Self {
                status: STATUS_OK,
                window: RangeWindow::full(total),
                headers,
            };
        };

        match parse_range(header, total) {
            Ok(window) => {
                headers.push(("Content-Range", window.content_range()));
                headers.push(("Content-Length", window.size.to_string()));
                Self {
                    status: STATUS_PARTIAL_CONTENT,
                    window: Some(window),
                    headers,
                }
            }
            Err(_) => {
                headers.push(("Content-Range", format!("bytes */{total}")));
                Self {
                    status: STATUS_RANGE_NOT_SATISFIABLE,
                    window: None,
                    headers,
                }
            }
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Reader that yields exactly `window.size` bytes starting at `window.first`.
///
/// A source that runs dry early is an error, not end-of-stream.
pub struct BoundedReader<R> {
    source: R,
    next: u64,
    end: u64,
}

impl<R: ReadAt> BoundedReader<R> {
    pub fn new(source: R, window: RangeWindow) -> Self {
        Self {
            source,
            next: window.first,
            end: window.first.saturating_add(window.size),
        }
    }

    pub fn remaining(&self) -> u64 {
        self.end.saturating_sub(self.next)
    }

    /// Reads a single byte at the current offset.
    pub fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut byte = [0u8; 1];
        match self.read(&mut byte)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }
}

impl<R: ReadAt> Read for BoundedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.remaining();
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let want = usize::try_from(remaining).map_or(buf.len(), |r| r.min(buf.len()));
        let read = self.source.read_at(self.next, &mut buf[..want])?;
        if read == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "range source truncated at offset {}, {} bytes still owed",
                    self.next, remaining
                ),
            ));
        }
        self.next += read as u64;
        Ok(read)
    }
}

/// Frames a bounded window with HTTP/1.1 chunked transfer encoding.
pub struct ChunkedReader<R> {
    inner: BoundedReader<R>,
    chunk_size: usize,
    frame: Vec<u8>,
    pos: usize,
    finished: bool,
}

impl<R: ReadAt> ChunkedReader<R> {
    pub fn new(source: R, window: RangeWindow) -> Self {
        Self::with_chunk_size(source, window, MAX_CHUNK_SIZE)
    }

    /// Chunk sizes are clamped to `1..=MAX_CHUNK_SIZE`.
    pub fn with_chunk_size(source: R, window: RangeWindow, chunk_size: usize) -> Self {
        Self {
            inner: BoundedReader::new(source, window),
            chunk_size: chunk_size.clamp(1, MAX_CHUNK_SIZE),
            frame: Vec::new(),
            pos: 0,
            finished: false,
        }
    }

    fn fill_frame(&mut self) -> io::Result<()> {
        self.frame.clear();
        self.pos = 0;
        if self.inner.remaining() == 0 {
            self.frame.extend_from_slice(b"0\r\n\r\n");
            self.finished = true;
            return Ok(());
        }

        let want = usize::try_from(self.inner.remaining())
            .map_or(self.chunk_size, |r| r.min(self.chunk_size));
        let mut data = vec![0u8; want];
        self.inner.read_exact(&mut data)?;

        self.frame.extend_from_slice(format!("{want:x}\r\n").as_bytes());
        self.frame.extend_from_slice(&data);
        self.frame.extend_from_slice(b"\r\n");
        Ok(())
    }
}

impl<R: ReadAt> Read for ChunkedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos == self.frame.len() {
            if self.finished {
                return Ok(0);
            }
            self.fill_frame()?;
        }
        let count = buf.len().min(self.frame.len() - self.pos);
        buf[..count].copy_from_slice(&self.frame[self.pos..self.pos + count]);
        self.pos += count;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(header: &str, total: u64) -> Option<(u64, u64)> {
        parse_range(header, total).ok().map(|w| (w.first(), w.size()))
    }

    #[test]
    fn parses_explicit_ranges() {
        assert_eq!(window("bytes=0-0", 10), Some((0, 1)));
        assert_eq!(window("bytes=2-5", 10), Some((2, 4)));
        assert_eq!(window("bytes=2-", 10), Some((2, 8)));
        assert_eq!(window("bytes=8-100", 10), Some((8, 2)));
        assert_eq!(window("bytes=-3", 10), Some((7, 3)));
        assert_eq!(window("bytes=-30", 10), Some((0, 10)));
    }

    #[test]
    fn fails_closed_on_anything_odd() {
        for header in [
            "bytes=10-",
            "bytes=11-12",
            "bytes=5-2",
            "bytes=-0",
            "bytes=0-1,3-4",
            "bytes=+1-2",
            "bytes=a-b",
            "bytes 0-1",
            "items=0-1",
            "bytes=",
            "bytes=-",
        ] {
            assert_eq!(window(header, 10), None, "{header}");
        }
        assert_eq!(window("bytes=0-0", 0), None);
    }

    #[test]
    fn response_for_single_byte() {
        let resp = RangeResponse::for_request(Some("bytes=0-0"), 5);
        assert_eq!(resp.status, STATUS_PARTIAL_CONTENT);
        assert_eq!(resp.header("content-range"), Some("bytes 0-0/5"));
        assert_eq!(resp.header("Content-Length"), Some("1"));
        assert_eq!(resp.header("Accept-Ranges"), Some("bytes"));
    }

    #[test]
    fn response_unsatisfiable() {
        let resp = RangeResponse::for_request(Some("bytes=5-"), 5);
        assert_eq!(resp.status, STATUS_RANGE_NOT_SATISFIABLE);
        assert_eq!(resp.window, None);
        assert_eq!(resp.header("Content-Range"), Some("bytes */5"));
    }

    #[test]
    fn response_without_range_is_full() {
        let resp = RangeResponse::for_request(None, 5);
        assert_eq!(resp.status, STATUS_OK);
        assert_eq!(resp.window, RangeWindow::full(5));
    }

    #[test]
    fn windows_stay_inside_their_source() {
        assert_eq!(RangeWindow::new(0, 0, 10), None);
        assert_eq!(RangeWindow::new(8, 3, 10), None);
        assert_eq!(RangeWindow::new(u64::MAX, 2, u64::MAX), None);
        assert_eq!(RangeWindow::full(0), None);

        let w = RangeWindow::new(u64::MAX - 1, 1, u64::MAX).unwrap();
        assert_eq!(w.last(), u64::MAX - 1);
        assert_eq!(w.content_range(), format!("bytes {0}-{0}/{1}", u64::MAX - 1, u64::MAX));
        assert_eq!(BoundedReader::new(Vec::new(), w).remaining(), 1);
    }

    #[test]
    fn bounded_reader_yields_exact_window() {
        let data = b"0123456789".to_vec();
        let w = parse_range("bytes=3-6", 10).unwrap();
        let mut reader = BoundedReader::new(data, w);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"3456");
        assert_eq!(reader.read_byte().unwrap(), None);
    }

    #[test]
    fn bounded_reader_single_bytes() {
        let w = parse_range("bytes=8-", 10).unwrap();
        let mut reader = BoundedReader::new(b"0123456789".to_vec(), w);
        assert_eq!(reader.read_byte().unwrap(), Some(b'8'));
        assert_eq!(reader.read_byte().unwrap(), Some(b'9'));
        assert_eq!(reader.read_byte().unwrap(), None);
    }

    #[test]
    fn truncated_source_is_an_error() {
        // Window promises 10 bytes but the source only holds 4.
        let w = RangeWindow::new(0, 10, 10).unwrap();
        let mut reader = BoundedReader::new(b"abcd".to_vec(), w);
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(out, b"abcd");
    }

    #[test]
    fn chunked_framing() {
        let w = parse_range("bytes=0-9", 20).unwrap();
        let mut reader = ChunkedReader::with_chunk_size((0u8..20).collect::<Vec<_>>(), w, 4);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();

        let mut expected = Vec::new();
        expected.extend_from_slice(b"4\r\n");
        expected.extend_from_slice(&[0, 1, 2, 3]);
        expected.extend_from_slice(b"\r\n4\r\n");
        expected.extend_from_slice(&[4, 5, 6, 7]);
        expected.extend_from_slice(b"\r\n2\r\n");
        expected.extend_from_slice(&[8, 9]);
        expected.extend_from_slice(b"\r\n0\r\n\r\n");
        assert_eq!(out, expected);
    }

    #[test]
    fn chunk_size_is_hex() {
        let total = 300u64;
        let w = RangeWindow::full(total).unwrap();
        let mut reader = ChunkedReader::new(vec![7u8; 300], w);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert!(out.starts_with(b"12c\r\n"));
        assert!(out.ends_with(b"\r\n0\r\n\r\n"));
    }
}
