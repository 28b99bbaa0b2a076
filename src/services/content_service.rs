//! src/services/content_service.rs
//!
//! ContentService — range-aware delivery of stored learning materials.
//!
//! Streamable media (video, PDF, EPUB) is sent as a chunked byte body that
//! honours `Range` requests; text and source files are decoded and returned
//! whole. The body of a streamed delivery owns its file handle, so dropping
//! the response (client disconnect, error, completion) closes the file.

use crate::{
    models::{
        media::{DeliveryMode, MediaCategory, UnknownExtensionPolicy},
        range::{ByteRange, RangeError, resolve_range_header},
        stored_file::StoredFile,
    },
    services::storage_service::{StorageError, StorageService},
};
use bytes::Bytes;
use futures::{Stream, TryStreamExt, stream};
use std::{
    collections::VecDeque,
    io::{self, ErrorKind, SeekFrom},
    time::Duration,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::{AsyncReadExt, AsyncSeekExt},
    sync::mpsc,
};
use tracing::{debug, warn};
use uuid::Uuid;

/// Largest single read issued against a file while streaming.
pub const CHUNK_SIZE: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("file `{0}` not found")]
    NotFound(String),
    #[error("{0}")]
    MalformedRange(String),
    #[error("requested range not satisfiable for {length} byte file")]
    UnsatisfiableRange { length: u64 },
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type DeliveryResult<T> = Result<T, DeliveryError>;

impl From<StorageError> for DeliveryError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(id) => DeliveryError::NotFound(id),
            StorageError::Io(err) => DeliveryError::Io(err),
            other => DeliveryError::Io(io::Error::other(other.to_string())),
        }
    }
}

impl From<RangeError> for DeliveryError {
    fn from(err: RangeError) -> Self {
        match err {
            RangeError::Malformed(msg) => DeliveryError::MalformedRange(msg),
            RangeError::Unsatisfiable(length) => DeliveryError::UnsatisfiableRange { length },
        }
    }
}

/// Outcome of a content request.
#[derive(Debug)]
pub enum Delivery {
    Stream(StreamDelivery),
    Text { content: String },
}

/// Which slice of the file a streamed body covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamKind {
    Full,
    Single(ByteRange),
    /// `multipart/byteranges`, one part per range.
    Multi(Vec<ByteRange>),
}

/// A binary delivery ready to be turned into a response.
#[derive(Debug)]
pub struct StreamDelivery {
    pub kind: StreamKind,
    /// Media type of the whole response (`multipart/byteranges; …` for `Multi`).
    pub content_type: String,
    /// Exact number of bytes `body` will yield.
    pub content_length: u64,
    /// Size of the underlying file.
    pub total_size: u64,
    pub body: SegmentReader,
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(Bytes),
    File { start: u64, len: u64 },
}

impl Segment {
    fn len(&self) -> u64 {
        match self {
            Segment::Literal(bytes) => bytes.len() as u64,
            Segment::File { len, .. } => *len,
        }
    }
}

/// Reads a sequence of literal and file-backed segments from one file handle,
/// in order, at most `chunk_size` bytes at a time.
///
/// `read_timeout` bounds both sides of a streamed body: each read from disk,
/// and each hand-off of a chunk to the client. A client that stops reading
/// for that long has its body aborted and the file handle released.
#[derive(Debug)]
pub struct SegmentReader {
    file: File,
    segments: VecDeque<Segment>,
    /// Bytes left in the file segment currently being read.
    active: u64,
    chunk_size: usize,
    read_timeout: Duration,
}

impl SegmentReader {
    fn new(file: File, segments: Vec<Segment>, chunk_size: usize, read_timeout: Duration) -> Self {
        Self {
            file,
            segments: segments.into(),
            active: 0,
            chunk_size,
            read_timeout,
        }
    }

    /// Bytes this reader has yet to produce.
    fn remaining(&self) -> u64 {
        self.active + self.segments.iter().map(Segment::len).sum::<u64>()
    }

    async fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        loop {
            if self.active > 0 {
                let want = self.active.min(self.chunk_size as u64) as usize;
                let mut buf = vec![0u8; want];
                let n = tokio::time::timeout(self.read_timeout, self.file.read(&mut buf))
                    .await
                    .map_err(|_| io::Error::new(ErrorKind::TimedOut, "file read timed out"))??;
                if n == 0 {
                    return Err(io::Error::new(
                        ErrorKind::UnexpectedEof,
                        format!("file ended with {} bytes still owed", self.active),
                    ));
                }
                buf.truncate(n);
                self.active -= n as u64;
                return Ok(Some(Bytes::from(buf)));
            }

            match self.segments.pop_front() {
                None => return Ok(None),
                Some(Segment::Literal(bytes)) => return Ok(Some(bytes)),
                Some(Segment::File { start, len }) => {
                    if len > 0 {
                        self.file.seek(SeekFrom::Start(start)).await?;
                        self.active = len;
                    }
                }
            }
        }
    }

    /// Read chunks into `tx` until done, failed, or the client stalls.
    async fn pump(mut self, tx: mpsc::Sender<io::Result<Bytes>>) {
        loop {
            let item = match self.next_chunk().await {
                Ok(Some(chunk)) => Ok(chunk),
                Ok(None) => return,
                Err(err) => Err(err),
            };
            let failed = item.is_err();

            match tokio::time::timeout(self.read_timeout, tx.send(item)).await {
                Ok(Ok(())) if !failed => {}
                Ok(Ok(())) => return,
                Ok(Err(_)) => {
                    debug!("content stream dropped by client");
                    return;
                }
                Err(_) => {
                    warn!(
                        "client stalled for {:?}, releasing file with {} bytes unsent",
                        self.read_timeout,
                        self.remaining()
                    );
                    return;
                }
            }
        }
    }

    /// Turn the reader into a body stream. Bytes come out in file order.
    ///
    /// Reading happens on a spawned task, so this must be called inside a
    /// tokio runtime. A body that ends before every promised byte was sent
    /// finishes with an error rather than a clean end of stream.
    pub fn into_stream(self) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
        let owed = self.remaining();
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(self.pump(tx));

        stream::unfold((rx, owed), |(mut rx, owed)| async move {
            match rx.recv().await {
                Some(Ok(chunk)) => {
                    let owed = owed.saturating_sub(chunk.len() as u64);
                    Some((Ok(chunk), (rx, owed)))
                }
                Some(Err(err)) => Some((Err(err), (rx, 0))),
                None if owed > 0 => Some((
                    Err(io::Error::new(
                        ErrorKind::TimedOut,
                        format!("body abandoned with {} bytes still owed", owed),
                    )),
                    (rx, 0),
                )),
                None => None,
            }
        })
        .inspect_err(|err| warn!("content stream aborted: {}", err))
    }
}

/// ContentService resolves a file identifier and decides how to deliver it.
#[derive(Clone, Debug)]
pub struct ContentService {
    storage: StorageService,
    unknown_policy: UnknownExtensionPolicy,
    read_timeout: Duration,
    chunk_size: usize,
}

impl ContentService {
    pub fn new(
        storage: StorageService,
        unknown_policy: UnknownExtensionPolicy,
        read_timeout: Duration,
    ) -> Self {
        Self {
            storage,
            unknown_policy,
            read_timeout,
            chunk_size: CHUNK_SIZE,
        }
    }

    /// Deliver the file named `id`, honouring `range` for streamable media.
    ///
    /// `range` is the raw `Range` header value. It is only decoded for
    /// streamable media; text-mode files ignore it and are returned whole.
    pub async fn deliver(&self, id: &str, range: Option<&[u8]>) -> DeliveryResult<Delivery> {
        let file = self.storage.resolve(id).await?;
        let category = MediaCategory::from_path(&file.path);

        match category.delivery_mode(self.unknown_policy) {
            DeliveryMode::Text => {
                debug!("delivering {} as text ({:?})", id, category);
                let bytes = fs::read(&file.path).await.map_err(|err| not_found_or_io(id, err))?;
                Ok(Delivery::Text {
                    content: decode_utf8_dropping_invalid(&bytes),
                })
            }
            DeliveryMode::Streaming => self.stream(file, range).await.map(Delivery::Stream),
        }
    }

    async fn stream(&self, file: StoredFile, range: Option<&[u8]>) -> DeliveryResult<StreamDelivery> {
        let media_type = file.content_type.clone();
        let total = file.size;

        let (kind, content_type, segments) = match range {
            None => (
                StreamKind::Full,
                media_type,
                vec![Segment::File {
                    start: 0,
                    len: total,
                }],
            ),
            Some(raw) => {
                let header = std::str::from_utf8(raw)
                    .ok()
                    .filter(|h| h.is_ascii())
                    .ok_or_else(|| {
                        DeliveryError::MalformedRange("range header is not ASCII".into())
                    })?;
                let mut ranges = resolve_range_header(header, total)?;
                if ranges.len() == 1 {
                    let range = ranges.remove(0);
                    (
                        StreamKind::Single(range),
                        media_type,
                        vec![Segment::File {
                            start: range.start,
                            len: range.len(),
                        }],
                    )
                } else {
                    let boundary = Uuid::new_v4().simple().to_string();
                    let segments = multipart_segments(&ranges, &boundary, &media_type, total);
                    (
                        StreamKind::Multi(ranges),
                        format!("multipart/byteranges; boundary={}", boundary),
                        segments,
                    )
                }
            }
        };

        let content_length = segments.iter().map(Segment::len).sum();
        debug!(
            "streaming {} ({:?}, {} of {} bytes)",
            file.id, kind, content_length, total
        );

        let handle = File::open(&file.path)
            .await
            .map_err(|err| not_found_or_io(&file.id, err))?;

        Ok(StreamDelivery {
            kind,
            content_type,
            content_length,
            total_size: total,
            body: SegmentReader::new(handle, segments, self.chunk_size, self.read_timeout),
        })
    }
}

/// Lay out a `multipart/byteranges` body: a header before each range and a
/// closing delimiter after the last.
fn multipart_segments(
    ranges: &[ByteRange],
    boundary: &str,
    media_type: &str,
    total: u64,
) -> Vec<Segment> {
    let mut segments = Vec::with_capacity(ranges.len() * 2 + 1);
    for range in ranges {
        let head = format!(
            "\r\n--{}\r\nContent-Type: {}\r\nContent-Range: {}\r\n\r\n",
            boundary,
            media_type,
            range.content_range(total)
        );
        segments.push(Segment::Literal(Bytes::from(head)));
        segments.push(Segment::File {
            start: range.start,
            len: range.len(),
        });
    }
    segments.push(Segment::Literal(Bytes::from(format!(
        "\r\n--{}--\r\n",
        boundary
    ))));
    segments
}

/// Decode UTF-8, silently dropping invalid byte sequences.
pub fn decode_utf8_dropping_invalid(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        out.push_str(chunk.valid());
    }
    out
}

fn not_found_or_io(id: &str, err: io::Error) -> DeliveryError {
    if err.kind() == ErrorKind::NotFound {
        DeliveryError::NotFound(id.to_string())
    } else {
        DeliveryError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tempfile::TempDir;

    fn service(dir: &TempDir, policy: UnknownExtensionPolicy) -> ContentService {
        ContentService::new(
            StorageService::new(dir.path(), u64::MAX),
            policy,
            Duration::from_secs(5),
        )
    }

    fn patterned(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    async fn collect(reader: SegmentReader) -> (Vec<u8>, usize) {
        let mut out = Vec::new();
        let mut chunks = 0;
        let mut stream = Box::pin(reader.into_stream());
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.unwrap();
            assert!(chunk.len() <= CHUNK_SIZE);
            out.extend_from_slice(&chunk);
            chunks += 1;
        }
        (out, chunks)
    }

    fn expect_stream(delivery: Delivery) -> StreamDelivery {
        match delivery {
            Delivery::Stream(stream) => stream,
            Delivery::Text { .. } => panic!("expected a streamed delivery"),
        }
    }

    #[tokio::test]
    async fn full_stream_reproduces_file_in_bounded_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let data = patterned(CHUNK_SIZE * 2 + 17);
        std::fs::write(dir.path().join("clip.webm"), &data).unwrap();

        let delivery = service(&dir, UnknownExtensionPolicy::Text)
            .deliver("clip.webm", None)
            .await
            .unwrap();
        let stream = expect_stream(delivery);
        assert_eq!(stream.kind, StreamKind::Full);
        assert_eq!(stream.content_type, "video/webm");
        assert_eq!(stream.content_length, data.len() as u64);

        let (body, chunks) = collect(stream.body).await;
        assert_eq!(body, data);
        assert!(chunks >= 3);
    }

    #[tokio::test]
    async fn ranged_stream_matches_slice() {
        let dir = tempfile::tempdir().unwrap();
        let data = patterned(CHUNK_SIZE + 4096);
        std::fs::write(dir.path().join("book.pdf"), &data).unwrap();
        let svc = service(&dir, UnknownExtensionPolicy::Text);

        for (start, end) in [(0usize, 0usize), (10, 99), (100, CHUNK_SIZE + 200), (data.len() - 1, data.len() - 1)] {
            let header = format!("bytes={}-{}", start, end);
            let stream = expect_stream(svc.deliver("book.pdf", Some(header.as_bytes())).await.unwrap());
            assert_eq!(
                stream.kind,
                StreamKind::Single(ByteRange {
                    start: start as u64,
                    end: end as u64
                })
            );
            assert_eq!(stream.content_length, (end - start + 1) as u64);
            let (body, _) = collect(stream.body).await;
            assert_eq!(body, &data[start..=end]);
        }
    }

    #[tokio::test]
    async fn multiple_ranges_become_multipart_byteranges() {
        let dir = tempfile::tempdir().unwrap();
        let data = b"0123456789abcdefghij".to_vec();
        std::fs::write(dir.path().join("notes.epub"), &data).unwrap();

        let stream = expect_stream(
            service(&dir, UnknownExtensionPolicy::Text)
                .deliver("notes.epub", Some(b"bytes=0-3, -2".as_slice()))
                .await
                .unwrap(),
        );

        let boundary = stream
            .content_type
            .strip_prefix("multipart/byteranges; boundary=")
            .unwrap()
            .to_string();
        let expected = format!(
            "\r\n--{b}\r\nContent-Type: application/epub+zip\r\nContent-Range: bytes 0-3/20\r\n\r\n0123\
             \r\n--{b}\r\nContent-Type: application/epub+zip\r\nContent-Range: bytes 18-19/20\r\n\r\nij\
             \r\n--{b}--\r\n",
            b = boundary
        );

        assert_eq!(stream.content_length, expected.len() as u64);
        let (body, _) = collect(stream.body).await;
        assert_eq!(String::from_utf8(body).unwrap(), expected);
    }

    #[tokio::test]
    async fn range_errors_are_classified() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("v.mp4"), patterned(100)).unwrap();
        let svc = service(&dir, UnknownExtensionPolicy::Text);

        assert!(matches!(
            svc.deliver("v.mp4", Some(b"bytes=abc".as_slice())).await,
            Err(DeliveryError::MalformedRange(_))
        ));
        assert!(matches!(
            svc.deliver("v.mp4", Some(b"bytes=100-".as_slice())).await,
            Err(DeliveryError::UnsatisfiableRange { length: 100 })
        ));
        assert!(matches!(
            svc.deliver("missing.pdf", None).await,
            Err(DeliveryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn text_files_ignore_range_and_drop_invalid_utf8() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), b"print(\"hi\")\xff\xfe").unwrap();

        let delivery = service(&dir, UnknownExtensionPolicy::Text)
            .deliver("a.py", Some("bytes=\u{e9}".as_bytes()))
            .await
            .unwrap();
        match delivery {
            Delivery::Text { content } => assert_eq!(content, "print(\"hi\")"),
            Delivery::Stream(_) => panic!("text file was streamed"),
        }
    }

    #[tokio::test]
    async fn non_ascii_range_is_malformed_for_media() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("v.mp4"), patterned(10)).unwrap();

        let result = service(&dir, UnknownExtensionPolicy::Text)
            .deliver("v.mp4", Some(b"bytes=\xff-1".as_slice()))
            .await;
        assert!(matches!(result, Err(DeliveryError::MalformedRange(_))));
    }

    #[tokio::test]
    async fn file_truncated_mid_stream_ends_with_unexpected_eof() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lecture.mp4");
        std::fs::write(&path, patterned(3 * 64)).unwrap();
        let mut svc = service(&dir, UnknownExtensionPolicy::Text);
        svc.chunk_size = 64;

        let stream = expect_stream(svc.deliver("lecture.mp4", None).await.unwrap());
        std::fs::OpenOptions::new()
            .write(true)
            .open(&path)
            .unwrap()
            .set_len(64 + 10)
            .unwrap();

        let mut body = Box::pin(stream.body.into_stream());
        let mut received = 0u64;
        let mut failure = None;
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => received += bytes.len() as u64,
                Err(err) => {
                    failure = Some(err.kind());
                    break;
                }
            }
        }

        assert!(received < stream.content_length);
        assert_eq!(received, 64 + 10);
        assert_eq!(failure, Some(ErrorKind::UnexpectedEof));
    }

    #[tokio::test]
    async fn stalled_reader_releases_file_and_fails_body() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("talk.mp4"), patterned(8 * 16)).unwrap();
        let mut svc = ContentService::new(
            StorageService::new(dir.path(), u64::MAX),
            UnknownExtensionPolicy::Text,
            Duration::from_millis(50),
        );
        svc.chunk_size = 16;

        let stream = expect_stream(svc.deliver("talk.mp4", None).await.unwrap());
        let mut body = Box::pin(stream.body.into_stream());
        assert_eq!(body.next().await.unwrap().unwrap().len(), 16);

        tokio::time::sleep(Duration::from_millis(300)).await;

        let mut received = 16u64;
        let mut failure = None;
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => received += bytes.len() as u64,
                Err(err) => {
                    failure = Some(err.kind());
                    break;
                }
            }
        }

        assert!(received < stream.content_length);
        assert_eq!(failure, Some(ErrorKind::TimedOut));
    }

    #[tokio::test]
    async fn unknown_extensions_follow_policy() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("blob.bin"), [0u8, 1, 2, 3]).unwrap();

        let as_text = service(&dir, UnknownExtensionPolicy::Text)
            .deliver("blob.bin", None)
            .await
            .unwrap();
        assert!(matches!(as_text, Delivery::Text { .. }));

        let as_stream = service(&dir, UnknownExtensionPolicy::Stream)
            .deliver("blob.bin", Some(b"bytes=1-2".as_slice()))
            .await
            .unwrap();
        let stream = expect_stream(as_stream);
        assert_eq!(stream.content_type, "application/octet-stream");
        let (body, _) = collect(stream.body).await;
        assert_eq!(body, vec![1, 2]);
    }

    #[tokio::test]
    async fn empty_file_streams_nothing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("empty.mp4"), b"").unwrap();

        let stream = expect_stream(
            service(&dir, UnknownExtensionPolicy::Text)
                .deliver("empty.mp4", None)
                .await
                .unwrap(),
        );
        assert_eq!(stream.content_length, 0);
        let (body, chunks) = collect(stream.body).await;
        assert!(body.is_empty());
        assert_eq!(chunks, 0);
    }

    #[test]
    fn decoding_drops_invalid_sequences() {
        assert_eq!(decode_utf8_dropping_invalid(b"a\xc3\x28b"), "a(b");
        assert_eq!(decode_utf8_dropping_invalid("中文".as_bytes()), "中文");
    }
}
