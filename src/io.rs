//! Byte stream plumbing: buffered line/byte access over any `Read + Write`,
//! and the optional compressing write filter.
use std::borrow::Cow;
use std::io;
use std::io::prelude::*;

use serde::{Deserialize, Serialize};

const STREAM_BUFFER_SIZE: usize = 8192;

/// Buffered duplex stream used by the codec.
///
/// Reads are buffered so that lines can be pulled off the wire without
/// over-reading into the next message; writes are collected until
/// [`flush`](Stream::flush) or until the buffer fills up.
pub struct Stream<S> {
    inner: S,
    rbuf: Box<[u8]>,
    rpos: usize,
    rend: usize,
    wbuf: Vec<u8>,
    eof: bool,
    rx: u64,
    tx: u64,
}

impl<S: Read + Write> Stream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            rbuf: vec![0; STREAM_BUFFER_SIZE].into_boxed_slice(),
            rpos: 0,
            rend: 0,
            wbuf: Vec::with_capacity(STREAM_BUFFER_SIZE),
            eof: false,
            rx: 0,
            tx: 0,
        }
    }

    fn fill(&mut self) -> io::Result<usize> {
        if self.rpos < self.rend {
            return Ok(self.rend - self.rpos);
        }
        let n = loop {
            match self.inner.read(&mut self.rbuf) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                r => break r?,
            }
        };
        self.rpos = 0;
        self.rend = n;
        if n == 0 {
            self.eof = true;
        }
        Ok(n)
    }

    /// Append one line, including its `\n`, to `line`. At most `limit`
    /// bytes are consumed. Returns the number of bytes appended, 0 at end
    /// of stream.
    pub fn read_line(&mut self, line: &mut Vec<u8>, limit: usize) -> io::Result<usize> {
        let mut total = 0;
        while total < limit {
            if self.fill()? == 0 {
                break;
            }
            let available = &self.rbuf[self.rpos..self.rend];
            let available = &available[..available.len().min(limit - total)];
            let (take, done) = match available.iter().position(|&b| b == b'\n') {
                Some(i) => (i + 1, true),
                None => (available.len(), false),
            };
            line.extend_from_slice(&available[..take]);
            self.rpos += take;
            total += take;
            if done {
                break;
            }
        }
        self.rx += total as u64;
        Ok(total)
    }

    /// Read up to `buf.len()` bytes. Returns 0 at end of stream.
    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let n = if self.rpos == self.rend && buf.len() >= self.rbuf.len() {
            let n = self.inner.read(buf)?;
            if n == 0 {
                self.eof = true;
            }
            n
        } else {
            let available = self.fill()?;
            let n = available.min(buf.len());
            buf[..n].copy_from_slice(&self.rbuf[self.rpos..self.rpos + n]);
            self.rpos += n;
            n
        };
        self.rx += n as u64;
        Ok(n)
    }

    pub fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.wbuf.extend_from_slice(data);
        if self.wbuf.len() >= STREAM_BUFFER_SIZE {
            self.flush_buffer()?;
        }
        Ok(())
    }

    /// Write `line` followed by CRLF.
    pub fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.write(line.as_bytes())?;
        self.write(b"\r\n")
    }

    fn flush_buffer(&mut self) -> io::Result<()> {
        let result = self.inner.write_all(&self.wbuf);
        if result.is_ok() {
            self.tx += self.wbuf.len() as u64;
        }
        self.wbuf.clear();
        result
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.flush_buffer()?;
        self.inner.flush()
    }

    /// True once a read returned no data.
    pub fn is_eof(&self) -> bool {
        self.eof
    }
    /// Bytes still sitting in the read buffer.
    pub fn buffered(&self) -> usize {
        self.rend - self.rpos
    }
    pub fn rx_bytes(&self) -> u64 {
        self.rx
    }
    pub fn tx_bytes(&self) -> u64 {
        self.tx
    }
    pub fn reset_counters(&mut self) {
        self.rx = 0;
        self.tx = 0;
    }
    pub fn get_ref(&self) -> &S {
        &self.inner
    }
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }
    pub fn into_inner(self) -> S {
        self.inner
    }
}

/// Content codings the server can produce and the client can decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    Gzip,
    Deflate,
}

impl Compression {
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "gzip" | "x-gzip" => Some(Self::Gzip),
            "deflate" => Some(Self::Deflate),
            _ => None,
        }
    }
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Deflate => "deflate",
        }
    }
    /// Whether this build can actually run the codings.
    pub fn available() -> bool {
        cfg!(feature = "compression")
    }
}

/// The write view of a message body: either raw, or passed through a
/// compressor whose output is handed on to the body framing.
pub enum OutputFilter {
    Raw,
    #[cfg(feature = "compression")]
    Gzip(flate2::write::GzEncoder<Vec<u8>>),
    #[cfg(feature = "compression")]
    Deflate(flate2::write::ZlibEncoder<Vec<u8>>),
}

impl OutputFilter {
    pub fn new(compression: Option<Compression>) -> Self {
        match compression {
            #[cfg(feature = "compression")]
            Some(Compression::Gzip) => Self::Gzip(flate2::write::GzEncoder::new(
                vec![],
                flate2::Compression::default(),
            )),
            #[cfg(feature = "compression")]
            Some(Compression::Deflate) => Self::Deflate(flate2::write::ZlibEncoder::new(
                vec![],
                flate2::Compression::default(),
            )),
            _ => Self::Raw,
        }
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, Self::Raw)
    }

    /// Push `data` through the filter and return what is ready for the wire.
    pub fn filter<'a>(&'a mut self, data: &'a [u8]) -> io::Result<Cow<'a, [u8]>> {
        match self {
            Self::Raw => Ok(Cow::Borrowed(data)),
            #[cfg(feature = "compression")]
            Self::Gzip(enc) => {
                enc.write_all(data)?;
                Ok(Cow::Owned(std::mem::take(enc.get_mut())))
            }
            #[cfg(feature = "compression")]
            Self::Deflate(enc) => {
                enc.write_all(data)?;
                Ok(Cow::Owned(std::mem::take(enc.get_mut())))
            }
        }
    }

    /// Flush the compressor trailer, returns the remaining output.
    pub fn finish(self) -> io::Result<Vec<u8>> {
        match self {
            Self::Raw => Ok(vec![]),
            #[cfg(feature = "compression")]
            Self::Gzip(enc) => enc.finish(),
            #[cfg(feature = "compression")]
            Self::Deflate(enc) => enc.finish(),
        }
    }
}

/// Decode a complete body received with the given content coding.
pub fn decode_body(compression: Compression, data: &[u8]) -> io::Result<Vec<u8>> {
    #[cfg(feature = "compression")]
    {
        let mut out = vec![];
        match compression {
            Compression::Gzip => {
                flate2::read::GzDecoder::new(data).read_to_end(&mut out)?;
            }
            Compression::Deflate => {
                flate2::read::ZlibDecoder::new(data).read_to_end(&mut out)?;
            }
        }
        Ok(out)
    }
    #[cfg(not(feature = "compression"))]
    {
        let _ = data;
        Err(io::Error::new(
            io::ErrorKind::Other,
            format!("{} decoding not compiled in", compression.as_str()),
        ))
    }
}

/// Combine a read-only stream and a write-only stream into one read-write stream.
pub struct ReadWriteAdapter<R: Read, W: Write> {
    reader: R,
    writer: W,
}

impl<R: Read, W: Write> ReadWriteAdapter<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }
    pub fn writer(&self) -> &W {
        &self.writer
    }
    pub fn into_parts(self) -> (R, W) {
        (self.reader, self.writer)
    }
}

impl<R: Read, W: Write> Read for ReadWriteAdapter<R, W> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl<R: Read, W: Write> Write for ReadWriteAdapter<R, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }
    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn stream(input: &[u8]) -> Stream<ReadWriteAdapter<&[u8], Vec<u8>>> {
        Stream::new(ReadWriteAdapter::new(input, vec![]))
    }

    #[test]
    fn test_read_line_keeps_eol() {
        let mut s = stream(b"first\r\nsecond\nrest");
        let mut line = vec![];
        assert_eq!(s.read_line(&mut line, usize::MAX).unwrap(), 7);
        assert_eq!(&line[..], b"first\r\n");
        line.clear();
        s.read_line(&mut line, usize::MAX).unwrap();
        assert_eq!(&line[..], b"second\n");
        line.clear();
        assert_eq!(s.read_line(&mut line, usize::MAX).unwrap(), 4);
        line.clear();
        assert_eq!(s.read_line(&mut line, usize::MAX).unwrap(), 0);
        assert!(s.is_eof());
    }

    #[test]
    fn test_read_line_limit() {
        let mut s = stream(b"abcdef\n");
        let mut line = vec![];
        assert_eq!(s.read_line(&mut line, 3).unwrap(), 3);
        assert_eq!(&line[..], b"abc");
        let mut buf = [0; 16];
        assert_eq!(s.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], b"def\n");
        assert_eq!(s.rx_bytes(), 7);
    }

    #[test]
    fn test_write_buffers_until_flush() {
        let mut s = stream(b"");
        s.write_line("HTTP/1.1 200 OK").unwrap();
        assert!(s.get_ref().writer().is_empty());
        s.flush().unwrap();
        assert_eq!(&s.get_ref().writer()[..], b"HTTP/1.1 200 OK\r\n");
        assert_eq!(s.tx_bytes(), 17);
    }

    #[test]
    fn test_adapter_read() {
        let data = b"I love spaghetti";
        let mut adapter = ReadWriteAdapter::new(&data[..], vec![]);

        let mut buf = vec![0; 1024];
        let read_size = adapter.read(&mut buf).unwrap();
        assert_eq!(16, read_size);
        assert_eq!(data[..], buf[0..read_size]);
    }

    #[cfg(feature = "compression")]
    #[test]
    fn test_gzip_filter_roundtrip() {
        let mut filter = OutputFilter::new(Some(Compression::Gzip));
        let mut wire = filter.filter(b"hello ").unwrap().into_owned();
        wire.extend(filter.filter(b"world").unwrap().iter());
        wire.extend(filter.finish().unwrap());
        assert_eq!(decode_body(Compression::Gzip, &wire).unwrap(), b"hello world");
    }

    #[test]
    fn test_raw_filter_passthrough() {
        let mut filter = OutputFilter::new(None);
        assert!(filter.is_raw());
        assert_eq!(&filter.filter(b"abc").unwrap()[..], b"abc");
        assert!(filter.finish().unwrap().is_empty());
    }
}
