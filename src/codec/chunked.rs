//! Body framing: fixed length, chunked, or until the peer closes.
use std::io;
use std::io::prelude::*;

use log::debug;

use crate::io::{OutputFilter, Stream};

const MAX_CHUNK_LINE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkState {
    /// Next thing on the wire is a chunk size line.
    Size,
    /// Inside chunk payload.
    Data,
    /// Payload consumed, its CRLF is not yet.
    DataEnd,
    /// Last chunk and trailers consumed, or the framing broke.
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Length,
    Chunked(ChunkState),
    UntilClose,
}

/// Read side framing state of one message body.
#[derive(Debug, Clone)]
pub struct BodyReader {
    mode: Mode,
    remaining: u64,
    error: Option<String>,
}

impl Default for BodyReader {
    fn default() -> Self {
        Self::fixed(0)
    }
}

impl BodyReader {
    pub fn fixed(length: u64) -> Self {
        Self {
            mode: Mode::Length,
            remaining: length,
            error: None,
        }
    }
    pub fn chunked() -> Self {
        Self {
            mode: Mode::Chunked(ChunkState::Size),
            remaining: 0,
            error: None,
        }
    }
    pub fn until_close() -> Self {
        Self {
            mode: Mode::UntilClose,
            remaining: 0,
            error: None,
        }
    }

    pub fn is_chunked(&self) -> bool {
        matches!(self.mode, Mode::Chunked(_))
    }

    /// Remaining bytes of the current framing unit: the rest of a fixed
    /// length body, or of the current chunk (0 while the next chunk size
    /// is unknown).
    pub fn size(&self) -> u64 {
        match self.mode {
            Mode::Length => self.remaining,
            Mode::Chunked(ChunkState::Data) => self.remaining,
            _ => 0,
        }
    }

    /// Remaining length counter, or -1 for chunked and close-delimited bodies.
    pub fn content_length(&self) -> i64 {
        match self.mode {
            Mode::Length => self.remaining as i64,
            _ => -1,
        }
    }

    pub fn is_finished(&self) -> bool {
        match self.mode {
            Mode::Length => self.remaining == 0,
            Mode::Chunked(state) => state == ChunkState::Done,
            Mode::UntilClose => self.remaining == u64::MAX,
        }
    }

    /// Framing error seen so far, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn fail(&mut self, reason: String) {
        debug!("body framing: {}", reason);
        self.error = Some(reason);
        match self.mode {
            Mode::Length => self.remaining = 0,
            Mode::Chunked(_) => self.mode = Mode::Chunked(ChunkState::Done),
            Mode::UntilClose => self.remaining = u64::MAX,
        }
    }

    /// Consume the CRLF after a chunk payload.
    fn read_chunk_end<S: Read + Write>(&mut self, stream: &mut Stream<S>) -> io::Result<()> {
        let mut line = vec![];
        stream.read_line(&mut line, MAX_CHUNK_LINE)?;
        if line == b"\r\n" || line == b"\n" {
            self.mode = Mode::Chunked(ChunkState::Size);
        } else {
            self.fail("missing CRLF after chunk".to_string());
        }
        Ok(())
    }

    /// Read a chunk size line. A zero size ends the body after skipping
    /// any trailer lines, an empty or malformed size line ends it as well.
    fn read_chunk_size<S: Read + Write>(&mut self, stream: &mut Stream<S>) -> io::Result<()> {
        let mut line = vec![];
        stream.read_line(&mut line, MAX_CHUNK_LINE)?;
        let text = String::from_utf8_lossy(&line);
        let size = text.split(';').next().unwrap_or("").trim();
        if size.is_empty() {
            self.fail("empty chunk size line".to_string());
            return Ok(());
        }
        if !size.bytes().all(|b| b.is_ascii_hexdigit()) {
            self.fail(format!("invalid chunk size line: {:?}", size));
            return Ok(());
        }
        match u64::from_str_radix(size, 16) {
            Ok(0) => {
                loop {
                    let mut trailer = vec![];
                    if stream.read_line(&mut trailer, MAX_CHUNK_LINE)? == 0 {
                        break;
                    }
                    if trailer == b"\r\n" || trailer == b"\n" {
                        break;
                    }
                }
                self.remaining = 0;
                self.mode = Mode::Chunked(ChunkState::Done);
            }
            Ok(n) => {
                self.remaining = n;
                self.mode = Mode::Chunked(ChunkState::Data);
            }
            Err(_) => self.fail(format!("invalid chunk size line: {:?}", size)),
        }
        Ok(())
    }

    /// Advance past chunk boundaries until payload bytes (or the end) are
    /// next on the wire.
    fn next_chunk<S: Read + Write>(&mut self, stream: &mut Stream<S>) -> io::Result<bool> {
        loop {
            match self.mode {
                Mode::Chunked(ChunkState::Data) => return Ok(true),
                Mode::Chunked(ChunkState::DataEnd) => self.read_chunk_end(stream)?,
                Mode::Chunked(ChunkState::Size) => self.read_chunk_size(stream)?,
                _ => return Ok(false),
            }
        }
    }

    fn consumed(&mut self, n: usize) {
        self.remaining -= n as u64;
        if self.remaining == 0 {
            if let Mode::Chunked(_) = self.mode {
                self.mode = Mode::Chunked(ChunkState::DataEnd);
            }
        }
    }

    /// Read body bytes into `buf`. Returns 0 once the body is complete.
    pub fn read<S: Read + Write>(&mut self, stream: &mut Stream<S>, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match self.mode {
            Mode::UntilClose => {
                if self.remaining == u64::MAX {
                    return Ok(0);
                }
                let n = stream.read(buf)?;
                if n == 0 {
                    self.remaining = u64::MAX;
                }
                Ok(n)
            }
            Mode::Length => {
                if self.remaining == 0 {
                    return Ok(0);
                }
                let max = buf.len().min(self.remaining.min(usize::MAX as u64) as usize);
                let n = stream.read(&mut buf[..max])?;
                if n == 0 {
                    let missing = self.remaining;
                    self.fail(format!("stream ended with {} body bytes missing", missing));
                    return Ok(0);
                }
                self.consumed(n);
                Ok(n)
            }
            Mode::Chunked(_) => {
                if !self.next_chunk(stream)? {
                    return Ok(0);
                }
                let max = buf.len().min(self.remaining.min(usize::MAX as u64) as usize);
                let n = stream.read(&mut buf[..max])?;
                if n == 0 {
                    self.fail("stream ended inside a chunk".to_string());
                    return Ok(0);
                }
                self.consumed(n);
                Ok(n)
            }
        }
    }

    /// Append one line of body to `out`. The read never crosses the end of
    /// the current framing unit: a line spanning a chunk boundary comes back
    /// as two pieces, the caller gets no help stitching them.
    pub fn read_line<S: Read + Write>(&mut self, stream: &mut Stream<S>, out: &mut Vec<u8>) -> io::Result<bool> {
        let limit = match self.mode {
            Mode::UntilClose => {
                if self.remaining == u64::MAX {
                    return Ok(false);
                }
                usize::MAX
            }
            Mode::Length => self.remaining.min(usize::MAX as u64) as usize,
            Mode::Chunked(_) => {
                if !self.next_chunk(stream)? {
                    return Ok(false);
                }
                self.remaining.min(usize::MAX as u64) as usize
            }
        };
        if limit == 0 {
            return Ok(false);
        }
        let n = stream.read_line(out, limit)?;
        if n == 0 {
            match self.mode {
                Mode::UntilClose => self.remaining = u64::MAX,
                _ => self.fail("stream ended inside the body".to_string()),
            }
            return Ok(false);
        }
        if self.mode != Mode::UntilClose {
            self.consumed(n);
        }
        Ok(true)
    }
}

/// Write side framing of one message body, optionally behind a compressor.
pub struct BodyWriter {
    chunked: bool,
    filter: OutputFilter,
    written: u64,
}

impl BodyWriter {
    pub fn new(chunked: bool, filter: OutputFilter) -> Self {
        Self {
            chunked,
            filter,
            written: 0,
        }
    }

    pub fn is_chunked(&self) -> bool {
        self.chunked
    }

    /// Payload bytes handed in so far, before compression.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn write<S: Read + Write>(&mut self, stream: &mut Stream<S>, data: &[u8]) -> io::Result<()> {
        self.written += data.len() as u64;
        let out = self.filter.filter(data)?;
        if self.chunked {
            write_chunk(stream, &out)
        } else {
            stream.write(&out)
        }
    }

    /// Flush the compressor and write the terminating chunk.
    pub fn finish<S: Read + Write>(self, stream: &mut Stream<S>) -> io::Result<()> {
        let tail = self.filter.finish()?;
        if self.chunked {
            write_chunk(stream, &tail)?;
            stream.write(b"0\r\n\r\n")?;
        } else {
            stream.write(&tail)?;
        }
        stream.flush()
    }
}

/// Write one chunk. Empty data writes nothing, as an empty chunk would end
/// the body.
pub fn write_chunk<S: Read + Write>(stream: &mut Stream<S>, data: &[u8]) -> io::Result<()> {
    if data.is_empty() {
        return Ok(());
    }
    stream.write(format!("{:X}\r\n", data.len()).as_bytes())?;
    stream.write(data)?;
    stream.write(b"\r\n")
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::io::ReadWriteAdapter;

    fn stream(input: &[u8]) -> Stream<ReadWriteAdapter<&[u8], Vec<u8>>> {
        Stream::new(ReadWriteAdapter::new(input, vec![]))
    }

    fn read_all(reader: &mut BodyReader, input: &[u8]) -> Vec<u8> {
        let mut s = stream(input);
        let mut out = vec![];
        let mut buf = [0; 3];
        loop {
            let n = reader.read(&mut s, &mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        out
    }

    fn chunk_encode(body: &[u8], chunk_size: usize) -> Vec<u8> {
        let mut s = stream(b"");
        let mut writer = BodyWriter::new(true, OutputFilter::new(None));
        for part in body.chunks(chunk_size) {
            writer.write(&mut s, part).unwrap();
        }
        writer.finish(&mut s).unwrap();
        s.into_inner().into_parts().1
    }

    #[test]
    fn test_chunk_roundtrip_any_chunk_size() {
        let body: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        for chunk_size in &[1, 7, 16, 999, 1000, 4096] {
            let wire = chunk_encode(&body, *chunk_size);
            let mut reader = BodyReader::chunked();
            assert_eq!(read_all(&mut reader, &wire), body, "chunk size {}", chunk_size);
            assert!(reader.is_finished());
            assert_eq!(reader.error(), None);
        }
    }

    #[test]
    fn test_chunked_extensions_and_trailers() {
        let wire = b"4;name=value\r\nWiki\r\n5\r\npedia\r\n0\r\nX-Trailer: 1\r\n\r\nNEXT";
        let mut s = stream(wire);
        let mut reader = BodyReader::chunked();
        let mut out = vec![];
        let mut buf = [0; 64];
        loop {
            let n = reader.read(&mut s, &mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(&out[..], b"Wikipedia");
        let mut rest = vec![];
        s.read_line(&mut rest, usize::MAX).unwrap();
        assert_eq!(&rest[..], b"NEXT");
    }

    #[test]
    fn test_malformed_chunk_size_ends_body() {
        let mut reader = BodyReader::chunked();
        assert!(read_all(&mut reader, b"zz\r\nabc\r\n0\r\n\r\n").is_empty());
        assert!(reader.is_finished());
        assert!(reader.error().is_some());

        let mut reader = BodyReader::chunked();
        assert!(read_all(&mut reader, b"\r\n").is_empty());
        assert!(reader.is_finished());

        for wire in &[&b"+5\r\nhello\r\n0\r\n\r\n"[..], b"-1\r\nx\r\n", b"0x5\r\nhello\r\n"] {
            let mut reader = BodyReader::chunked();
            assert!(read_all(&mut reader, wire).is_empty());
            assert!(reader.error().unwrap().contains("invalid chunk size"));
        }
    }

    #[test]
    fn test_size_reports_current_chunk() {
        let mut s = stream(b"5\r\nhello\r\n0\r\n\r\n");
        let mut reader = BodyReader::chunked();
        assert_eq!(reader.size(), 0);
        assert_eq!(reader.content_length(), -1);
        let mut buf = [0; 2];
        reader.read(&mut s, &mut buf).unwrap();
        assert_eq!(reader.size(), 3);
    }

    #[test]
    fn test_fixed_length_bounds_read() {
        let mut s = stream(b"hello world");
        let mut reader = BodyReader::fixed(5);
        let mut buf = [0; 64];
        assert_eq!(reader.read(&mut s, &mut buf).unwrap(), 5);
        assert_eq!(reader.read(&mut s, &mut buf).unwrap(), 0);
        assert!(reader.is_finished());
        assert_eq!(s.buffered(), 6);
    }

    #[test]
    fn test_fixed_length_short_stream() {
        let mut reader = BodyReader::fixed(10);
        assert_eq!(read_all(&mut reader, b"abc"), b"abc");
        assert!(reader.error().is_some());
        assert_eq!(reader.size(), 0);
    }

    #[test]
    fn test_read_line_in_fixed_body() {
        let mut s = stream(b"one\ntwo\nthree");
        let mut reader = BodyReader::fixed(8);
        let mut line = vec![];
        assert!(reader.read_line(&mut s, &mut line).unwrap());
        assert_eq!(&line[..], b"one\n");
        line.clear();
        assert!(reader.read_line(&mut s, &mut line).unwrap());
        assert_eq!(&line[..], b"two\n");
        line.clear();
        assert!(!reader.read_line(&mut s, &mut line).unwrap());
    }

    #[test]
    fn test_read_line_split_at_chunk_boundary() {
        // body "ab\r\ncd\n" sent as "ab\r" + "\ncd\n"
        let mut s = stream(b"3\r\nab\r\r\n4\r\n\ncd\n\r\n0\r\n\r\n");
        let mut reader = BodyReader::chunked();
        let mut line = vec![];
        assert!(reader.read_line(&mut s, &mut line).unwrap());
        assert_eq!(&line[..], b"ab\r");
        line.clear();
        assert!(reader.read_line(&mut s, &mut line).unwrap());
        assert_eq!(&line[..], b"\n");
        line.clear();
        assert!(reader.read_line(&mut s, &mut line).unwrap());
        assert_eq!(&line[..], b"cd\n");
        line.clear();
        assert!(!reader.read_line(&mut s, &mut line).unwrap());
        assert!(reader.is_finished());
    }
}
