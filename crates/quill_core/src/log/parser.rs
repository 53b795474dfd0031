//! Line parser with a truncation mark.
//!
//! Reads the append log in fixed-size chunks and yields one decoded line per
//! terminator. The parser tracks the byte offset just past the last
//! terminator it consumed, so replay can remember the end of the last
//! verified record and truncate everything after it.

use crate::error::{CoreError, CoreResult};
use quill_storage::{FileData, StorageResult};
use std::io::{self, Read};

/// Read chunk size.
const READ_BUFFER_SIZE: usize = 64 * 1024; // 64 KB

/// A forward-only iterator over the lines of a byte stream.
///
/// `\n` and `\r\n` both end a line and are stripped from the yielded text.
/// Lines are decoded as UTF-8 only once complete, so a multi-byte character
/// split across two reads decodes correctly. A trailing fragment with no
/// terminator is never yielded.
///
/// # Example
///
/// ```rust
/// use quill_core::log::LineParser;
///
/// let mut parser = LineParser::new(&b"one\r\ntwo\nthree"[..]);
/// assert_eq!(parser.next().unwrap().unwrap(), "one");
/// parser.mark();
/// assert_eq!(parser.next().unwrap().unwrap(), "two");
/// assert!(parser.next().is_none());
/// assert_eq!(parser.marked(), 5);
/// ```
pub struct LineParser<R> {
    reader: R,
    /// Unconsumed bytes; `buffer[start..]` is not yet part of a yielded line.
    buffer: Vec<u8>,
    start: usize,
    /// Offset in `buffer` from which to resume the terminator search.
    scan: usize,
    /// Stream offset just past the last consumed terminator.
    position: u64,
    mark: u64,
    finished: bool,
}

impl<R: Read> LineParser<R> {
    /// Creates a parser over `reader`.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: Vec::new(),
            start: 0,
            scan: 0,
            position: 0,
            mark: 0,
            finished: false,
        }
    }

    /// Records the current position as known good.
    pub fn mark(&mut self) {
        self.mark = self.position;
    }

    /// Returns the offset recorded by the last [`LineParser::mark`], or 0.
    #[must_use]
    pub fn marked(&self) -> u64 {
        self.mark
    }

    /// Returns the offset just past the last line yielded.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    fn fill(&mut self) -> io::Result<bool> {
        if self.start > 0 {
            self.buffer.drain(..self.start);
            self.scan -= self.start;
            self.start = 0;
        }

        let len = self.buffer.len();
        self.buffer.resize(len + READ_BUFFER_SIZE, 0);
        let read = loop {
            match self.reader.read(&mut self.buffer[len..]) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.buffer.truncate(len);
                    return Err(e);
                }
            }
        };
        self.buffer.truncate(len + read);
        Ok(read > 0)
    }

    fn next_line(&mut self) -> CoreResult<Option<String>> {
        loop {
            if let Some(i) = self.buffer[self.scan..].iter().position(|&b| b == b'\n') {
                let end = self.scan + i;
                let mut line = &self.buffer[self.start..end];
                if let [rest @ .., b'\r'] = line {
                    line = rest;
                }

                let text = std::str::from_utf8(line)
                    .map_err(|e| {
                        CoreError::invalid_format(format!(
                            "invalid UTF-8 at offset {}: {e}",
                            self.position
                        ))
                    })?
                    .to_string();

                self.position += (end + 1 - self.start) as u64;
                self.start = end + 1;
                self.scan = self.start;
                return Ok(Some(text));
            }

            self.scan = self.buffer.len();
            if !self.fill()? {
                return Ok(None);
            }
        }
    }
}

impl<R: Read> Iterator for LineParser<R> {
    type Item = CoreResult<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.next_line() {
            Ok(Some(line)) => Some(Ok(line)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// Adapts a [`FileData`] handle to [`Read`], starting at offset 0.
pub struct FileReader<'a> {
    file: &'a dyn FileData,
    offset: u64,
    size: u64,
}

impl<'a> FileReader<'a> {
    /// Creates a reader over the current content of `file`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file size cannot be determined.
    pub fn new(file: &'a dyn FileData) -> StorageResult<Self> {
        let size = file.size()?;
        Ok(Self {
            file,
            offset: 0,
            size,
        })
    }
}

impl Read for FileReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.size.saturating_sub(self.offset);
        let len = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
        if len == 0 {
            return Ok(0);
        }

        let data = self.file.read_at(self.offset, len).map_err(io::Error::other)?;
        buf[..data.len()].copy_from_slice(&data);
        self.offset += data.len() as u64;
        Ok(data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use quill_storage::{Directory, MemoryDirectory};

    /// Yields at most `step` bytes per read.
    struct Trickle<'a> {
        data: &'a [u8],
        step: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.step.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    fn lines(data: &[u8]) -> Vec<String> {
        LineParser::new(data).collect::<CoreResult<_>>().unwrap()
    }

    #[test]
    fn splits_on_both_terminators() {
        assert_eq!(lines(b"a\nb\r\n\nc\r\n"), ["a", "b", "", "c"]);
    }

    #[test]
    fn unterminated_fragment_is_dropped() {
        assert_eq!(lines(b"a\nb"), ["a"]);
        assert_eq!(lines(b"2018-"), Vec::<String>::new());
        assert!(lines(b"").is_empty());
    }

    #[test]
    fn lone_carriage_return_stays_in_line() {
        assert_eq!(lines(b"a\rb\n"), ["a\rb"]);
    }

    #[test]
    fn multibyte_character_split_across_reads() {
        let text = "\u{00e9}t\u{00e9}\n\u{1f600}\n";
        let parser = LineParser::new(Trickle {
            data: text.as_bytes(),
            step: 1,
        });
        let lines: Vec<String> = parser.collect::<CoreResult<_>>().unwrap();
        assert_eq!(lines, ["\u{00e9}t\u{00e9}", "\u{1f600}"]);
    }

    #[test]
    fn invalid_utf8_is_a_format_error() {
        let mut parser = LineParser::new(&b"ok\n\xff\xfe\n"[..]);
        assert_eq!(parser.next().unwrap().unwrap(), "ok");
        assert!(matches!(
            parser.next(),
            Some(Err(CoreError::InvalidFormat { .. }))
        ));
        assert!(parser.next().is_none());
    }

    #[test]
    fn mark_tracks_terminator_offsets() {
        let mut parser = LineParser::new(&b"ab\r\ncd\n\nrest"[..]);
        assert_eq!(parser.marked(), 0);

        parser.next();
        assert_eq!(parser.position(), 4);
        parser.next();
        parser.next();
        parser.mark();
        assert_eq!(parser.marked(), 8);

        assert!(parser.next().is_none());
        assert_eq!(parser.marked(), 8);
        assert_eq!(parser.position(), 8);
    }

    #[test]
    fn lines_longer_than_one_chunk() {
        let long = "x".repeat(READ_BUFFER_SIZE * 2 + 17);
        let data = format!("{long}\nshort\n");
        assert_eq!(lines(data.as_bytes()), [long.as_str(), "short"]);
    }

    #[test]
    fn file_reader_reads_whole_file() {
        let dir = MemoryDirectory::new();
        dir.write("append.log", b"first\nsecond\n");
        let file = dir.open_file("append.log").unwrap().unwrap();

        let mut parser = LineParser::new(FileReader::new(file.as_ref()).unwrap());
        assert_eq!(parser.next().unwrap().unwrap(), "first");
        assert_eq!(parser.next().unwrap().unwrap(), "second");
        assert!(parser.next().is_none());
        assert_eq!(parser.position(), 13);
    }

    proptest! {
        #[test]
        fn chunking_never_changes_lines(
            input in prop::collection::vec(("[^\r\n]{0,20}", any::<bool>()), 0..10),
            step in 1usize..8,
        ) {
            let mut data = String::new();
            for (line, crlf) in &input {
                data.push_str(line);
                data.push_str(if *crlf { "\r\n" } else { "\n" });
            }

            let mut parser = LineParser::new(Trickle { data: data.as_bytes(), step });
            let parsed: Vec<String> = parser.by_ref().collect::<CoreResult<_>>().unwrap();
            let expected: Vec<&str> = input.iter().map(|(line, _)| line.as_str()).collect();
            prop_assert_eq!(parsed, expected);
            prop_assert_eq!(parser.position(), data.len() as u64);
        }
    }
}
