//! Groups log lines into records.

use crate::error::CoreResult;

/// Batches lines into records.
///
/// A record is a run of non-empty lines closed by an empty line. Extra empty
/// lines between records are skipped. A run still open when the lines run
/// out is a torn write and is never yielded.
pub struct RecordGrouper<I> {
    lines: I,
    finished: bool,
}

impl<I> RecordGrouper<I>
where
    I: Iterator<Item = CoreResult<String>>,
{
    /// Creates a grouper over `lines`.
    pub fn new(lines: I) -> Self {
        Self {
            lines,
            finished: false,
        }
    }

    /// Returns the underlying line source.
    pub fn lines(&self) -> &I {
        &self.lines
    }

    /// Returns the underlying line source mutably, e.g. to mark a position.
    pub fn lines_mut(&mut self) -> &mut I {
        &mut self.lines
    }
}

impl<I> Iterator for RecordGrouper<I>
where
    I: Iterator<Item = CoreResult<String>>,
{
    type Item = CoreResult<Vec<String>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let mut batch = Vec::new();
        loop {
            match self.lines.next() {
                None => {
                    self.finished = true;
                    return None;
                }
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(e));
                }
                Some(Ok(line)) if line.is_empty() => {
                    if !batch.is_empty() {
                        return Some(Ok(batch));
                    }
                }
                Some(Ok(line)) => batch.push(line),
            }
        }
    }
}
