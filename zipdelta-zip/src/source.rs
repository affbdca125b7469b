use std::io::{Read, Seek, SeekFrom};

use crate::range::ByteRange;

/// A random-access byte source: anything the parser and blob builder can
/// seek around in and read slice windows from. spec.md §9 ("Coroutines /
/// streams") calls for exactly this shape rather than a push-based streaming
/// API, since the only place that needs forward-only streaming is the
/// suffix array construction, which works on an in-memory slice anyway.
pub trait RangeSource: Read + Seek {
    /// Reads exactly `range.len` bytes starting at `range.offset`, without
    /// disturbing callers that rely on the current position elsewhere (the
    /// position after this call is `range.end()`).
    fn read_range(&mut self, range: ByteRange) -> std::io::Result<Vec<u8>> {
        self.seek(SeekFrom::Start(range.offset))?;
        let mut buf = vec![0u8; range.len as usize];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn len(&mut self) -> std::io::Result<u64> {
        let current = self.stream_position()?;
        let len = self.seek(SeekFrom::End(0))?;
        self.seek(SeekFrom::Start(current))?;
        Ok(len)
    }
}

impl<T: Read + Seek + ?Sized> RangeSource for T {}
