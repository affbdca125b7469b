//! The applier-side recompression stream (spec.md §4.7): a write-side
//! wrapper around the final output that passes bytes through unchanged,
//! except inside a recompression range, where it buffers the range's bytes
//! and re-deflates them with the recorded DEFLATE parameters exactly at the
//! range boundary.

use std::io::{self, Write};

use crate::blob::RecompressRange;
use crate::deflate;
use crate::error::Error;

/// Wraps `inner`, materialising `ranges` of the delta-friendly new blob as
/// DEFLATE-compressed output instead of passing them through verbatim.
/// `ranges` need not be pre-sorted; the stream sorts them once at
/// construction (spec.md §5 "Ordering guarantees" only promises the
/// container's ranges are contiguous/ordered, not that every caller hands
/// them over pre-sorted).
pub struct RecompressionStream<W: Write> {
    inner: W,
    ranges: Vec<RecompressRange>,
    position: u64,
    current: usize,
    buffer: Vec<u8>,
}

impl<W: Write> RecompressionStream<W> {
    pub fn new(inner: W, mut ranges: Vec<RecompressRange>) -> Self {
        ranges.sort_by_key(|r| r.blob_range.offset);
        Self {
            inner,
            ranges,
            position: 0,
            current: 0,
            buffer: Vec::new(),
        }
    }

    fn flush_range(&mut self) -> io::Result<()> {
        let params = self.ranges[self.current].deflate_params;
        let compressed = deflate::deflate_with_params(&self.buffer, params)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        self.inner.write_all(&compressed)?;
        self.buffer.clear();
        self.current += 1;
        Ok(())
    }

    /// Consumes the stream, returning the inner writer. Errors if a
    /// recompression range was left partially buffered (i.e. the caller
    /// stopped writing mid-range).
    pub fn finish(mut self) -> crate::error::Result<W> {
        self.flush()?;
        if !self.buffer.is_empty() {
            return Err(Error::patch_corrupt(
                self.position,
                "recompression stream ended in the middle of a range",
            ));
        }
        Ok(self.inner)
    }
}

impl<W: Write> Write for RecompressionStream<W> {
    fn write(&mut self, mut data: &[u8]) -> io::Result<usize> {
        let total = data.len();

        while !data.is_empty() {
            if self.current >= self.ranges.len() {
                self.inner.write_all(data)?;
                self.position += data.len() as u64;
                break;
            }

            let range = self.ranges[self.current].blob_range;

            if self.position < range.offset {
                let take = (range.offset - self.position).min(data.len() as u64) as usize;
                self.inner.write_all(&data[..take])?;
                self.position += take as u64;
                data = &data[take..];
                continue;
            }

            let remaining_in_range = range.end() - self.position;
            let take = remaining_in_range.min(data.len() as u64) as usize;
            self.buffer.extend_from_slice(&data[..take]);
            self.position += take as u64;
            data = &data[take..];

            if self.position == range.end() {
                self.flush_range()?;
            }
        }

        Ok(total)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deflate::{DeflateParams, Strategy};
    use zipdelta_zip::ByteRange;

    #[test]
    fn passes_bytes_outside_ranges_through_unchanged() {
        let mut out = Vec::new();
        {
            let mut stream = RecompressionStream::new(&mut out, Vec::new());
            stream.write_all(b"hello world").unwrap();
            stream.finish().unwrap();
        }
        assert_eq!(out, b"hello world");
    }

    #[test]
    fn recompresses_a_single_range_and_passes_the_rest_through() {
        let content = b"the quick brown fox jumps over the lazy dog".repeat(4);
        let params = DeflateParams {
            level: 6,
            strategy: Strategy::Default,
            nowrap: true,
        };
        let expected_compressed = deflate::deflate_with_params(&content, params).unwrap();

        let ranges = vec![RecompressRange {
            blob_range: ByteRange::new(5, content.len() as u64),
            deflate_params: params,
        }];

        let mut out = Vec::new();
        {
            let mut stream = RecompressionStream::new(&mut out, ranges);
            stream.write_all(b"AAAAA").unwrap();
            stream.write_all(&content).unwrap();
            stream.write_all(b"BBBBB").unwrap();
            stream.finish().unwrap();
        }

        let mut expected = b"AAAAA".to_vec();
        expected.extend_from_slice(&expected_compressed);
        expected.extend_from_slice(b"BBBBB");
        assert_eq!(out, expected);
    }

    #[test]
    fn rejects_stream_ended_mid_range() {
        let params = DeflateParams {
            level: 6,
            strategy: Strategy::Default,
            nowrap: true,
        };
        let ranges = vec![RecompressRange {
            blob_range: ByteRange::new(0, 100),
            deflate_params: params,
        }];
        let mut out = Vec::new();
        let mut stream = RecompressionStream::new(&mut out, ranges);
        stream.write_all(&[0u8; 50]).unwrap();
        assert!(stream.finish().is_err());
    }
}
