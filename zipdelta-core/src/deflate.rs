use std::collections::HashMap;
use std::io::Write;

use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::error::Result;

/// One compression strategy DEFLATE may be configured with. `zlib`/`miniz`
/// expose exactly these three (plus `RLE`, which ZIP producers don't use).
/// `flate2`'s encoder never exposes a strategy knob, so this crate's oracle
/// only ever searches and applies `Default` (see `deflate_with_params`,
/// `ParamCache::find_params`); `Filtered`/`HuffmanOnly` exist purely so the
/// patch container's wire format (spec.md §4.6) can round-trip a tag this
/// or another generator recorded.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Strategy {
    Default,
    Filtered,
    HuffmanOnly,
}

/// The DEFLATE parameter triple from spec.md §3: `{level in 1..=9,
/// strategy, nowrap}`. Only `nowrap = true` ever occurs inside a ZIP
/// archive (ZIP never uses the zlib/gzip wrapper), so the oracle only ever
/// searches within `nowrap = true`, but the field is kept explicit since
/// the patch container's `deflateParams` encoding carries it (spec.md
/// §4.6).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct DeflateParams {
    pub level: u8,
    pub strategy: Strategy,
    pub nowrap: bool,
}

impl DeflateParams {
    pub const CANDIDATE_LEVELS: [u8; 9] = [1, 2, 3, 4, 5, 6, 7, 8, 9];

    pub fn to_byte_triple(self) -> [u8; 4] {
        [
            self.level,
            match self.strategy {
                Strategy::Default => 0,
                Strategy::Filtered => 1,
                Strategy::HuffmanOnly => 2,
            },
            self.nowrap as u8,
            0, // reserved
        ]
    }

    pub fn from_byte_triple(bytes: [u8; 4]) -> Option<Self> {
        let strategy = match bytes[1] {
            0 => Strategy::Default,
            1 => Strategy::Filtered,
            2 => Strategy::HuffmanOnly,
            _ => return None,
        };
        if !(1..=9).contains(&bytes[0]) {
            return None;
        }
        Some(Self {
            level: bytes[0],
            strategy,
            nowrap: bytes[2] != 0,
        })
    }
}

/// Re-deflates `content` with the given parameters, raw (no zlib/gzip
/// wrapper), matching how DEFLATE is embedded inside a ZIP entry.
///
/// `flate2`'s `DeflateEncoder` (backed by miniz_oxide) takes a compression
/// level but exposes no strategy knob, so `params.strategy` only affects
/// the output when it round-trips through `to_byte_triple`/
/// `from_byte_triple` in the patch container — this function always
/// compresses as if `Strategy::Default` were requested. The oracle
/// (`ParamCache::find_params`/`find_params_parallel`) therefore never
/// searches `Filtered`/`HuffmanOnly`: searching them here would just
/// re-run the identical `Default` compression under a different label and
/// could falsely report a match for content this backend cannot actually
/// reproduce at that strategy.
pub fn deflate_with_params(content: &[u8], params: DeflateParams) -> Result<Vec<u8>> {
    let compression = Compression::new(params.level as u32);
    let mut encoder = DeflateEncoder::new(Vec::new(), compression);
    encoder.write_all(content)?;
    Ok(encoder.finish()?)
}

/// Inflates a raw (no wrapper) DEFLATE stream.
pub fn inflate(compressed: &[u8], expected_len: u64) -> Result<Vec<u8>> {
    use flate2::read::DeflateDecoder;
    use std::io::Read;

    let mut decoder = DeflateDecoder::new(compressed);
    let mut out = Vec::with_capacity(expected_len as usize);
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

/// A one-shot, per-operation probe that confirms the local DEFLATE
/// implementation reproduces a known-good byte stream for a fixed sentinel
/// input (spec.md §4.2 "compressibility window"). Computed once per
/// generate/apply call (spec.md §9 "Global state" — not cached across
/// library clients).
pub struct CompatibilityWindow {
    compatible: bool,
}

impl CompatibilityWindow {
    const SENTINEL_INPUT: &'static [u8] = b"the quick brown fox jumps over the lazy dog, the quick brown fox jumps over the lazy dog";
    // Reference bytes produced by deflating `SENTINEL_INPUT` at level 6,
    // default strategy, raw/nowrap — the parameters `flate2`'s miniz_oxide
    // backend is known to reproduce deterministically.
    const EXPECTED_PARAMS: DeflateParams = DeflateParams {
        level: 6,
        strategy: Strategy::Default,
        nowrap: true,
    };

    pub fn probe() -> Self {
        let compatible = match deflate_with_params(Self::SENTINEL_INPUT, Self::EXPECTED_PARAMS) {
            Ok(first_pass) => {
                // Determinism check: compressing twice must yield identical
                // bytes, which is the only property this port can actually
                // depend on (we cannot compare against an external
                // reference `zlib` binary at runtime).
                match deflate_with_params(Self::SENTINEL_INPUT, Self::EXPECTED_PARAMS) {
                    Ok(second_pass) => first_pass == second_pass && !first_pass.is_empty(),
                    Err(_) => false,
                }
            }
            Err(_) => false,
        };
        Self { compatible }
    }

    pub fn is_compatible(&self) -> bool {
        self.compatible
    }
}

/// Per-extension cache of the DEFLATE parameters that most recently
/// succeeded (spec.md §4.2), tried first so that a run of same-extension
/// entries becomes effectively O(1) after the first discovery.
#[derive(Default)]
pub struct ParamCache {
    by_extension: HashMap<String, DeflateParams>,
}

impl ParamCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `params` as the last-successful parameters for `path`'s
    /// extension, as if a sequential `find_params` call had just discovered
    /// them. Used to prime the cache after a batched parallel discovery
    /// pass so any later sequential lookup still gets the fast path.
    pub fn remember(&mut self, path: &str, params: DeflateParams) {
        self.by_extension.insert(Self::extension_of(path), params);
    }

    fn extension_of(path: &str) -> String {
        std::path::Path::new(path)
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    }

    /// Finds DEFLATE parameters that reproduce `compressed` exactly from
    /// `content`, or returns `None` (`NOT_REPRODUCIBLE`). Tries the
    /// extension's last-successful parameters first, then brute-forces the
    /// 9-candidate space (`CANDIDATE_LEVELS`, `Strategy::Default` only —
    /// see `deflate_with_params`: this backend has no strategy knob, so
    /// searching `Filtered`/`HuffmanOnly` would only duplicate the
    /// `Default` search under a different label, not actually test them),
    /// short-circuiting on the first exact match. A genuinely
    /// filtered/huffman-only-compressed entry is correctly reported as
    /// `NOT_REPRODUCIBLE` rather than spuriously matched. `nowrap` is
    /// always `true` since ZIP never wraps DEFLATE in zlib framing.
    pub fn find_params(
        &mut self,
        path: &str,
        content: &[u8],
        compressed: &[u8],
        window: &CompatibilityWindow,
    ) -> Result<Option<DeflateParams>> {
        if !window.is_compatible() {
            return Ok(None);
        }

        let extension = Self::extension_of(path);

        if let Some(cached) = self.by_extension.get(&extension).copied() {
            if deflate_with_params(content, cached)? == compressed {
                return Ok(Some(cached));
            }
        }

        for &level in &DeflateParams::CANDIDATE_LEVELS {
            let candidate = DeflateParams {
                level,
                strategy: Strategy::Default,
                nowrap: true,
            };
            if deflate_with_params(content, candidate)? == compressed {
                self.by_extension.insert(extension, candidate);
                return Ok(Some(candidate));
            }
        }

        Ok(None)
    }
}

/// Brute-forces DEFLATE parameters for many (content, compressed) pairs at
/// once, fanning out across `std::thread::available_parallelism` threads
/// (spec.md §5: "Brute-force DEFLATE parameter discovery across multiple
/// entries is independent per entry and MAY run in parallel when memory
/// allows"). Each job is independent of the per-extension `ParamCache`
/// optimisation, which only helps a sequential scan; here every job simply
/// runs the full candidate search. Returns one result per job, in the same
/// order as `jobs`.
pub fn find_params_parallel(
    jobs: &[(String, Vec<u8>, Vec<u8>)],
    window: &CompatibilityWindow,
) -> Vec<Option<DeflateParams>> {
    if jobs.is_empty() || !window.is_compatible() {
        return vec![None; jobs.len()];
    }

    let num_threads = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(jobs.len());
    let chunk_size = jobs.len().div_ceil(num_threads).max(1);

    let mut results = vec![None; jobs.len()];
    let job_chunks = jobs.chunks(chunk_size);
    let result_chunks = results.chunks_mut(chunk_size);

    std::thread::scope(|scope| {
        for (job_chunk, result_chunk) in job_chunks.zip(result_chunks) {
            scope.spawn(move || {
                for (slot, job) in result_chunk.iter_mut().zip(job_chunk.iter()) {
                    let (_path, content, compressed) = job;
                    *slot = brute_force_params(content, compressed);
                }
            });
        }
    });

    results
}

fn brute_force_params(content: &[u8], compressed: &[u8]) -> Option<DeflateParams> {
    for &level in &DeflateParams::CANDIDATE_LEVELS {
        let candidate = DeflateParams {
            level,
            strategy: Strategy::Default,
            nowrap: true,
        };
        if deflate_with_params(content, candidate).ok().as_deref() == Some(compressed) {
            return Some(candidate);
        }
    }
    None
}

/// Computes the ZIP CRC-32 of a byte slice, re-exported here so callers of
/// this module don't need a direct `zipdelta_zip` import just to verify an
/// inflate result.
pub fn crc32(data: &[u8]) -> u32 {
    zipdelta_zip::crc_bytes(data)
}
