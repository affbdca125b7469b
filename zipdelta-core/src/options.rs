//! Per-operation option structs (SPEC_FULL.md §2 "Configuration"): the
//! teacher has no config-file story, just constants/struct arguments (see
//! `mbf-agent-core::parameters::AgentParameters`), so `generateDelta`/
//! `applyDelta`'s optional-overload pair from spec.md §6 collapses into one
//! `Default`-able struct per operation instead of two free functions.

use std::path::PathBuf;

use zipdelta_zip::CancelToken;

use crate::container::DeltaFormat;
use crate::plan::PlanModifier;

/// Options for `generate_delta`. Defaulting gives the single-overload
/// behaviour from spec.md §6 (`generateDelta(oldPath, newPath, patchOut)`);
/// setting `modifiers`/`allowed_delta_formats` gives the four-argument
/// overload.
pub struct GenerateOptions {
    /// Post-processes each table-driven plan decision (spec.md §4.3
    /// "External modifiers"). Empty by default: no policy beyond the table.
    pub modifiers: Vec<Box<dyn PlanModifier>>,
    /// Delta formats the generator is permitted to emit. Only `Bsdiff` is
    /// ever produced by this engine (`FileByFile` is reserved, spec.md §9),
    /// but the field exists so a caller can assert their expectation.
    pub allowed_delta_formats: Vec<DeltaFormat>,
    pub cancel: CancelToken,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            modifiers: Vec::new(),
            allowed_delta_formats: vec![DeltaFormat::Bsdiff],
            cancel: CancelToken::new(),
        }
    }
}

/// Options for `apply_delta`. Defaulting gives the two-argument overload
/// from spec.md §6 (`applyDelta(oldPath, patchIn, newOut)`); setting
/// `temp_dir` gives the three-argument overload.
pub struct ApplyOptions {
    /// Directory the delta-friendly old blob is staged into (spec.md §5
    /// "Shared resources": exclusively owned by one apply call, names
    /// random, unlinked on success or failure). `None` uses the system
    /// temp directory via `tempfile`'s default.
    pub temp_dir: Option<PathBuf>,
    pub cancel: CancelToken,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            temp_dir: None,
            cancel: CancelToken::new(),
        }
    }
}
