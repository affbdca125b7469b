//! File-by-file ZIP/JAR/APK delta generation and application.
//!
//! Builds on `zipdelta-zip`'s structural parser to run a DEFLATE
//! reproducibility oracle, a pre-diff planner, a delta-friendly blob
//! builder, and a BSDIFF engine, wrapping the result in a patch container
//! that an applier can replay to reproduce the new archive byte-for-byte.

pub mod apply;
pub mod blob;
pub mod bsdiff;
pub mod container;
pub mod deflate;
pub mod error;
pub mod generate;
pub mod options;
pub mod plan;
pub mod recompress;

pub use apply::apply_delta;
pub use container::{DeltaDescriptor, DeltaFormat, PatchContainer};
pub use deflate::{CompatibilityWindow, DeflateParams, Strategy};
pub use error::{Error, Result};
pub use generate::generate_delta;
pub use options::{ApplyOptions, GenerateOptions};
pub use plan::{
    ArchiveEntrySource, EntrySource, MinUncompressedSizeModifier, Plan, PlanModifier, PlanReason,
    PreDiffPlanEntry, UncompressOption,
};
pub use recompress::RecompressionStream;
