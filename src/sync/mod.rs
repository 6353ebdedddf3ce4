//! Cross-backend correlation: business-key matching, lazy backfill of missing
//! counterparts, and reporting of mirror writes that had to be skipped.

pub(crate) mod chain;
pub mod diagnostics;
pub mod matching;

pub use diagnostics::{
    MirrorDiagnostics, MirrorEvent, MirroredEntity, SkipReason, TracingDiagnostics,
};
pub use matching::{match_one, pair_by_key, BusinessKey, Counterpart, Pairing};
