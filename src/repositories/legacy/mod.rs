//! Legacy backend: a quiz submission is one `activity_log` row; its answers
//! and grades are maps keyed by question id stored as `activity_meta` entries
//! of that row.
//!
//! Entries inside a submission are addressed by question id, so the
//! backend-local id of a legacy [`Answer`](crate::db::models::Answer) or
//! [`Grade`](crate::db::models::Grade) is its question id, and a grade's
//! `answer_id` equals that same question id. The metadata keeps no per-entry
//! timestamps; answers and grades report the owning row's timestamps.

mod answers;
mod grades;
mod meta;
mod submissions;

pub use answers::LegacyAnswerRepository;
pub use grades::LegacyGradeRepository;
pub use submissions::LegacySubmissionRepository;
