//! Normalized backend: one relational row per entity, each child carrying a
//! foreign key to its parent's id.

mod answers;
mod grades;
mod submissions;

pub use answers::TablesAnswerRepository;
pub use grades::TablesGradeRepository;
pub use submissions::TablesSubmissionRepository;
