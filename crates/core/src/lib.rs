pub mod artifact;
pub mod error;
pub mod outcome;
pub mod retention;

pub use artifact::{artifact_file_name, parse_artifact_name, Artifact};
pub use error::EngineError;
pub use outcome::{BackupOutcome, ReportSummary};
pub use retention::eviction_candidates;
