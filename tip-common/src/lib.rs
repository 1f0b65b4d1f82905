// TIP finder common library
// Shared types, errors, file naming and wire primitives

pub mod error;
pub mod file_naming;
pub mod types;
pub mod varint;

// Re-export commonly used types
pub use error::{ErrorKind, Result, TipError};
pub use file_naming::{run_work_dir, with_suffix, SampleFiles};
pub use types::{tip_version, HitCountRecord, Rank, Sample};
pub use types::{
    COORDINATOR_RANK, LINES_PER_READ, REPORTING_RANK, TIP_VER_BUGFIX, TIP_VER_MAJOR,
    TIP_VER_MINOR, UNIQUE_HIT_LIMIT,
};

// Re-export codec primitives
pub use varint::{put_str, put_varint, read_string, read_varint};
