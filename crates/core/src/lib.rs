pub mod content;
pub mod doctor;
pub mod error;
pub mod extract;
pub mod locate;
pub mod model;
pub mod overwrite;
pub mod owner;
pub mod patterns;
pub mod shred;

pub use content::{ContentCapabilities, ContentCount, ContentMatcher, FileKind, TextExtractor};
pub use doctor::{collect_doctor_info, doctor_info_for, DoctorInfo};
pub use error::{ExtractionError, LocateError, Mismatch, PassError, ShredError};
pub use extract::CommandExtractor;
pub use locate::{locate, FileLocator};
pub use model::{
    BatchSummary, ContentFilter, ContentFilterKind, ContentMatch, ExcludedFile, ExclusionReason,
    FileEvent, MatchCriteria, MatchResult, MatchedFile, PassPattern, ShredConfig, ShredEvent,
    ShredEventKind, ShredMethod, ShredReport, DEFAULT_PASSES, DOD_PASS_SEQUENCE,
};
pub use patterns::{split_patterns, NameMatcher};
pub use shred::{BatchState, BatchStep, ShredEngine, ShredRunOutput};
