pub mod candidate;
pub mod citation;
pub mod coverage;
pub mod filter;
pub mod merge;
pub mod mode;
pub mod query;
pub mod text;
pub mod vector;

pub use candidate::{
	Candidate, ContentType, HitPayload, LineSpan, Provenance, RankedCandidate, RawHit, ScoreSource,
};
pub use citation::{Citation, CitationConfidence};
pub use coverage::{CoverageRule, FinalSelection, TypeCounts};
pub use filter::PayloadFilter;
pub use merge::{MergeOutcome, RejectedHit};
pub use mode::TaskMode;
pub use query::{ExpansionTemplates, NormalizedQuery};
pub use vector::SparseVector;
