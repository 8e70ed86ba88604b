pub mod payload;
pub mod qdrant;
pub mod query;

mod error;

pub use error::{Error, Result};
pub use query::{FusionMethod, HybridQuery, Lane, LaneInput};
