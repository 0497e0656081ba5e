//! Report generation, parsing and recommendation output.

pub mod discovery;
pub mod generator;
pub mod parser;
pub mod recommendation;

pub use discovery::find_latest_summary;
pub use parser::{parse_report, ParsedReport};
pub use recommendation::{Recommendation, RecommendationFiles};
