//! coci-pipeline: from Call-for-Papers text to a linked Event Record.
//!
//! [`CfpPipeline`] owns the configuration and the external services
//! (text generation, directory, embeddings) and exposes the two entry points:
//! [`CfpPipeline::process_call_for_papers`] for fresh text and
//! [`CfpPipeline::resolve_cached`] for a record persisted by [`ResultCache`].

pub mod cache;
pub mod error;
pub mod extraction;
pub mod pipeline;
pub mod refine;
pub mod schema;

pub use cache::{cache_key, ResultCache};
pub use error::{PipelineError, Result};
pub use extraction::{parse_extraction, Extractor};
pub use pipeline::CfpPipeline;
pub use refine::{affiliation_ratio, normalize_tracks, refine_record, screen_affiliations};
