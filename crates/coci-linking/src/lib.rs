//! coci-linking: entity resolution and record linkage.
//!
//! Stages, in pipeline order:
//!   organiser::OrganiserResolver: directory lookup, disambiguation, affiliation back-fill
//!   conference::ConferenceLinker: conference series → DBLP / AIDA / ConfIDent
//!   topics::TopicLinker: raw topics → canonical topic labels
//!
//! Shared pieces: `similarity` (string scores) and `snapshot` (authority
//! corpora with a flat vector index).

pub mod conference;
pub mod error;
pub mod organiser;
pub mod similarity;
pub mod snapshot;
pub mod topics;

pub use conference::{dataset_url, ConferenceLinker};
pub use error::{LinkingError, Result};
pub use organiser::{rank_candidates, OrganiserResolver, RankedCandidate};
pub use snapshot::{AuthorityStore, FlatIndex, Snapshot, SnapshotError};
pub use topics::TopicLinker;
