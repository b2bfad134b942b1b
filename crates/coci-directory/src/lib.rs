//! coci-directory: person/institution directory lookups.
//!
//! The organiser resolver only sees the [`Directory`] trait; [`OpenAlexClient`]
//! is the production implementation. Responses are converted into the small
//! candidate model in [`models`] right at the boundary.

pub mod error;
pub mod models;
pub mod openalex;

use async_trait::async_trait;

pub use error::{DirectoryError, Result};
pub use models::{AffiliationEntry, CandidateAuthor, Institution};
pub use openalex::OpenAlexClient;

/// Author and institution search against a bibliographic directory.
///
/// Results come back in the directory's relevance order.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Institutions matching free text (an affiliation string).
    async fn search_institutions(&self, query: &str) -> Result<Vec<Institution>>;

    /// Authors matching a person name.
    async fn search_authors(&self, name: &str) -> Result<Vec<CandidateAuthor>>;

    /// Authors matching a person name who have been affiliated with `institution_id`.
    async fn search_authors_in_institution(
        &self,
        name: &str,
        institution_id: &str,
    ) -> Result<Vec<CandidateAuthor>>;
}
