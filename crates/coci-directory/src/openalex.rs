//! OpenAlex directory client.
//!
//! API: https://api.openalex.org/{institutions,authors}?search=…
//! Polite pool: pass `mailto` (see OpenAlex etiquette)

use async_trait::async_trait;
use coci_common::config::DirectoryConfig;
use coci_common::sandbox::SandboxClient;
use tracing::{debug, instrument};

use crate::models::{AffiliationEntry, CandidateAuthor, Institution};
use crate::{Directory, DirectoryError, Result};

pub struct OpenAlexClient {
    client: SandboxClient,
    base_url: String,
    mailto: Option<String>,
    per_page: usize,
}

impl OpenAlexClient {
    pub fn new(cfg: &DirectoryConfig) -> Result<Self> {
        let mut client = SandboxClient::new()?;
        client.allow_base_url(&cfg.base_url)?;
        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            mailto: cfg.mailto.clone().filter(|m| !m.trim().is_empty()),
            per_page: cfg.per_page.clamp(1, 200),
        })
    }

    /// GET `{base}/{entity}` and return the `results` array.
    async fn fetch_results(
        &self,
        entity: &str,
        search: &str,
        filter: Option<String>,
    ) -> Result<Vec<serde_json::Value>> {
        let url = format!("{}/{}", self.base_url, entity);
        let mut params: Vec<(&str, String)> = vec![
            ("search", search.to_string()),
            ("per-page", self.per_page.to_string()),
        ];
        if let Some(filter) = filter {
            params.push(("filter", filter));
        }
        if let Some(mailto) = &self.mailto {
            params.push(("mailto", mailto.clone()));
        }

        let resp = self.client.get(&url)?.query(&params).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(DirectoryError::Api { status: status.as_u16(), message });
        }

        let body: serde_json::Value = resp.json().await?;
        body["results"]
            .as_array()
            .cloned()
            .ok_or_else(|| DirectoryError::Decode(format!("{entity} response has no results array")))
    }
}

#[async_trait]
impl Directory for OpenAlexClient {
    #[instrument(skip(self))]
    async fn search_institutions(&self, query: &str) -> Result<Vec<Institution>> {
        let results = self.fetch_results("institutions", query, None).await?;
        debug!(n = results.len(), "OpenAlex institution results");
        Ok(results.iter().filter_map(institution_from_json).collect())
    }

    #[instrument(skip(self))]
    async fn search_authors(&self, name: &str) -> Result<Vec<CandidateAuthor>> {
        let results = self.fetch_results("authors", name, None).await?;
        debug!(n = results.len(), "OpenAlex author results");
        Ok(results.iter().filter_map(author_from_json).collect())
    }

    #[instrument(skip(self))]
    async fn search_authors_in_institution(
        &self,
        name: &str,
        institution_id: &str,
    ) -> Result<Vec<CandidateAuthor>> {
        let short_id = institution_id.rsplit('/').next().unwrap_or(institution_id);
        let filter = format!("affiliations.institution.id:{short_id}");
        let results = self.fetch_results("authors", name, Some(filter)).await?;
        debug!(n = results.len(), "OpenAlex filtered author results");
        Ok(results.iter().filter_map(author_from_json).collect())
    }
}

// ── Conversion ─────────────────────────────────────────────────────────────

fn non_empty(v: &serde_json::Value) -> Option<String> {
    v.as_str().map(str::trim).filter(|s| !s.is_empty()).map(String::from)
}

/// Records without an id are dropped.
fn institution_from_json(inst: &serde_json::Value) -> Option<Institution> {
    Some(Institution {
        id: non_empty(&inst["id"])?,
        display_name: non_empty(&inst["display_name"]).unwrap_or_default(),
        ror: non_empty(&inst["ror"]).or_else(|| non_empty(&inst["ids"]["ror"])),
        country_code: non_empty(&inst["country_code"]),
        kind: non_empty(&inst["type"]),
    })
}

fn history_entry(inst: &serde_json::Value, years: Vec<i32>) -> AffiliationEntry {
    AffiliationEntry {
        institution_name: non_empty(&inst["display_name"]).unwrap_or_default(),
        institution_type: non_empty(&inst["type"]),
        ror: non_empty(&inst["ror"]),
        country_code: non_empty(&inst["country_code"]),
        years,
    }
}

/// Records without an id are dropped. History comes from `affiliations`
/// (with years); when that is empty, from `last_known_institutions` (without).
fn author_from_json(author: &serde_json::Value) -> Option<CandidateAuthor> {
    let empty = Vec::new();

    let mut affiliations: Vec<AffiliationEntry> = author["affiliations"]
        .as_array()
        .unwrap_or(&empty)
        .iter()
        .map(|aff| {
            let years = aff["years"]
                .as_array()
                .unwrap_or(&empty)
                .iter()
                .filter_map(|y| y.as_i64())
                .map(|y| y as i32)
                .collect();
            history_entry(&aff["institution"], years)
        })
        .collect();

    if affiliations.is_empty() {
        affiliations = author["last_known_institutions"]
            .as_array()
            .unwrap_or(&empty)
            .iter()
            .map(|inst| history_entry(inst, Vec::new()))
            .collect();
    }

    Some(CandidateAuthor {
        id: non_empty(&author["id"])?,
        display_name: non_empty(&author["display_name"]).unwrap_or_default(),
        display_name_alternatives: author["display_name_alternatives"]
            .as_array()
            .unwrap_or(&empty)
            .iter()
            .filter_map(non_empty)
            .collect(),
        works_count: author["works_count"].as_u64().unwrap_or(0),
        orcid: non_empty(&author["orcid"]).or_else(|| non_empty(&author["ids"]["orcid"])),
        affiliations,
    })
}
