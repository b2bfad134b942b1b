//! Candidate records returned by directory searches.
//!
//! These are transient: the resolver copies what it needs into the
//! organiser record and drops the rest.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Institution {
    /// Directory URI, e.g. `https://openalex.org/I4210147216`.
    pub id: String,
    pub display_name: String,
    pub ror: Option<String>,
    pub country_code: Option<String>,
    /// Directory institution type (`education`, `company`, …).
    pub kind: Option<String>,
}

impl Institution {
    /// Short key (`I4210147216`) used in directory filters.
    pub fn short_id(&self) -> &str {
        self.id.rsplit('/').next().unwrap_or(&self.id)
    }
}

/// One institution in an author's affiliation history.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AffiliationEntry {
    pub institution_name: String,
    pub institution_type: Option<String>,
    pub ror: Option<String>,
    pub country_code: Option<String>,
    /// Years the author published under this institution. Empty when unknown.
    pub years: Vec<i32>,
}

impl AffiliationEntry {
    /// Smallest distance between `year` and an active year; `None` without years.
    pub fn min_year_gap(&self, year: i32) -> Option<u32> {
        self.years.iter().map(|y| y.abs_diff(year)).min()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CandidateAuthor {
    /// Directory URI of the author.
    pub id: String,
    pub display_name: String,
    pub display_name_alternatives: Vec<String>,
    pub works_count: u64,
    pub orcid: Option<String>,
    /// Affiliation history, most recent first as reported by the directory.
    pub affiliations: Vec<AffiliationEntry>,
}

impl CandidateAuthor {
    /// Names to compare against an extracted organiser name: the alternates,
    /// or the display name when the directory lists none.
    pub fn comparable_names(&self) -> Vec<&str> {
        if self.display_name_alternatives.is_empty() {
            vec![self.display_name.as_str()]
        } else {
            self.display_name_alternatives.iter().map(String::as_str).collect()
        }
    }
}
