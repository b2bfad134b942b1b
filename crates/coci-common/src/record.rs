//! Core record types produced by the extraction and linking pipeline.
//! These serialize to the plain nested key/value structure persisted by the
//! result cache and consumed by renderers/exporters.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{CociError, Result};

// ---------------------------------------------------------------------------
// Conference datasets
// ---------------------------------------------------------------------------

/// The three conference-series registries a CfP is linked against.
///
/// Declaration order is the tie-break priority used by the conference linker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dataset {
    Dblp,
    Aida,
    Confident,
}

impl Dataset {
    /// All datasets, highest tie-break priority first.
    pub const ALL: [Dataset; 3] = [Dataset::Dblp, Dataset::Aida, Dataset::Confident];

    /// Key used for this dataset in the serialized Event Record.
    pub fn label(&self) -> &'static str {
        match self {
            Dataset::Dblp      => "DBLP",
            Dataset::Aida      => "AIDA",
            Dataset::Confident => "ConfIDent",
        }
    }

    /// Key used in snapshot files and configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            Dataset::Dblp      => "dblp",
            Dataset::Aida      => "aida",
            Dataset::Confident => "confident",
        }
    }
}

impl std::fmt::Display for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Dataset Match
// ---------------------------------------------------------------------------

/// A fully populated link to a conference-series record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetLink {
    pub name: String,
    pub id: String,
    pub url: String,
}

impl DatasetLink {
    /// Build a link; `None` unless all three parts are non-empty.
    pub fn new(name: impl Into<String>, id: impl Into<String>, url: impl Into<String>) -> Option<Self> {
        let (name, id, url) = (name.into(), id.into(), url.into());
        if name.trim().is_empty() || id.trim().is_empty() || url.trim().is_empty() {
            return None;
        }
        Some(Self { name, id, url })
    }
}

/// Outcome of linking an event against one dataset.
///
/// Serialized as `{"name", "id", "url"}` when matched and `{}` otherwise.
/// A partially populated object deserializes to `NoMatch`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DatasetMatch {
    #[default]
    NoMatch,
    Matched(DatasetLink),
}

impl DatasetMatch {
    pub fn is_match(&self) -> bool {
        matches!(self, DatasetMatch::Matched(_))
    }

    pub fn link(&self) -> Option<&DatasetLink> {
        match self {
            DatasetMatch::Matched(link) => Some(link),
            DatasetMatch::NoMatch       => None,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.link().map(|l| l.id.as_str())
    }
}

impl From<Option<DatasetLink>> for DatasetMatch {
    fn from(link: Option<DatasetLink>) -> Self {
        match link {
            Some(link) => DatasetMatch::Matched(link),
            None       => DatasetMatch::NoMatch,
        }
    }
}

#[derive(Default, Serialize, Deserialize)]
struct DatasetMatchRepr {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
}

impl Serialize for DatasetMatch {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let repr = match self {
            DatasetMatch::NoMatch => DatasetMatchRepr::default(),
            DatasetMatch::Matched(link) => DatasetMatchRepr {
                name: Some(link.name.clone()),
                id:   Some(link.id.clone()),
                url:  Some(link.url.clone()),
            },
        };
        repr.serialize(serializer)
    }
}

/// Every persisted shape a dataset match has taken: an object, a bare string
/// (legacy `""` for "no match") or null.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredDatasetMatch {
    Object(DatasetMatchRepr),
    Text(String),
}

impl<'de> Deserialize<'de> for DatasetMatch {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let repr = match Option::<StoredDatasetMatch>::deserialize(deserializer)? {
            Some(StoredDatasetMatch::Object(repr)) => repr,
            Some(StoredDatasetMatch::Text(_)) | None => return Ok(DatasetMatch::NoMatch),
        };
        let link = match (repr.name, repr.id, repr.url) {
            (Some(name), Some(id), Some(url)) => DatasetLink::new(name, id, url),
            _ => None,
        };
        Ok(link.into())
    }
}

// ---------------------------------------------------------------------------
// Organiser Record
// ---------------------------------------------------------------------------

/// Read an optional link, treating `""` (the legacy "unresolved" value) as absent.
fn blank_as_none<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<String>, D::Error> {
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|v| !v.trim().is_empty()))
}

/// Where an organiser's affiliation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AffiliationProvenance {
    #[default]
    #[serde(alias = "")]
    Unset,
    ExtractedFromText,
    DerivedFromDirectory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganiserRecord {
    pub organiser_name: String,
    #[serde(default)]
    pub organiser_affiliation: String,
    #[serde(default)]
    pub organiser_country: String,
    #[serde(default)]
    pub track_name: String,
    #[serde(default)]
    pub affiliation_provenance: AffiliationProvenance,
    #[serde(default)]
    pub verified: bool,
    /// Canonical display name in the directory.
    #[serde(default, deserialize_with = "blank_as_none")]
    pub openalex_name: Option<String>,
    /// Directory URI of the matched author.
    #[serde(default, deserialize_with = "blank_as_none")]
    pub openalex_page: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub orcid: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub affiliation_ror: Option<String>,
}

impl OrganiserRecord {
    /// A freshly extracted organiser: provenance is text, nothing verified.
    pub fn extracted(
        name: impl Into<String>,
        affiliation: impl Into<String>,
        country: impl Into<String>,
        track: impl Into<String>,
    ) -> Self {
        Self {
            organiser_name: name.into(),
            organiser_affiliation: affiliation.into(),
            organiser_country: country.into(),
            track_name: track.into(),
            affiliation_provenance: AffiliationProvenance::ExtractedFromText,
            verified: false,
            openalex_name: None,
            openalex_page: None,
            orcid: None,
            affiliation_ror: None,
        }
    }

    pub fn has_affiliation(&self) -> bool {
        !self.organiser_affiliation.trim().is_empty()
    }

    /// Drop every affiliation-derived field so resolution rebuilds it from the directory.
    pub fn clear_affiliation(&mut self) {
        self.organiser_affiliation.clear();
        self.organiser_country.clear();
        self.affiliation_ror = None;
        self.affiliation_provenance = AffiliationProvenance::Unset;
    }

    pub fn clear_directory_links(&mut self) {
        self.openalex_name = None;
        self.openalex_page = None;
        self.orcid = None;
        self.affiliation_ror = None;
        self.verified = false;
    }

    pub fn is_resolved(&self) -> bool {
        self.openalex_page.is_some()
    }

    /// A ROR is only meaningful next to an affiliation name.
    pub fn check_invariants(&self) -> Result<()> {
        let has_ror = self.affiliation_ror.as_deref().is_some_and(|r| !r.is_empty());
        if has_ror && !self.has_affiliation() {
            return Err(CociError::Invariant(format!(
                "organiser '{}' has affiliation_ror without organiser_affiliation",
                self.organiser_name
            )));
        }
        if self.track_name.trim().is_empty() {
            return Err(CociError::Invariant(format!(
                "organiser '{}' has an empty track_name",
                self.organiser_name
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Event Record
// ---------------------------------------------------------------------------

/// Topic → accepted canonical topic labels, in nearest-neighbour order.
pub type EnhancedTopics = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(default)]
    pub event_name: String,
    #[serde(default)]
    pub conference_series: String,
    #[serde(default)]
    pub event_acronym: String,
    #[serde(default)]
    pub colocated_with: String,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub organisers: Vec<OrganiserRecord>,
    #[serde(rename = "DBLP", default)]
    pub dblp: DatasetMatch,
    #[serde(rename = "AIDA", default)]
    pub aida: DatasetMatch,
    #[serde(rename = "ConfIDent", default)]
    pub confident: DatasetMatch,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enhanced_topics: Option<EnhancedTopics>,
}

impl EventRecord {
    pub fn dataset_match(&self, dataset: Dataset) -> &DatasetMatch {
        match dataset {
            Dataset::Dblp      => &self.dblp,
            Dataset::Aida      => &self.aida,
            Dataset::Confident => &self.confident,
        }
    }

    pub fn set_dataset_match(&mut self, dataset: Dataset, m: DatasetMatch) {
        match dataset {
            Dataset::Dblp      => self.dblp = m,
            Dataset::Aida      => self.aida = m,
            Dataset::Confident => self.confident = m,
        }
    }

    pub fn clear_dataset_matches(&mut self) {
        for dataset in Dataset::ALL {
            self.set_dataset_match(dataset, DatasetMatch::NoMatch);
        }
    }

    /// Validate the record-level invariants before handing it to a caller.
    pub fn check_invariants(&self) -> Result<()> {
        for organiser in &self.organisers {
            organiser.check_invariants()?;
        }
        Ok(())
    }
}
