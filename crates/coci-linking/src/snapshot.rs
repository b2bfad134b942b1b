//! Authority snapshots: static reference corpora with an exact vector index.
//!
//! On-disk format (JSON, one file per dataset):
//!
//! ```json
//! {
//!   "dataset":    "dblp",
//!   "model":      "sentence-transformers/all-MiniLM-L6-v2",
//!   "sentences":  ["International Semantic Web Conference", …],
//!   "embeddings": [[0.013, …], …],
//!   "ids":        {"International Semantic Web Conference": "semweb", …},
//!   "cross_refs": {"aida": {"semweb": "ISWC"}, "confident": {…}}
//! }
//! ```
//!
//! `embeddings[i]` belongs to `sentences[i]`. `cross_refs[other][own_id]`
//! translates this dataset's id into the other dataset's id.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use coci_common::config::SnapshotConfig;
use coci_common::Dataset;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot {} unreadable: {source}", path.display())]
    Io { path: PathBuf, source: std::io::Error },

    #[error("snapshot {} is not valid JSON: {source}", path.display())]
    Parse { path: PathBuf, source: serde_json::Error },

    #[error("snapshot '{name}' is corrupt: {reason}")]
    Corrupt { name: String, reason: String },

    #[error("query has dimension {got}, index has {expected}")]
    DimensionMismatch { expected: usize, got: usize },
}

pub type Result<T> = std::result::Result<T, SnapshotError>;

// ── Flat index ───────────────────────────────────────────────────────────────

/// A nearest-neighbour hit: row position and squared L2 distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbour {
    pub position: usize,
    pub distance: f32,
}

/// Exact brute-force index over row-major vectors. Distance is squared L2.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dim: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dim: usize) -> Self {
        Self { dim, data: Vec::new() }
    }

    pub fn dim(&self) -> usize { self.dim }

    pub fn len(&self) -> usize {
        if self.dim == 0 { 0 } else { self.data.len() / self.dim }
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn add(&mut self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dim {
            return Err(SnapshotError::DimensionMismatch { expected: self.dim, got: vector.len() });
        }
        self.data.extend_from_slice(vector);
        Ok(())
    }

    /// The `k` closest rows, nearest first. Equal distances keep insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbour>> {
        if query.len() != self.dim {
            return Err(SnapshotError::DimensionMismatch { expected: self.dim, got: query.len() });
        }
        if self.dim == 0 {
            return Ok(Vec::new());
        }
        let mut hits: Vec<Neighbour> = self
            .data
            .chunks_exact(self.dim)
            .enumerate()
            .map(|(position, row)| Neighbour { position, distance: squared_l2(row, query) })
            .collect();
        // stable sort: ties stay in insertion order
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(k);
        Ok(hits)
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

// ── Snapshot ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SnapshotFile {
    dataset: String,
    #[serde(default)]
    model: Option<String>,
    sentences: Vec<String>,
    embeddings: Vec<Vec<f32>>,
    #[serde(default)]
    ids: HashMap<String, String>,
    #[serde(default)]
    cross_refs: HashMap<String, HashMap<String, String>>,
}

/// A hit accepted under a distance cut-off.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotHit<'a> {
    pub sentence: &'a str,
    pub id: Option<&'a str>,
    pub distance: f32,
}

#[derive(Debug, Clone)]
pub struct Snapshot {
    name: String,
    model: Option<String>,
    sentences: Vec<String>,
    index: FlatIndex,
    ids: HashMap<String, String>,
    names_by_id: HashMap<String, String>,
    cross_refs: HashMap<String, HashMap<String, String>>,
}

impl Snapshot {
    /// Build and validate a snapshot from its parts.
    pub fn build(
        name: impl Into<String>,
        sentences: Vec<String>,
        embeddings: Vec<Vec<f32>>,
        ids: HashMap<String, String>,
        cross_refs: HashMap<String, HashMap<String, String>>,
    ) -> Result<Self> {
        let name = name.into();
        let corrupt = |reason: String| SnapshotError::Corrupt { name: name.clone(), reason };

        if sentences.len() != embeddings.len() {
            return Err(corrupt(format!(
                "{} sentences but {} embeddings",
                sentences.len(),
                embeddings.len()
            )));
        }
        let dim = embeddings.first().map_or(0, Vec::len);
        if !sentences.is_empty() && dim == 0 {
            return Err(corrupt("zero-dimensional embeddings".to_string()));
        }

        let mut index = FlatIndex::new(dim);
        for (row, vector) in embeddings.iter().enumerate() {
            index.add(vector).map_err(|_| {
                corrupt(format!("row {row} has dimension {}, expected {dim}", vector.len()))
            })?;
        }

        // first sentence carrying an id names it
        let mut names_by_id = HashMap::new();
        for sentence in &sentences {
            if let Some(id) = ids.get(sentence) {
                names_by_id.entry(id.clone()).or_insert_with(|| sentence.clone());
            }
        }

        Ok(Self { name, model: None, sentences, index, ids, names_by_id, cross_refs })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|source| SnapshotError::Io { path: path.to_path_buf(), source })?;
        let file: SnapshotFile = serde_json::from_str(&raw)
            .map_err(|source| SnapshotError::Parse { path: path.to_path_buf(), source })?;

        let mut snapshot =
            Self::build(file.dataset, file.sentences, file.embeddings, file.ids, file.cross_refs)?;
        snapshot.model = file.model;
        debug!(
            snapshot = %snapshot.name,
            n = snapshot.len(),
            dim = snapshot.index.dim(),
            "Snapshot loaded"
        );
        Ok(snapshot)
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn model(&self) -> Option<&str> { self.model.as_deref() }

    pub fn len(&self) -> usize { self.sentences.len() }

    /// Vector length the snapshot was indexed with; 0 when empty.
    pub fn dim(&self) -> usize { self.index.dim() }

    pub fn is_empty(&self) -> bool { self.sentences.is_empty() }

    /// Up to `k` nearest sentences with distance ≤ `max_distance`, nearest first.
    pub fn nearest(&self, query: &[f32], k: usize, max_distance: f32) -> Result<Vec<SnapshotHit<'_>>> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .index
            .search(query, k)?
            .into_iter()
            .filter(|n| n.distance <= max_distance)
            .map(|n| {
                let sentence = self.sentences[n.position].as_str();
                SnapshotHit { sentence, id: self.id_for(sentence), distance: n.distance }
            })
            .collect())
    }

    pub fn id_for(&self, sentence: &str) -> Option<&str> {
        self.ids.get(sentence).map(String::as_str).filter(|id| !id.is_empty())
    }

    /// Reference sentence carrying `id`.
    pub fn name_for_id(&self, id: &str) -> Option<&str> {
        self.names_by_id.get(id).map(String::as_str)
    }

    /// This snapshot's `own_id` translated into `other`'s id space.
    pub fn cross_ref(&self, other: &str, own_id: &str) -> Option<&str> {
        self.cross_refs
            .get(other)?
            .get(own_id)
            .map(String::as_str)
            .filter(|id| !id.is_empty())
    }
}

// ── Store ────────────────────────────────────────────────────────────────────

/// The snapshots loaded for one pipeline run. Missing ones are `None`.
#[derive(Debug, Clone, Default)]
pub struct AuthorityStore {
    dblp: Option<Snapshot>,
    aida: Option<Snapshot>,
    confident: Option<Snapshot>,
    topics: Option<Snapshot>,
}

impl AuthorityStore {
    /// Load every snapshot named in the configuration.
    ///
    /// Unloadable files are logged and skipped unless `cfg.required` is set,
    /// in which case the first failure is returned.
    pub fn load(cfg: &SnapshotConfig) -> Result<Self> {
        let load_one = |file: &str| -> Result<Option<Snapshot>> {
            let path = cfg.path_for(file);
            match Snapshot::from_file(&path) {
                Ok(snapshot) => Ok(Some(snapshot)),
                Err(e) if cfg.required => Err(e),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Snapshot missing, stage will stay empty");
                    Ok(None)
                }
            }
        };

        let store = Self {
            dblp: load_one(&cfg.dblp)?,
            aida: load_one(&cfg.aida)?,
            confident: load_one(&cfg.confident)?,
            topics: load_one(&cfg.topics)?,
        };
        info!(
            dblp = store.dblp.is_some(),
            aida = store.aida.is_some(),
            confident = store.confident.is_some(),
            topics = store.topics.is_some(),
            "Authority snapshots ready"
        );
        Ok(store)
    }

    pub fn with_conference(mut self, dataset: Dataset, snapshot: Snapshot) -> Self {
        match dataset {
            Dataset::Dblp      => self.dblp = Some(snapshot),
            Dataset::Aida      => self.aida = Some(snapshot),
            Dataset::Confident => self.confident = Some(snapshot),
        }
        self
    }

    pub fn with_topics(mut self, snapshot: Snapshot) -> Self {
        self.topics = Some(snapshot);
        self
    }

    pub fn conference(&self, dataset: Dataset) -> Option<&Snapshot> {
        match dataset {
            Dataset::Dblp      => self.dblp.as_ref(),
            Dataset::Aida      => self.aida.as_ref(),
            Dataset::Confident => self.confident.as_ref(),
        }
    }

    pub fn topics(&self) -> Option<&Snapshot> {
        self.topics.as_ref()
    }

    pub fn has_conferences(&self) -> bool {
        Dataset::ALL.iter().any(|d| self.conference(*d).is_some())
    }

    /// True when some loaded snapshot cannot be searched with `dim`-long queries.
    pub fn has_dimension_mismatch(&self, dim: usize) -> bool {
        [&self.dblp, &self.aida, &self.confident, &self.topics]
            .into_iter()
            .flatten()
            .any(|snapshot| !snapshot.is_empty() && snapshot.dim() != dim)
    }

    /// Unload every snapshot whose vectors are not `dim` long, leaving its
    /// stage empty. With `required` the first such snapshot is an error.
    pub fn retain_dimension(&mut self, dim: usize, required: bool) -> Result<()> {
        for slot in [&mut self.dblp, &mut self.aida, &mut self.confident, &mut self.topics] {
            let Some((name, indexed)) = slot
                .as_ref()
                .filter(|snapshot| !snapshot.is_empty() && snapshot.dim() != dim)
                .map(|snapshot| (snapshot.name().to_string(), snapshot.dim()))
            else {
                continue;
            };
            if required {
                return Err(SnapshotError::Corrupt {
                    name,
                    reason: format!("indexed with dimension {indexed}, encoder produces {dim}"),
                });
            }
            warn!(snapshot = %name, indexed, query = dim, "Snapshot dimension differs from encoder, stage will stay empty");
            *slot = None;
        }
        Ok(())
    }

    /// Warn about snapshots indexed with a different model than the query encoder.
    pub fn check_model(&self, model: &str) {
        let all = [&self.dblp, &self.aida, &self.confident, &self.topics];
        for snapshot in all.into_iter().flatten() {
            if let Some(indexed_with) = snapshot.model() {
                if indexed_with != model {
                    warn!(
                        snapshot = %snapshot.name(),
                        indexed_with,
                        query_model = model,
                        "Snapshot was indexed with a different embedding model"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ids(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_flat_index_orders_by_distance() {
        let mut index = FlatIndex::new(2);
        index.add(&[1.0, 0.0]).unwrap();
        index.add(&[0.0, 1.0]).unwrap();
        index.add(&[0.6, 0.8]).unwrap();

        let hits = index.search(&[0.0, 1.0], 3).unwrap();
        assert_eq!(hits.iter().map(|h| h.position).collect::<Vec<_>>(), vec![1, 2, 0]);
        assert_eq!(hits[0].distance, 0.0);
        assert!((hits[2].distance - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_flat_index_ties_keep_insertion_order() {
        let mut index = FlatIndex::new(1);
        for v in [2.0, 0.0, 2.0, 0.0] {
            index.add(&[v]).unwrap();
        }
        let hits = index.search(&[1.0], 4).unwrap();
        assert_eq!(hits.iter().map(|h| h.position).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_flat_index_rejects_wrong_dimension() {
        let mut index = FlatIndex::new(3);
        assert!(matches!(index.add(&[1.0]), Err(SnapshotError::DimensionMismatch { .. })));
        assert!(index.search(&[1.0, 2.0], 1).is_err());
    }

    #[test]
    fn test_build_rejects_ragged_embeddings() {
        let err = Snapshot::build(
            "dblp",
            vec!["A".to_string(), "B".to_string()],
            vec![vec![1.0, 0.0], vec![1.0]],
            HashMap::new(),
            HashMap::new(),
        )
        .unwrap_err();
        assert!(matches!(err, SnapshotError::Corrupt { .. }));

        let err = Snapshot::build("dblp", vec!["A".to_string()], vec![], HashMap::new(), HashMap::new())
            .unwrap_err();
        assert!(matches!(err, SnapshotError::Corrupt { .. }));
    }

    #[test]
    fn test_nearest_applies_cutoff_and_maps_ids() {
        let snap = Snapshot::build(
            "dblp",
            vec!["International Semantic Web Conference".to_string(), "Web Conference".to_string()],
            vec![vec![1.0, 0.0], vec![0.0, 1.0]],
            ids(&[("International Semantic Web Conference", "semweb")]),
            HashMap::new(),
        )
        .unwrap();

        let hits = snap.nearest(&[1.0, 0.0], 2, 0.4).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].sentence, "International Semantic Web Conference");
        assert_eq!(hits[0].id, Some("semweb"));

        let hits = snap.nearest(&[0.0, 1.0], 1, 0.4).unwrap();
        assert_eq!(hits[0].id, None);
        assert_eq!(snap.name_for_id("semweb"), Some("International Semantic Web Conference"));
    }

    fn vectors(name: &str, dim: usize) -> Snapshot {
        Snapshot::build(name, vec!["A".to_string()], vec![vec![1.0; dim]], HashMap::new(), HashMap::new())
            .unwrap()
    }

    #[test]
    fn test_retain_dimension_unloads_mismatched_snapshots() {
        let mut store = AuthorityStore::default()
            .with_conference(Dataset::Dblp, vectors("dblp", 2))
            .with_conference(Dataset::Aida, vectors("aida", 3))
            .with_topics(vectors("topics", 3));
        assert!(store.has_dimension_mismatch(3));

        store.retain_dimension(3, false).unwrap();
        assert!(store.conference(Dataset::Dblp).is_none());
        assert!(store.conference(Dataset::Aida).is_some());
        assert!(store.topics().is_some());
        assert!(!store.has_dimension_mismatch(3));
    }

    #[test]
    fn test_retain_dimension_required_is_error() {
        let mut store = AuthorityStore::default().with_topics(vectors("topics", 2));
        let err = store.retain_dimension(3, true).unwrap_err();
        assert!(matches!(err, SnapshotError::Corrupt { ref name, .. } if name == "topics"));
        assert!(store.topics().is_some());
    }

    #[test]
    fn test_cross_ref_ignores_empty_ids() {
        let mut cross = HashMap::new();
        cross.insert("confident".to_string(), ids(&[("semweb", "ISWC"), ("www", "")]));
        let snap = Snapshot::build("dblp", vec![], vec![], HashMap::new(), cross).unwrap();
        assert_eq!(snap.cross_ref("confident", "semweb"), Some("ISWC"));
        assert_eq!(snap.cross_ref("confident", "www"), None);
        assert_eq!(snap.cross_ref("aida", "semweb"), None);
    }

    #[test]
    fn test_from_file_and_store_loading() {
        let dir = tempfile::tempdir().unwrap();
        let file = serde_json::json!({
            "dataset": "dblp",
            "model": "sentence-transformers/all-MiniLM-L6-v2",
            "sentences": ["European Semantic Web Conference"],
            "embeddings": [[0.0, 1.0]],
            "ids": {"European Semantic Web Conference": "esws"},
            "cross_refs": {"aida": {"esws": "ESWC"}}
        });
        std::fs::write(dir.path().join("dblp.json"), file.to_string()).unwrap();

        let cfg = SnapshotConfig { dir: dir.path().to_path_buf(), ..Default::default() };
        let store = AuthorityStore::load(&cfg).unwrap();
        let dblp = store.conference(Dataset::Dblp).unwrap();
        assert_eq!(dblp.model(), Some("sentence-transformers/all-MiniLM-L6-v2"));
        assert_eq!(dblp.cross_ref("aida", "esws"), Some("ESWC"));
        assert!(store.conference(Dataset::Aida).is_none());
        assert!(store.topics().is_none());
        assert!(store.has_conferences());
    }

    #[test]
    fn test_required_snapshot_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = SnapshotConfig { dir: dir.path().to_path_buf(), required: true, ..Default::default() };
        assert!(matches!(AuthorityStore::load(&cfg), Err(SnapshotError::Io { .. })));

        std::fs::write(dir.path().join("dblp.json"), "{ not json").unwrap();
        assert!(matches!(AuthorityStore::load(&cfg), Err(SnapshotError::Parse { .. })));
    }
}
