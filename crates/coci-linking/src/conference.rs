//! Conference series → DBLP / AIDA / ConfIDent.
//!
//! Each dataset proposes at most one nearest reference sentence. The proposal
//! whose name is closest (edit similarity) to the extracted series wins; the
//! other two datasets are then filled from the winner's cross-reference table,
//! so the three links always describe one identity.

use coci_common::{Dataset, DatasetLink, DatasetMatch, EventRecord, Thresholds};
use coci_embed::SentenceEmbedder;
use tracing::{debug, info, instrument};

use crate::similarity::normalized_similarity;
use crate::snapshot::AuthorityStore;
use crate::Result;

/// Public page for a dataset entry. AIDA pages are keyed by name, the others by id.
pub fn dataset_url(dataset: Dataset, name: &str, id: &str) -> String {
    match dataset {
        Dataset::Dblp => format!("https://dblp.org/streams/conf/{}", urlencoding::encode(id)),
        Dataset::Aida => format!(
            "https://w3id.org/aida/dashboard/cs/conference/{}",
            urlencoding::encode(name)
        ),
        Dataset::Confident => format!(
            "https://www.confident-conference.org/index.php/{}",
            urlencoding::encode(id)
        ),
    }
}

fn make_match(dataset: Dataset, name: &str, id: &str) -> DatasetMatch {
    DatasetLink::new(name, id, dataset_url(dataset, name, id)).into()
}

#[derive(Debug, Clone, PartialEq)]
struct Proposal {
    dataset: Dataset,
    name: String,
    id: String,
    score: f64,
}

pub struct ConferenceLinker<'a> {
    store: &'a AuthorityStore,
    embedder: &'a dyn SentenceEmbedder,
    thresholds: &'a Thresholds,
}

impl<'a> ConferenceLinker<'a> {
    pub fn new(
        store: &'a AuthorityStore,
        embedder: &'a dyn SentenceEmbedder,
        thresholds: &'a Thresholds,
    ) -> Self {
        Self { store, embedder, thresholds }
    }

    /// Set the record's three dataset matches from its `conference_series`.
    pub async fn link_record(&self, record: &mut EventRecord) -> Result<()> {
        let matches = self.link(&record.conference_series).await?;
        for (dataset, m) in matches {
            record.set_dataset_match(dataset, m);
        }
        Ok(())
    }

    /// Matches for every dataset, in `Dataset::ALL` order.
    #[instrument(skip(self))]
    pub async fn link(&self, series: &str) -> Result<[(Dataset, DatasetMatch); 3]> {
        let mut out = Dataset::ALL.map(|d| (d, DatasetMatch::NoMatch));

        let series = series.trim();
        if series.is_empty() || !self.store.has_conferences() {
            debug!("No conference series or no conference snapshots, skipping");
            return Ok(out);
        }

        let query = self.embedder.embed_one(series).await?;
        let proposals = self.propose(series, &query)?;

        let Some(winner) = pick_winner(&proposals) else {
            debug!(n_proposals = proposals.len(), "No dataset proposal resembles the series");
            return Ok(out);
        };
        info!(
            dataset = %winner.dataset,
            id = %winner.id,
            score = winner.score,
            "Conference series linked"
        );

        for (dataset, slot) in out.iter_mut() {
            *slot = if *dataset == winner.dataset {
                make_match(winner.dataset, &winner.name, &winner.id)
            } else {
                self.cross_mapped(winner, *dataset)
            };
        }
        Ok(out)
    }

    /// One nearest-neighbour proposal per loaded dataset, under the distance cut-off.
    fn propose(&self, series: &str, query: &[f32]) -> Result<Vec<Proposal>> {
        let mut proposals = Vec::new();
        for dataset in Dataset::ALL {
            let Some(snapshot) = self.store.conference(dataset) else { continue };
            let hits = snapshot.nearest(query, 1, self.thresholds.conference_max_distance)?;
            let Some(hit) = hits.first() else {
                debug!(%dataset, "No reference sentence within cut-off");
                continue;
            };
            let Some(id) = hit.id else {
                debug!(%dataset, sentence = hit.sentence, "Nearest sentence has no id");
                continue;
            };
            let score = normalized_similarity(hit.sentence, series);
            debug!(%dataset, sentence = hit.sentence, distance = hit.distance, score, "Proposal");
            proposals.push(Proposal {
                dataset,
                name: hit.sentence.to_string(),
                id: id.to_string(),
                score,
            });
        }
        Ok(proposals)
    }

    /// The winner's id translated into `target`, named by `target`'s own snapshot.
    fn cross_mapped(&self, winner: &Proposal, target: Dataset) -> DatasetMatch {
        let mapped = self
            .store
            .conference(winner.dataset)
            .and_then(|snap| snap.cross_ref(target.as_str(), &winner.id));
        let Some(target_id) = mapped else { return DatasetMatch::NoMatch };

        match self.store.conference(target).and_then(|snap| snap.name_for_id(target_id)) {
            Some(name) => make_match(target, name, target_id),
            None => {
                debug!(%target, id = target_id, "Cross-reference has no name in target snapshot");
                DatasetMatch::NoMatch
            }
        }
    }
}

/// Highest score wins; equal scores go to the earlier dataset. Nothing above zero → `None`.
fn pick_winner(proposals: &[Proposal]) -> Option<&Proposal> {
    let mut best: Option<&Proposal> = None;
    for p in proposals {
        if p.score > best.map_or(0.0, |b| b.score) {
            best = Some(p);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::Snapshot;
    use async_trait::async_trait;
    use coci_embed::EmbedError;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Embeds known strings to fixed vectors; everything else to the zero vector.
    struct TableEmbedder {
        table: HashMap<String, Vec<f32>>,
        calls: AtomicUsize,
    }

    impl TableEmbedder {
        fn new(entries: &[(&str, [f32; 2])]) -> Self {
            Self {
                table: entries.iter().map(|(k, v)| (k.to_string(), v.to_vec())).collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SentenceEmbedder for TableEmbedder {
        async fn embed(&self, texts: &[String]) -> coci_embed::Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            texts
                .iter()
                .map(|t| self.table.get(t).cloned().ok_or_else(|| EmbedError::InvalidInput(t.clone())))
                .collect()
        }

        fn model_name(&self) -> &str { "table" }
    }

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn snapshot(
        name: &str,
        rows: &[(&str, &str, [f32; 2])],
        cross: &[(&str, &[(&str, &str)])],
    ) -> Snapshot {
        Snapshot::build(
            name,
            rows.iter().map(|(s, _, _)| s.to_string()).collect(),
            rows.iter().map(|(_, _, v)| v.to_vec()).collect(),
            rows.iter().map(|(s, id, _)| (s.to_string(), id.to_string())).collect(),
            cross.iter().map(|(other, pairs)| (other.to_string(), map(pairs))).collect(),
        )
        .unwrap()
    }

    const ISWC: &str = "International Semantic Web Conference";

    /// DBLP hit at squared distance 0.12; AIDA has no entry within the cut-off;
    /// ConfIDent is reachable only through DBLP's cross-references.
    fn iswc_store() -> AuthorityStore {
        let dblp = snapshot(
            "dblp",
            &[(ISWC, "semweb", [0.94, 0.3464]), ("Web Conference", "www", [-1.0, 0.0])],
            &[("confident", &[("semweb", "ISWC")])],
        );
        let aida = snapshot(
            "aida",
            &[("Computational Linguistics", "acl", [0.0, -1.0])],
            &[],
        );
        let confident = snapshot(
            "confident",
            &[("ISWC International Semantic Web Conference", "ISWC", [-0.6, 0.8])],
            &[],
        );
        AuthorityStore::default()
            .with_conference(Dataset::Dblp, dblp)
            .with_conference(Dataset::Aida, aida)
            .with_conference(Dataset::Confident, confident)
    }

    #[test]
    fn test_dataset_urls_quote_every_reserved_byte() {
        assert_eq!(dataset_url(Dataset::Dblp, "", "semweb"), "https://dblp.org/streams/conf/semweb");
        assert_eq!(
            dataset_url(Dataset::Aida, "International Semantic Web Conference", "iswc"),
            "https://w3id.org/aida/dashboard/cs/conference/International%20Semantic%20Web%20Conference"
        );
        assert_eq!(
            dataset_url(Dataset::Confident, "", "ISWC/2024 a&b"),
            "https://www.confident-conference.org/index.php/ISWC%2F2024%20a%26b"
        );
    }

    #[test]
    fn test_pick_winner_prefers_earlier_dataset_on_ties() {
        let p = |dataset, score| Proposal { dataset, name: "x".into(), id: "x".into(), score };
        let proposals = vec![p(Dataset::Dblp, 0.8), p(Dataset::Aida, 0.8), p(Dataset::Confident, 0.9)];
        assert_eq!(pick_winner(&proposals).unwrap().dataset, Dataset::Confident);

        let proposals = vec![p(Dataset::Aida, 0.5), p(Dataset::Confident, 0.5)];
        assert_eq!(pick_winner(&proposals).unwrap().dataset, Dataset::Aida);

        assert!(pick_winner(&[p(Dataset::Dblp, 0.0)]).is_none());
        assert!(pick_winner(&[]).is_none());
    }

    #[tokio::test]
    async fn test_dblp_hit_propagates_through_cross_refs() {
        let store = iswc_store();
        let embedder = TableEmbedder::new(&[(ISWC, [1.0, 0.0])]);
        let thresholds = Thresholds::default();
        let linker = ConferenceLinker::new(&store, &embedder, &thresholds);

        let mut record = EventRecord { conference_series: ISWC.to_string(), ..Default::default() };
        linker.link_record(&mut record).await.unwrap();

        let dblp = record.dblp.link().unwrap();
        assert_eq!(dblp.name, ISWC);
        assert_eq!(dblp.id, "semweb");
        assert_eq!(dblp.url, "https://dblp.org/streams/conf/semweb");

        // DBLP's table has no AIDA entry
        assert_eq!(record.aida, DatasetMatch::NoMatch);

        let confident = record.confident.link().unwrap();
        assert_eq!(confident.id, "ISWC");
        assert_eq!(confident.name, "ISWC International Semantic Web Conference");
        assert_eq!(confident.url, "https://www.confident-conference.org/index.php/ISWC");
    }

    #[tokio::test]
    async fn test_linking_is_idempotent() {
        let store = iswc_store();
        let embedder = TableEmbedder::new(&[(ISWC, [1.0, 0.0])]);
        let thresholds = Thresholds::default();
        let linker = ConferenceLinker::new(&store, &embedder, &thresholds);

        let first = linker.link(ISWC).await.unwrap();
        let second = linker.link(ISWC).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_empty_series_skips_embedding() {
        let store = iswc_store();
        let embedder = TableEmbedder::new(&[]);
        let thresholds = Thresholds::default();
        let linker = ConferenceLinker::new(&store, &embedder, &thresholds);

        let out = linker.link("   ").await.unwrap();
        assert!(out.iter().all(|(_, m)| !m.is_match()));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_nothing_within_cutoff_leaves_all_empty() {
        let store = iswc_store();
        let embedder = TableEmbedder::new(&[("Medical Imaging", [0.0, 1.0])]);
        let thresholds = Thresholds { conference_max_distance: 0.1, ..Default::default() };
        let linker = ConferenceLinker::new(&store, &embedder, &thresholds);

        let mut record = EventRecord {
            conference_series: "Medical Imaging".to_string(),
            dblp: DatasetLink::new("stale", "stale", "https://dblp.org/streams/conf/stale").into(),
            ..Default::default()
        };
        linker.link_record(&mut record).await.unwrap();
        assert_eq!(record.dblp, DatasetMatch::NoMatch);
        assert_eq!(record.aida, DatasetMatch::NoMatch);
        assert_eq!(record.confident, DatasetMatch::NoMatch);
    }

    #[tokio::test]
    async fn test_missing_snapshots_skip_the_stage() {
        let store = AuthorityStore::default();
        let embedder = TableEmbedder::new(&[]);
        let thresholds = Thresholds::default();
        let linker = ConferenceLinker::new(&store, &embedder, &thresholds);

        let out = linker.link(ISWC).await.unwrap();
        assert!(out.iter().all(|(_, m)| *m == DatasetMatch::NoMatch));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }
}
