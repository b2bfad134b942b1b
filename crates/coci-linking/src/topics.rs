//! Raw topic strings → canonical topic labels from the topics snapshot.

use coci_common::record::EnhancedTopics;
use coci_common::{EventRecord, Thresholds};
use coci_embed::SentenceEmbedder;
use tracing::{debug, instrument, warn};

use crate::snapshot::AuthorityStore;
use crate::Result;

pub struct TopicLinker<'a> {
    store: &'a AuthorityStore,
    embedder: &'a dyn SentenceEmbedder,
    thresholds: &'a Thresholds,
}

impl<'a> TopicLinker<'a> {
    pub fn new(
        store: &'a AuthorityStore,
        embedder: &'a dyn SentenceEmbedder,
        thresholds: &'a Thresholds,
    ) -> Self {
        Self { store, embedder, thresholds }
    }

    /// Fill `enhanced_topics`. Left untouched when there are no topics or no snapshot.
    pub async fn link_record(&self, record: &mut EventRecord) -> Result<()> {
        if let Some(enhanced) = self.link(&record.topics).await? {
            record.enhanced_topics = Some(enhanced);
        }
        Ok(())
    }

    /// Each topic mapped to the labels within the cut-off, nearest first.
    /// `None` when there is nothing to link.
    #[instrument(skip(self, topics), fields(n = topics.len()))]
    pub async fn link(&self, topics: &[String]) -> Result<Option<EnhancedTopics>> {
        if topics.is_empty() {
            return Ok(None);
        }
        let Some(snapshot) = self.store.topics() else {
            warn!("Topics snapshot not loaded, skipping topic linking");
            return Ok(None);
        };

        let vectors = self.embedder.embed(topics).await?;
        let mut enhanced = EnhancedTopics::new();
        for (topic, vector) in topics.iter().zip(&vectors) {
            let labels: Vec<String> = snapshot
                .nearest(vector, self.thresholds.topic_k, self.thresholds.topic_max_distance)?
                .into_iter()
                .map(|hit| hit.sentence.to_string())
                .collect();
            debug!(topic = %topic, n_labels = labels.len(), "Topic linked");
            enhanced.insert(topic.clone(), labels);
        }
        Ok(Some(enhanced))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::Snapshot;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    struct FixedEmbedder(HashMap<String, Vec<f32>>);

    #[async_trait]
    impl SentenceEmbedder for FixedEmbedder {
        async fn embed(&self, texts: &[String]) -> coci_embed::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| self.0.get(t).cloned().unwrap_or(vec![0.0, 0.0])).collect())
        }

        fn model_name(&self) -> &str { "fixed" }
    }

    fn topics_store() -> AuthorityStore {
        let labels = ["knowledge graph", "semantic web", "ontology engineering"];
        let snapshot = Snapshot::build(
            "topics",
            labels.iter().map(|s| s.to_string()).collect(),
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![-1.0, 0.0]],
            labels.iter().map(|s| (s.to_string(), s.to_string())).collect(),
            HashMap::new(),
        )
        .unwrap();
        AuthorityStore::default().with_topics(snapshot)
    }

    #[tokio::test]
    async fn test_cutoff_keeps_close_labels_only() {
        let store = topics_store();
        let mut table = HashMap::new();
        // squared distance 0.55 to "knowledge graph"
        table.insert("knowledge graphs".to_string(), vec![1.0, 0.741_619_85]);
        // squared distance 0.81 to its nearest label
        table.insert("medical imaging".to_string(), vec![1.0, -0.9]);
        // equidistant (0.52) from two labels
        table.insert("semantic knowledge".to_string(), vec![0.6, 0.6]);
        let embedder = FixedEmbedder(table);
        let thresholds = Thresholds::default();
        let linker = TopicLinker::new(&store, &embedder, &thresholds);

        let topics = vec![
            "knowledge graphs".to_string(),
            "medical imaging".to_string(),
            "semantic knowledge".to_string(),
        ];
        let out = linker.link(&topics).await.unwrap().unwrap();

        assert_eq!(out["knowledge graphs"], vec!["knowledge graph"]);
        assert_eq!(out["medical imaging"], Vec::<String>::new());
        assert_eq!(out["semantic knowledge"], vec!["knowledge graph", "semantic web"]);
    }

    #[tokio::test]
    async fn test_labels_capped_at_topic_k() {
        let labels: Vec<String> = (0..7).map(|i| format!("label {i}")).collect();
        let snapshot = Snapshot::build(
            "topics",
            labels.clone(),
            (0..7).map(|i| vec![1.0, 0.05 * i as f32]).collect(),
            labels.iter().map(|s| (s.clone(), s.clone())).collect(),
            HashMap::new(),
        )
        .unwrap();
        let store = AuthorityStore::default().with_topics(snapshot);
        let mut table = HashMap::new();
        table.insert("graphs".to_string(), vec![1.0, 0.0]);
        let embedder = FixedEmbedder(table);
        let thresholds = Thresholds::default();
        let linker = TopicLinker::new(&store, &embedder, &thresholds);

        // all seven labels lie within 0.09 of the query
        let out = linker.link(&["graphs".to_string()]).await.unwrap().unwrap();
        assert_eq!(out["graphs"], labels[..thresholds.topic_k].to_vec());
    }

    #[tokio::test]
    async fn test_no_topics_leaves_field_absent() {
        let store = topics_store();
        let embedder = FixedEmbedder(HashMap::new());
        let thresholds = Thresholds::default();
        let linker = TopicLinker::new(&store, &embedder, &thresholds);

        let mut record = EventRecord::default();
        linker.link_record(&mut record).await.unwrap();
        assert!(record.enhanced_topics.is_none());
    }

    #[tokio::test]
    async fn test_missing_snapshot_leaves_field_absent() {
        let store = AuthorityStore::default();
        let embedder = FixedEmbedder(HashMap::new());
        let thresholds = Thresholds::default();
        let linker = TopicLinker::new(&store, &embedder, &thresholds);

        let mut record = EventRecord { topics: vec!["ontologies".to_string()], ..Default::default() };
        linker.link_record(&mut record).await.unwrap();
        assert!(record.enhanced_topics.is_none());
    }
}
