//! The CfP pipeline: extraction, affiliation screen, organiser resolution,
//! conference linking, topic linking.
//!
//! Stages run one after another on the caller's task; each mutates the
//! Event Record in place. Invariants are checked before a record is returned.

use std::borrow::Cow;
use std::sync::Arc;

use coci_common::{CociConfig, CountryRegistry, EventRecord};
use coci_directory::{Directory, OpenAlexClient};
use coci_embed::SentenceEmbedder;
use coci_linking::{AuthorityStore, ConferenceLinker, OrganiserResolver, TopicLinker};
use coci_llm::{backend_from_config, LlmBackend};
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument};

use crate::error::{PipelineError, Result};
use crate::extraction::Extractor;
use crate::refine::{refine_record, screen_affiliations};

pub struct CfpPipeline {
    config: CociConfig,
    llm: Arc<dyn LlmBackend>,
    directory: Arc<dyn Directory>,
    embedder: Arc<dyn SentenceEmbedder>,
    countries: CountryRegistry,
    /// Preloaded snapshots; when `None` they are read from disk on every call.
    store: Option<AuthorityStore>,
    /// Encoder output length, measured on first use.
    dimension: OnceCell<usize>,
}

impl CfpPipeline {
    pub fn new(
        config: CociConfig,
        llm: Arc<dyn LlmBackend>,
        directory: Arc<dyn Directory>,
        embedder: Arc<dyn SentenceEmbedder>,
        countries: CountryRegistry,
    ) -> Self {
        Self { config, llm, directory, embedder, countries, store: None, dimension: OnceCell::new() }
    }

    /// Production wiring: backends, directory client and encoder from `config`.
    pub async fn from_config(config: CociConfig) -> Result<Self> {
        let llm = backend_from_config(&config.llm).map_err(|e| PipelineError::Config(e.to_string()))?;
        let directory = OpenAlexClient::new(&config.directory).map_err(|e| PipelineError::Config(e.to_string()))?;
        let embedder = coci_embed::from_settings(&config.embedding).await?;
        info!(
            llm = %llm.model_id(),
            embedder = %embedder.model_name(),
            directory = %config.directory.base_url,
            "Pipeline ready"
        );
        Ok(Self::new(config, llm, Arc::new(directory), embedder, CountryRegistry::bundled()))
    }

    /// Use these snapshots instead of loading them per call.
    pub fn with_store(mut self, store: AuthorityStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &CociConfig {
        &self.config
    }

    /// Turn raw CfP text into a fully linked Event Record.
    #[instrument(skip(self, call_for_papers), fields(chars = call_for_papers.len()))]
    pub async fn process_call_for_papers(&self, call_for_papers: &str) -> Result<EventRecord> {
        let extractor = Extractor::new(self.llm.as_ref(), &self.config.llm, &self.config.event);
        let mut record = extractor.extract(call_for_papers).await?;

        screen_affiliations(&mut record.organisers, self.config.thresholds.affiliation_screen_ratio);

        let year = record.year.unwrap_or_else(|| self.config.event.year());
        OrganiserResolver::new(self.directory.as_ref(), &self.countries, &self.config.thresholds)
            .tolerate_errors(self.config.directory.tolerate_errors)
            .resolve_all(&mut record.organisers, year)
            .await?;

        let store = self.authority_store().await?;
        ConferenceLinker::new(&store, self.embedder.as_ref(), &self.config.thresholds)
            .link_record(&mut record)
            .await?;
        TopicLinker::new(&store, self.embedder.as_ref(), &self.config.thresholds)
            .link_record(&mut record)
            .await?;

        record.check_invariants()?;
        info!(
            event = %record.event_name,
            resolved = record.organisers.iter().filter(|o| o.is_resolved()).count(),
            organisers = record.organisers.len(),
            dblp = record.dblp.is_match(),
            aida = record.aida.is_match(),
            confident = record.confident.is_match(),
            "Call for papers processed"
        );
        Ok(record)
    }

    /// Rehydrate a persisted record: re-apply the pure refinement and fill
    /// `enhanced_topics` if it was never produced.
    #[instrument(skip_all)]
    pub async fn resolve_cached(&self, json: &str) -> Result<EventRecord> {
        let mut record: EventRecord = serde_json::from_str(json).map_err(PipelineError::InvalidRecord)?;
        refine_record(&mut record, &self.config.event);

        if !record.topics.is_empty() && record.enhanced_topics.is_none() {
            debug!(topics = record.topics.len(), "Cached record lacks enhanced topics");
            let store = self.authority_store().await?;
            TopicLinker::new(&store, self.embedder.as_ref(), &self.config.thresholds)
                .link_record(&mut record)
                .await?;
        }

        record.check_invariants()?;
        Ok(record)
    }

    /// Snapshots usable with the configured encoder. Ones indexed at another
    /// dimension are unloaded unless snapshots are required.
    async fn authority_store(&self) -> Result<Cow<'_, AuthorityStore>> {
        let mut store = match &self.store {
            Some(store) => Cow::Borrowed(store),
            None => Cow::Owned(
                AuthorityStore::load(&self.config.snapshots).map_err(PipelineError::SnapshotLoadFailure)?,
            ),
        };
        store.check_model(self.embedder.model_name());

        if store.has_conferences() || store.topics().is_some() {
            let dim = *self
                .dimension
                .get_or_try_init(|| self.embedder.output_dimension())
                .await?;
            if store.has_dimension_mismatch(dim) {
                store
                    .to_mut()
                    .retain_dimension(dim, self.config.snapshots.required)
                    .map_err(PipelineError::SnapshotLoadFailure)?;
            }
        }
        Ok(store)
    }
}
