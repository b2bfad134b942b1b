//! Schema-constrained extraction of an Event Record from CfP text.

use coci_common::config::{EventDefaults, LlmConfig};
use coci_common::{EventRecord, OrganiserRecord};
use coci_llm::{LlmBackend, LlmRequest};
use serde::Deserialize;
use tracing::{debug, info, instrument};

use crate::error::{PipelineError, Result};
use crate::refine::normalize_tracks;
use crate::schema::{extraction_messages, response_format};

/// Model output, exactly as the response schema declares it.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEvent {
    event_name: String,
    conference_series: String,
    event_acronym: String,
    colocated_with: String,
    // must be present, may be null
    #[serde(deserialize_with = "Option::deserialize")]
    year: Option<i32>,
    location: String,
    topics: Vec<String>,
    organisers: Vec<RawOrganiser>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawOrganiser {
    organiser_name: String,
    organiser_affiliation: String,
    organiser_country: String,
    track_name: String,
}

/// Parse the model's JSON into an Event Record.
///
/// Organisers come out with text provenance and unverified; tracks are
/// normalized and a missing year takes the configured default.
pub fn parse_extraction(content: &str, defaults: &EventDefaults) -> Result<EventRecord> {
    if content.trim().is_empty() {
        return Err(PipelineError::ExtractionFailure("model returned no content".to_string()));
    }
    let raw: RawEvent = serde_json::from_str(content).map_err(|e| {
        PipelineError::ExtractionFailure(format!("model output does not match the schema: {e}"))
    })?;

    let mut organisers: Vec<OrganiserRecord> = raw
        .organisers
        .into_iter()
        .map(|o| {
            OrganiserRecord::extracted(
                o.organiser_name.trim(),
                o.organiser_affiliation.trim(),
                o.organiser_country.trim(),
                o.track_name,
            )
        })
        .filter(|o| !o.organiser_name.is_empty())
        .collect();
    normalize_tracks(&mut organisers, defaults);

    let topics = raw
        .topics
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    Ok(EventRecord {
        event_name: raw.event_name.trim().to_string(),
        conference_series: raw.conference_series.trim().to_string(),
        event_acronym: raw.event_acronym.trim().to_string(),
        colocated_with: raw.colocated_with.trim().to_string(),
        year: Some(raw.year.unwrap_or_else(|| defaults.year())),
        location: raw.location.trim().to_string(),
        topics,
        organisers,
        ..Default::default()
    })
}

/// Sends the CfP to the text-generation backend and parses the answer.
pub struct Extractor<'a> {
    llm: &'a dyn LlmBackend,
    settings: &'a LlmConfig,
    defaults: &'a EventDefaults,
}

impl<'a> Extractor<'a> {
    pub fn new(llm: &'a dyn LlmBackend, settings: &'a LlmConfig, defaults: &'a EventDefaults) -> Self {
        Self { llm, settings, defaults }
    }

    #[instrument(skip(self, call_for_papers), fields(chars = call_for_papers.len(), model = %self.llm.model_id()))]
    pub async fn extract(&self, call_for_papers: &str) -> Result<EventRecord> {
        if call_for_papers.trim().is_empty() {
            return Err(PipelineError::ExtractionFailure("call for papers is empty".to_string()));
        }

        let request = LlmRequest {
            messages: extraction_messages(call_for_papers),
            model: Some(self.settings.model.clone()),
            max_tokens: Some(self.settings.max_tokens),
            temperature: Some(self.settings.temperature),
            response_format: Some(response_format(&self.defaults.default_track)),
        };
        let response = self.llm.complete(request).await?;
        debug!(
            prompt_tokens = response.prompt_tokens,
            completion_tokens = response.completion_tokens,
            "Extraction completed"
        );

        let record = parse_extraction(&response.content, self.defaults)?;
        info!(
            event = %record.event_name,
            organisers = record.organisers.len(),
            topics = record.topics.len(),
            "Call for papers extracted"
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coci_common::AffiliationProvenance;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn defaults() -> EventDefaults {
        EventDefaults { default_year: Some(2026), ..Default::default() }
    }

    fn sample() -> serde_json::Value {
        json!({
            "event_name": "The 24th International Semantic Web Conference",
            "conference_series": "International Semantic Web Conference",
            "event_acronym": "ISWC 2025",
            "colocated_with": "",
            "year": 2025,
            "location": "Nara, Japan",
            "topics": ["knowledge graphs", " ", "ontologies"],
            "organisers": [
                {"organiser_name": "Jane Doe", "organiser_affiliation": "University of Antwerp",
                 "organiser_country": "Belgium", "track_name": "main"},
                {"organiser_name": "John Roe", "organiser_affiliation": "CWI",
                 "organiser_country": "Netherlands", "track_name": "Research Track"}
            ]
        })
    }

    #[test]
    fn test_parse_valid_output() {
        let record = parse_extraction(&sample().to_string(), &defaults()).unwrap();
        assert_eq!(record.event_acronym, "ISWC 2025");
        assert_eq!(record.year, Some(2025));
        assert_eq!(record.topics, vec!["knowledge graphs", "ontologies"]);
        assert_eq!(record.organisers.len(), 2);
        assert_eq!(record.organisers[0].track_name, "Other");
        assert_eq!(record.organisers[1].track_name, "Research Track");
        for o in &record.organisers {
            assert_eq!(o.affiliation_provenance, AffiliationProvenance::ExtractedFromText);
            assert!(!o.verified);
            assert!(o.openalex_page.is_none());
        }
        assert!(record.enhanced_topics.is_none());
    }

    #[test]
    fn test_null_year_takes_default() {
        let mut value = sample();
        value["year"] = serde_json::Value::Null;
        let record = parse_extraction(&value.to_string(), &defaults()).unwrap();
        assert_eq!(record.year, Some(2026));
    }

    #[test]
    fn test_missing_field_is_failure() {
        let mut value = sample();
        value.as_object_mut().unwrap().remove("year");
        let err = parse_extraction(&value.to_string(), &defaults()).unwrap_err();
        assert!(matches!(err, PipelineError::ExtractionFailure(_)));

        let mut value = sample();
        value.as_object_mut().unwrap().remove("topics");
        assert!(parse_extraction(&value.to_string(), &defaults()).is_err());
    }

    #[test]
    fn test_unknown_field_is_failure() {
        let mut value = sample();
        value["organisers"][0]["email"] = json!("jane@example.org");
        let err = parse_extraction(&value.to_string(), &defaults()).unwrap_err();
        assert!(matches!(err, PipelineError::ExtractionFailure(_)));
    }

    #[test]
    fn test_non_json_or_empty_is_failure() {
        assert!(matches!(
            parse_extraction("Sorry, I cannot help with that.", &defaults()),
            Err(PipelineError::ExtractionFailure(_))
        ));
        assert!(matches!(parse_extraction("  ", &defaults()), Err(PipelineError::ExtractionFailure(_))));
    }
}
