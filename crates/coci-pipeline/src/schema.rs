//! Prompt and response schema for the extraction request.

use coci_llm::{Message, ResponseFormat};
use serde_json::{json, Value};

pub const SCHEMA_NAME: &str = "organising_committee_of_conference";

/// Messages asking the model to parse one Call for Papers.
pub fn extraction_messages(call_for_papers: &str) -> Vec<Message> {
    let prompt = format!(
        "You will receive the Call for Papers of a scientific event. Parse it and identify:\n\
         - the event name and its acronym;\n\
         - the conference series the event belongs to, and any event it is co-located with;\n\
         - the year and the location of the event;\n\
         - the organisers of the event, with their affiliation, country and track;\n\
         - the topics of interest.\n\
         Leave a field empty when the text does not state it.\n\n\
         <call_for_papers>\n{call_for_papers}\n</call_for_papers>"
    );
    vec![Message::user(prompt)]
}

/// Strict `json_schema` response format for the extraction request.
pub fn response_format(default_track: &str) -> ResponseFormat {
    ResponseFormat::strict_schema(SCHEMA_NAME, response_schema(default_track))
}

/// The schema itself: every object closed and every property required.
pub fn response_schema(default_track: &str) -> Value {
    let mut schema = json!({
        "type": "object",
        "properties": {
            "event_name": {
                "type": "string",
                "description": "Full name of the workshop or conference."
            },
            "conference_series": {
                "type": "string",
                "description": "Name of the recurring series the event belongs to: usually the event name without edition number or year."
            },
            "event_acronym": {
                "type": "string",
                "description": "Acronym of the workshop or conference."
            },
            "colocated_with": {
                "type": "string",
                "description": "The larger event this one is co-located with, or empty."
            },
            "year": {
                "type": ["integer", "null"],
                "description": "Year the event takes place, or null when not stated."
            },
            "location": {
                "type": "string",
                "description": "City or venue of the event."
            },
            "topics": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Topics of interest listed in the call."
            },
            "organisers": {
                "type": "array",
                "description": "Organisers of the event with their affiliation (ideally including country) and the track they organise.",
                "items": {
                    "type": "object",
                    "properties": {
                        "organiser_name": {
                            "type": "string",
                            "description": "Name of the organiser."
                        },
                        "organiser_affiliation": {
                            "type": "string",
                            "description": "Institution of the organiser: a university, institute or company."
                        },
                        "organiser_country": {
                            "type": "string",
                            "description": "Country of the organiser's institution, when available."
                        },
                        "track_name": {
                            "type": "string",
                            "description": format!(
                                "Track the organiser is responsible for. A conference may have several tracks, a workshop usually one. Use '{default_track}' by default."
                            )
                        }
                    }
                }
            }
        }
    });
    close_objects(&mut schema);
    schema
}

/// Set `additionalProperties: false` and require every declared property,
/// on every object schema in the tree.
fn close_objects(schema: &mut Value) {
    let Value::Object(map) = schema else { return };

    if let Some(Value::Object(props)) = map.get("properties") {
        let required: Vec<Value> = props.keys().cloned().map(Value::String).collect();
        map.insert("required".to_string(), Value::Array(required));
        map.insert("additionalProperties".to_string(), Value::Bool(false));
    }
    if let Some(Value::Object(props)) = map.get_mut("properties") {
        for child in props.values_mut() {
            close_objects(child);
        }
    }
    if let Some(items) = map.get_mut("items") {
        close_objects(items);
    }
}
