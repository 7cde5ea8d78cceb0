//! Fixed output schema for the extraction service.
//!
//! The schema is sent with every call as a structured-output constraint and
//! re-validated on the way back in: required fields, closed enums, and
//! numeric ranges. Anything nonconforming is a schema failure carrying the
//! raw output.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::models::{
    Analysis, CategoryScores, ItemMention, ReturnIntent, Sentiment, SeverityFlag, StaffMention,
};

/// The structured payload the extraction service must return.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractionPayload {
    pub overall_sentiment: Sentiment,
    #[serde(default)]
    pub emotion: Option<String>,
    pub categories: CategoryScores,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub opportunities: Vec<String>,
    #[serde(default)]
    pub staff_mentioned: Vec<StaffMention>,
    #[serde(default)]
    pub items_mentioned: Vec<ItemMention>,
    #[serde(default)]
    pub severity_flags: Vec<SeverityFlag>,
    pub return_intent: ReturnIntent,
}

impl ExtractionPayload {
    /// Parse and validate a raw service response.
    pub fn from_response(raw: &str) -> Result<Self, super::ExtractionError> {
        let payload: ExtractionPayload =
            serde_json::from_str(raw).map_err(|e| super::ExtractionError::Schema {
                reason: e.to_string(),
                raw: raw.to_string(),
            })?;
        payload
            .validate()
            .map_err(|reason| super::ExtractionError::Schema {
                reason,
                raw: raw.to_string(),
            })?;
        Ok(payload)
    }

    /// Range checks beyond what serde's shape validation covers.
    fn validate(&self) -> Result<(), String> {
        for (name, score) in [
            ("food", self.categories.food),
            ("service", self.categories.service),
            ("ambience", self.categories.ambience),
            ("value", self.categories.value),
        ] {
            if let Some(score) = score {
                if !(-1.0..=1.0).contains(&score) {
                    return Err(format!("category {} score {} outside -1..1", name, score));
                }
            }
        }
        for item in &self.items_mentioned {
            if !(1..=5).contains(&item.intensity) {
                return Err(format!(
                    "item '{}' intensity {} outside 1-5",
                    item.name, item.intensity
                ));
            }
        }
        for staff in &self.staff_mentioned {
            if staff.name.trim().is_empty() {
                return Err("staff mention with empty name".to_string());
            }
        }
        Ok(())
    }

    /// Convert into the domain analysis for one review.
    pub fn into_analysis(self, review_id: String, model: Option<String>) -> Analysis {
        Analysis {
            review_id,
            overall_sentiment: self.overall_sentiment,
            emotion: self.emotion,
            categories: self.categories,
            strengths: self.strengths,
            opportunities: self.opportunities,
            staff_mentions: self.staff_mentioned,
            item_mentions: self.items_mentioned,
            severity_flags: self.severity_flags,
            return_intent: self.return_intent,
            model,
            created_at: chrono::Utc::now(),
        }
    }
}

/// The JSON schema sent as the structured-output constraint.
pub fn output_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "required": ["overall_sentiment", "categories", "return_intent"],
        "additionalProperties": false,
        "properties": {
            "overall_sentiment": {
                "type": "string",
                "enum": ["positive", "neutral", "negative"]
            },
            "emotion": { "type": ["string", "null"] },
            "categories": {
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "food": { "type": ["number", "null"], "minimum": -1, "maximum": 1 },
                    "service": { "type": ["number", "null"], "minimum": -1, "maximum": 1 },
                    "ambience": { "type": ["number", "null"], "minimum": -1, "maximum": 1 },
                    "value": { "type": ["number", "null"], "minimum": -1, "maximum": 1 }
                }
            },
            "strengths": { "type": "array", "items": { "type": "string" } },
            "opportunities": { "type": "array", "items": { "type": "string" } },
            "staff_mentioned": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["name", "sentiment"],
                    "properties": {
                        "name": { "type": "string" },
                        "role": { "type": ["string", "null"] },
                        "sentiment": {
                            "type": "string",
                            "enum": ["positive", "neutral", "negative"]
                        }
                    }
                }
            },
            "items_mentioned": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["name", "polarity", "intensity"],
                    "properties": {
                        "name": { "type": "string" },
                        "polarity": {
                            "type": "string",
                            "enum": ["positive", "neutral", "negative"]
                        },
                        "intensity": { "type": "integer", "minimum": 1, "maximum": 5 }
                    }
                }
            },
            "severity_flags": {
                "type": "array",
                "items": {
                    "type": "string",
                    "enum": ["quality", "wait_time", "hygiene"]
                }
            },
            "return_intent": {
                "type": "string",
                "enum": ["likely", "unlikely", "unknown"]
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_response() -> String {
        serde_json::json!({
            "overall_sentiment": "positive",
            "emotion": "delighted",
            "categories": { "food": 0.9, "service": 0.4, "ambience": null, "value": null },
            "strengths": ["hand-made pasta"],
            "opportunities": [],
            "staff_mentioned": [
                { "name": "Marco", "role": "server", "sentiment": "positive" }
            ],
            "items_mentioned": [
                { "name": "cacio e pepe", "polarity": "positive", "intensity": 5 }
            ],
            "severity_flags": [],
            "return_intent": "likely"
        })
        .to_string()
    }

    #[test]
    fn accepts_a_conforming_response() {
        let payload = ExtractionPayload::from_response(&valid_response()).unwrap();
        assert_eq!(payload.overall_sentiment, Sentiment::Positive);
        assert_eq!(payload.items_mentioned.len(), 1);
        assert_eq!(payload.staff_mentioned[0].name, "Marco");
    }

    #[test]
    fn rejects_unknown_sentiment_values() {
        let raw = valid_response().replace("\"positive\"", "\"ecstatic\"");
        let err = ExtractionPayload::from_response(&raw).unwrap_err();
        assert!(matches!(err, super::super::ExtractionError::Schema { .. }));
    }

    #[test]
    fn rejects_out_of_range_intensity() {
        let raw = valid_response().replace("\"intensity\":5", "\"intensity\":9");
        let err = ExtractionPayload::from_response(&raw).unwrap_err();
        match err {
            super::super::ExtractionError::Schema { reason, .. } => {
                assert!(reason.contains("intensity"));
            }
            other => panic!("expected schema error, got {:?}", other),
        }
    }

    #[test]
    fn rejects_out_of_range_category_score() {
        let raw = valid_response().replace("0.9", "3.5");
        assert!(ExtractionPayload::from_response(&raw).is_err());
    }

    #[test]
    fn rejects_non_json_output() {
        let err = ExtractionPayload::from_response("I think the review is positive").unwrap_err();
        match err {
            super::super::ExtractionError::Schema { raw, .. } => {
                assert!(raw.contains("positive"));
            }
            other => panic!("expected schema error, got {:?}", other),
        }
    }

    #[test]
    fn schema_lists_all_severity_flags() {
        let schema = output_schema();
        let flags = schema["properties"]["severity_flags"]["items"]["enum"]
            .as_array()
            .unwrap();
        assert_eq!(flags.len(), 3);
    }

    #[test]
    fn maps_into_a_domain_analysis() {
        let payload = ExtractionPayload::from_response(&valid_response()).unwrap();
        let analysis = payload.into_analysis("rev-1".to_string(), Some("test-model".into()));
        assert_eq!(analysis.review_id, "rev-1");
        assert_eq!(analysis.model.as_deref(), Some("test-model"));
        assert_eq!(analysis.item_mentions[0].intensity, 5);
    }
}
