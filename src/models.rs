//! Core data models used throughout ragdesk.
//!
//! These types represent the documents, chunks, and answers that flow through
//! the ingestion and query pipelines.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Raw text produced by the document loader, before chunking.
///
/// Metadata always carries a `source` key holding the originating file path.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub content: String,
    pub metadata: BTreeMap<String, String>,
}

impl Document {
    pub fn new(content: impl Into<String>, source: impl Into<String>) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("source".to_string(), source.into());
        Document {
            content: content.into(),
            metadata,
        }
    }

    /// The `source` metadata value, or an empty string if absent.
    pub fn source(&self) -> &str {
        self.metadata.get("source").map(String::as_str).unwrap_or("")
    }
}

/// A bounded slice of a document's content, the unit of indexing and retrieval.
///
/// Inherits the parent document's metadata unchanged.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub source: String,
    pub chunk_index: i64,
    pub text: String,
    pub metadata: BTreeMap<String, String>,
}

/// A stored chunk returned from a similarity query, with its score.
#[derive(Debug, Clone, Serialize)]
pub struct IndexedRecord {
    pub id: String,
    pub source: String,
    pub text: String,
    pub metadata: BTreeMap<String, String>,
    pub score: f64,
}

/// Summary of the vector index contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_documents: i64,
    pub total_chunks: i64,
    pub embedding_dimension: i64,
}

/// Expertise level for the DELIA persona. Controls how answers are pitched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserLevel {
    Basic,
    #[default]
    Intermediate,
    Advanced,
}

impl UserLevel {
    /// The wire value (`basic`, `intermediate`, `advanced`).
    pub fn as_str(&self) -> &'static str {
        match self {
            UserLevel::Basic => "basic",
            UserLevel::Intermediate => "intermediate",
            UserLevel::Advanced => "advanced",
        }
    }

    /// The Spanish tag inserted into the DELIA question prefix.
    pub fn tag(&self) -> &'static str {
        match self {
            UserLevel::Basic => "basico",
            UserLevel::Intermediate => "intermedio",
            UserLevel::Advanced => "avanzado",
        }
    }
}

impl std::str::FromStr for UserLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "basic" => Ok(UserLevel::Basic),
            "intermediate" => Ok(UserLevel::Intermediate),
            "advanced" => Ok(UserLevel::Advanced),
            other => Err(format!(
                "invalid user level '{}' (expected basic, intermediate, or advanced)",
                other
            )),
        }
    }
}

/// Outcome of checking a single extracted EDSL code block.
///
/// Advisory only: the heuristic emits warnings and suggestions, never hard
/// errors, and never blocks the response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
}

/// Structured response from the DELIA persona.
///
/// Always well-formed: on failure `error` is set, `response` carries a fixed
/// apology, and the validation fields are empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliaAnswer {
    pub response: String,
    pub validation_results: Vec<ValidationResult>,
    pub user_level: String,
    pub has_edsl_code: bool,
    #[serde(rename = "edsl_code_blocks_count")]
    pub edsl_block_count: usize,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delia_answer_wire_field_names() {
        let answer = DeliaAnswer {
            response: "ok".to_string(),
            validation_results: Vec::new(),
            user_level: "basic".to_string(),
            has_edsl_code: true,
            edsl_block_count: 2,
            error: None,
        };
        let json = serde_json::to_value(&answer).unwrap();
        assert_eq!(json["edsl_code_blocks_count"], 2);
        assert_eq!(json["has_edsl_code"], true);
        assert!(json.get("edsl_block_count").is_none());
    }

    #[test]
    fn user_level_parses_wire_values() {
        assert_eq!("basic".parse::<UserLevel>().unwrap(), UserLevel::Basic);
        assert_eq!(
            "advanced".parse::<UserLevel>().unwrap(),
            UserLevel::Advanced
        );
        assert!("expert".parse::<UserLevel>().is_err());
    }
}
