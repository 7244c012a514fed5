use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One vector row in the remote index: deterministic id, embedding values,
/// and metadata tagging it back to its document and owning chatbot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl VectorRecord {
    /// Build the record for chunk `index` of a document. The id is derived
    /// from the document id so a reprocess overwrites rather than duplicates.
    pub fn new(
        document_id: &str,
        chatbot_id: &str,
        index: usize,
        text: &str,
        values: Vec<f32>,
    ) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert(
            "document_id".to_string(),
            serde_json::Value::String(document_id.to_string()),
        );
        metadata.insert(
            "chatbot_id".to_string(),
            serde_json::Value::String(chatbot_id.to_string()),
        );
        metadata.insert(
            "text".to_string(),
            serde_json::Value::String(text.to_string()),
        );
        metadata.insert("chunk_index".to_string(), serde_json::json!(index));

        Self {
            id: format!("{document_id}-{index}"),
            values,
            metadata,
        }
    }
}

/// One ranked result from a similarity query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorMatch {
    pub id: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl VectorMatch {
    fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }

    pub fn document_id(&self) -> Option<&str> {
        self.metadata_str("document_id")
    }

    pub fn text(&self) -> Option<&str> {
        self.metadata_str("text")
    }
}
