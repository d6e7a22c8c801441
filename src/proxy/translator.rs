// Request translator - caller content parts into upstream request shapes

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::ProxyError;

/// One piece of multimodal input. Binary data stays in whatever encoding
/// the caller supplied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContentPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData", alias = "inline_data")]
        inline_data: Blob,
    },
    FileData {
        #[serde(rename = "fileData", alias = "file_data")]
        file_data: FileRef,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    #[serde(alias = "mime_type")]
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRef {
    #[serde(alias = "mime_type")]
    pub mime_type: String,
    #[serde(alias = "file_uri")]
    pub file_uri: String,
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn inline_data(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        ContentPart::InlineData {
            inline_data: Blob {
                mime_type: mime_type.into(),
                data: data.into(),
            },
        }
    }

    /// Parse a caller-supplied `parts` array, naming the first bad index.
    pub fn parse_all(value: &Value) -> Result<Vec<ContentPart>, ProxyError> {
        let items = value
            .as_array()
            .ok_or_else(|| ProxyError::Validation("'parts' must be an array".to_string()))?;

        items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                serde_json::from_value(item.clone()).map_err(|_| {
                    ProxyError::Validation(format!("Unsupported content part at index {}", i))
                })
            })
            .collect()
    }
}

/// Accumulates parts in the order they must reach the model.
#[derive(Debug, Default, Clone)]
pub struct PromptBuilder {
    parts: Vec<ContentPart>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.push_text(text);
        self
    }

    pub fn push_text(&mut self, text: impl Into<String>) {
        self.parts.push(ContentPart::text(text));
    }

    pub fn push(&mut self, part: ContentPart) {
        self.parts.push(part);
    }

    pub fn build(self) -> Vec<ContentPart> {
        self.parts
    }
}

/// Wrap parts as a single user turn for the generate-content API.
pub fn generate_contents(parts: Vec<ContentPart>) -> Value {
    json!([{ "role": "user", "parts": parts }])
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Body for the chat-completion API.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<Value>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            response_format: None,
        }
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn json_mode(mut self) -> Self {
        self.response_format = Some(json!({ "type": "json_object" }));
        self
    }

    pub fn into_value(self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Safety setting for the generate-content API
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SafetySetting {
    pub category: String,
    pub threshold: String,
}

/// No blocking for the four standard harm categories.
pub fn default_safety_settings() -> Vec<SafetySetting> {
    [
        "HARM_CATEGORY_HARASSMENT",
        "HARM_CATEGORY_HATE_SPEECH",
        "HARM_CATEGORY_SEXUALLY_EXPLICIT",
        "HARM_CATEGORY_DANGEROUS_CONTENT",
    ]
    .iter()
    .map(|category| SafetySetting {
        category: category.to_string(),
        threshold: "BLOCK_NONE".to_string(),
    })
    .collect()
}

/// Body for the generate-content API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub contents: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safety_settings: Option<Vec<SafetySetting>>,
}

impl GenerateRequest {
    pub fn new(contents: Value) -> Self {
        Self {
            contents,
            generation_config: None,
            safety_settings: None,
        }
    }

    pub fn from_parts(parts: Vec<ContentPart>) -> Self {
        Self::new(generate_contents(parts))
    }

    pub fn generation_config(mut self, config: Value) -> Self {
        self.generation_config = Some(config);
        self
    }

    pub fn json_response(self) -> Self {
        self.generation_config(json!({ "responseMimeType": "application/json" }))
    }

    pub fn with_default_safety(mut self) -> Self {
        self.safety_settings = Some(default_safety_settings());
        self
    }

    pub fn into_value(self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
