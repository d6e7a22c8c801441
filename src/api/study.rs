// Study tools: flashcards, quizzes and study guides

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ApiError, AppState, JsonBody};
use crate::proxy::schema::{strip_code_fence, StudyGuideSchema};
use crate::proxy::translator::{ContentPart, GenerateRequest, PromptBuilder};
use crate::proxy::{ProxyError, Rotation};

const FLASHCARD_DIRECTIVE: &str = "\n\nGenerate a list of flashcards (front and back) from ALL the provided text and image content. It is crucial to **make sure at least one flashcard is generated for each distinct file or text input provided**, and ideally more. Ensure the 'front' is a question or term and the 'back' is its answer or definition. Aim for 5-10 flashcards per file/input if possible, or fewer if the content is short.";

const FLASHCARD_FORMAT: &str = r#"

Provide the output as a JSON array of objects, where each object has 'front' and 'back' properties. Example JSON format:
[
  { "front": "What is photosynthesis?", "back": "The process used by plants to convert light energy into chemical energy." },
  { "front": "What are the key inputs for photosynthesis?", "back": "Carbon dioxide, water, and light energy." }
]"#;

fn flashcard_schema() -> Value {
    json!({
        "responseMimeType": "application/json",
        "responseSchema": {
            "type": "ARRAY",
            "items": {
                "type": "OBJECT",
                "properties": {
                    "front": { "type": "STRING" },
                    "back": { "type": "STRING" }
                },
                "propertyOrdering": ["front", "back"]
            }
        }
    })
}

fn quiz_schema() -> Value {
    json!({
        "responseMimeType": "application/json",
        "responseSchema": {
            "type": "ARRAY",
            "items": {
                "type": "OBJECT",
                "properties": {
                    "question": { "type": "STRING" },
                    "answer": { "type": "STRING" },
                    "type": { "type": "STRING" },
                    "options": { "type": "ARRAY", "items": { "type": "STRING" } }
                }
            }
        }
    })
}

#[derive(Debug, Deserialize)]
pub struct UploadedFile {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub mime_type: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashcardBody {
    pub input_text: Option<String>,
    pub custom_instructions: Option<String>,
    #[serde(default)]
    pub uploaded_files: Vec<UploadedFile>,
}

fn flashcard_parts(request: &FlashcardBody) -> Vec<ContentPart> {
    let mut prompt = PromptBuilder::new();
    if let Some(text) = request.input_text.as_deref().filter(|t| !t.is_empty()) {
        prompt.push_text(format!("Here is some text content: \"{}\"", text));
    }
    for file in &request.uploaded_files {
        if file.mime_type.starts_with("image/") {
            prompt.push_text(format!("From the following image file ({}):", file.name));
            prompt.push(ContentPart::inline_data(
                file.mime_type.as_str(),
                file.content.as_str(),
            ));
        } else if file.mime_type.starts_with("text/") || file.mime_type == "application/pdf" {
            prompt.push_text(format!(
                "From the following text content ({}): \"{}\"",
                file.name, file.content
            ));
        } else {
            tracing::debug!("Ignoring upload {} of type {}", file.name, file.mime_type);
        }
    }
    prompt.push_text(FLASHCARD_DIRECTIVE);
    if let Some(extra) = request.custom_instructions.as_deref().filter(|c| !c.is_empty()) {
        prompt.push_text(format!(
            "\n\nAlso follow these specific instructions: \"{}\"",
            extra
        ));
    }
    prompt.push_text(FLASHCARD_FORMAT);
    prompt.build()
}

/// A model answer only counts when it parses to a non-empty array.
fn parse_flashcards(text: &str) -> Result<Vec<Value>, ProxyError> {
    let parsed: Value = serde_json::from_str(strip_code_fence(text))
        .map_err(|e| ProxyError::MalformedResponse(format!("flashcards are not JSON: {}", e)))?;
    match parsed {
        Value::Array(cards) if !cards.is_empty() => Ok(cards),
        Value::Array(_) => Err(ProxyError::MalformedResponse(
            "model generated an empty flashcard array".to_string(),
        )),
        _ => Err(ProxyError::MalformedResponse(
            "flashcards are not a JSON array".to_string(),
        )),
    }
}

pub async fn flashcards(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<FlashcardBody>,
) -> Result<Json<Value>, ApiError> {
    let profile = &state.config.endpoints.flashcards;
    let credential = state.credential(profile, None).map_err(|_| {
        ApiError::internal("Server Configuration Error").with_message(format!(
            "{} environment variable not configured on the server.",
            profile.secret
        ))
    })?;

    let has_text = request.input_text.as_deref().is_some_and(|t| !t.is_empty());
    if !has_text && request.uploaded_files.is_empty() {
        return Err(
            ApiError::bad_request("Bad Request").with_message("Please provide text or upload files.")
        );
    }

    let body = GenerateRequest::from_parts(flashcard_parts(&request))
        .generation_config(flashcard_schema())
        .into_value();

    let gemini = &state.gemini;
    let credential = &credential;
    let body = &body;
    let rotated = Rotation::new(&profile.models, profile.rotation)
        .run(move |model| async move {
            tracing::info!("Attempting to generate flashcards with model: {}", model);
            let text = gemini.send_text(&model, body, credential).await?;
            parse_flashcards(&text)
        })
        .await
        .map_err(|e| {
            ApiError::internal("Flashcard Generation Failed").with_message(format!(
                "Could not generate flashcards after trying all models. Last error: {}",
                e.detail()
            ))
        })?;

    Ok(Json(json!({ "flashcards": rotated.value })))
}

/// Body shared by the endpoints where the client picks the model and
/// builds the contents itself.
#[derive(Debug, Deserialize)]
pub struct ModelContentsBody {
    pub model: Option<String>,
    pub contents: Option<Value>,
}

impl ModelContentsBody {
    fn fields(&self) -> Option<(&str, &Value)> {
        let model = self.model.as_deref().filter(|m| !m.is_empty())?;
        let contents = self.contents.as_ref().filter(|c| !c.is_null())?;
        Some((model, contents))
    }
}

fn upstream_status(status: u16) -> StatusCode {
    StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY)
}

pub async fn quiz(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<ModelContentsBody>,
) -> Result<Json<Value>, ApiError> {
    let profile = &state.config.endpoints.quiz;
    let credential = state
        .credential(profile, None)
        .map_err(|_| ApiError::internal("Server configuration error."))?;

    let Some((model, contents)) = request.fields() else {
        return Err(ApiError::bad_request(
            "Bad Request: Missing \"model\" or \"contents\" in request body.",
        ));
    };

    let body = GenerateRequest::new(contents.clone())
        .generation_config(quiz_schema())
        .into_value();

    let result = async {
        let text = state.gemini.send_text(model, &body, &credential).await?;
        serde_json::from_str::<Value>(&text)
            .map_err(|e| ProxyError::MalformedResponse(format!("quiz is not JSON: {}", e)))
    }
    .await;

    match result {
        Ok(questions) => Ok(Json(json!({ "quizQuestions": questions }))),
        Err(ProxyError::UpstreamHttp { status, message }) => {
            Err(ApiError::new(upstream_status(status), "AI Model Error").with_message(message))
        }
        Err(e) => {
            tracing::error!("Quiz generation with {} failed: {}", model, e);
            Err(ApiError::internal("Internal Server Error").with_message(e.detail()))
        }
    }
}

pub async fn study_guide(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<ModelContentsBody>,
) -> Result<Json<StudyGuideSchema>, ApiError> {
    let profile = &state.config.endpoints.study_guide;
    let credential = state
        .credential(profile, None)
        .map_err(|_| ApiError::internal("API key is not configured."))?;

    let Some((model, contents)) = request.fields() else {
        return Err(ApiError::bad_request(
            "Missing model or contents in the request body.",
        ));
    };

    let body = GenerateRequest::new(contents.clone())
        .json_response()
        .into_value();

    let parsed = async {
        let text = state.gemini.send_text(model, &body, &credential).await?;
        serde_json::from_str::<Value>(strip_code_fence(&text))
            .map_err(|e| ProxyError::MalformedResponse(format!("study guide is not JSON: {}", e)))
    }
    .await
    .map_err(|e| match e {
        ProxyError::UpstreamHttp { status, message } => ApiError::new(
            upstream_status(status),
            format!("Google API Error: {}", message),
        ),
        other => {
            tracing::error!("Study guide generation failed: {}", other);
            ApiError::internal(format!(
                "An internal server error occurred: {}",
                other.detail()
            ))
        }
    })?;

    match StudyGuideSchema::extract(&parsed) {
        Some(guide) => Ok(Json(guide)),
        None => Err(ApiError::internal(
            "AI returned valid JSON but with an unexpected structure.",
        )),
    }
}
