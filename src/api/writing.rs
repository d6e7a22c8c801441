// Writing tools: humanizer and essay graders

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ApiError, AppState, JsonBody};
use crate::proxy::translator::{ChatMessage, ChatRequest, ContentPart, GenerateRequest, PromptBuilder};
use crate::proxy::{non_empty, ProxyError, Rotation};

const HUMANIZE_MAX_CHARS: usize = 4000;
const HUMANIZE_TEMPERATURE: f64 = 0.7;

/// Rewrite instructions per requested voice.
fn tone_strategy(tone: &str) -> (&'static str, &'static str) {
    match tone {
        "Casual" => (
            "Casual",
            "Make sentences simple. Connect them with 'and'. Stop using big words.",
        ),
        "Academic" => (
            "Academic",
            "Explain simply. No complex phrases. Write facts clearly.",
        ),
        _ => (
            "Professional",
            "State actions clearly. Merge ideas. Keep it flowing.",
        ),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HumanizeBody {
    pub text: Option<String>,
    pub tone: Option<String>,
    #[serde(default)]
    pub is_personal: bool,
    pub api_key: Option<String>,
}

fn humanize_prompt(text: &str, tone: Option<&str>, is_personal: bool) -> String {
    let (voice, strategy) = tone_strategy(tone.unwrap_or_default());
    let excerpt: String = text.chars().take(HUMANIZE_MAX_CHARS).collect();
    format!(
        "SYSTEM: You are a human writer. Rewrite text to sound simple and natural.\n\
         VOICE: {voice}. PERSONAL: {is_personal}.\n\
         INSTRUCTION: {strategy}\n\
         CRITICAL: NO PARTICIPLE PHRASES (e.g., \"altering\", \"enhancing\"). Use compound sentences.\n\
         TEXT: \"{excerpt}\""
    )
}

fn rotation_failure(e: ProxyError) -> ApiError {
    match e {
        ProxyError::Configuration(msg) => ApiError::internal(msg).envelope(),
        ProxyError::Validation(msg) => ApiError::bad_request(msg).envelope(),
        other => ApiError::internal(format!("All models failed. Last error: {}", other.detail()))
            .envelope(),
    }
}

/// Rewrite text through the chat rotation, then clean it up.
pub async fn humanize(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<HumanizeBody>,
) -> Result<Json<Value>, ApiError> {
    let profile = &state.config.endpoints.humanize;
    let credential = state
        .credential(profile, request.api_key.as_deref())
        .map_err(|e| ApiError::internal(e.to_string()).envelope())?;

    let Some(text) = request.text.as_deref().filter(|t| !t.trim().is_empty()) else {
        return Err(ApiError::bad_request("Text is required.").envelope());
    };
    let prompt = humanize_prompt(text, request.tone.as_deref(), request.is_personal);

    let chat = &state.chat;
    let credential = &credential;
    let prompt = &prompt;
    let rotated = Rotation::new(&profile.models, profile.rotation)
        .run(move |model| async move {
            let body = ChatRequest::new(model.as_str(), vec![ChatMessage::user(prompt.as_str())])
                .temperature(HUMANIZE_TEMPERATURE)
                .into_value();
            non_empty(chat.send_text(&model, &body, credential).await?)
        })
        .await
        .map_err(rotation_failure)?;

    tracing::info!("Humanized with {}", rotated.model);
    let cleaned = state.postprocessor.process(&rotated.value);
    Ok(Json(json!({ "success": true, "text": cleaned })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextFile {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    pub content: Option<String>,
    pub base64: Option<String>,
    pub mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeBody {
    pub student_text: Option<String>,
    #[serde(default)]
    pub context_files: Vec<ContextFile>,
    pub instructions: Option<String>,
    pub api_key: Option<String>,
}

fn grade_parts(request: &GradeBody, student_text: &str) -> Vec<ContentPart> {
    let mut prompt = PromptBuilder::new().text(
        "SYSTEM: You are an expert academic grader. Provide specific, constructive feedback.",
    );
    if let Some(instructions) = request.instructions.as_deref().filter(|i| !i.is_empty()) {
        prompt.push_text(format!("\nINSTRUCTIONS:\n{}", instructions));
    }
    for file in &request.context_files {
        if file.kind == "text" {
            prompt.push_text(format!(
                "\n[FILE: {}]: {}",
                file.name,
                file.content.as_deref().unwrap_or_default()
            ));
        } else if let Some(data) = file.base64.as_deref().filter(|d| !d.is_empty()) {
            prompt.push(ContentPart::inline_data(
                file.mime_type.as_deref().unwrap_or("application/octet-stream"),
                data,
            ));
        }
    }
    prompt.push_text(format!(
        "\nSTUDENT WORK:\n{}\n\nTASK: Grade based ONLY on materials. Use bold Markdown headers.",
        student_text
    ));
    prompt.build()
}

/// Grade student work against optional instructions and context files,
/// rotating through the configured models.
pub async fn grade(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<GradeBody>,
) -> Result<Json<Value>, ApiError> {
    let profile = &state.config.endpoints.grade;
    let credential = state
        .credential(profile, request.api_key.as_deref())
        .map_err(|e| ApiError::internal(e.to_string()).envelope())?;

    let Some(student_text) = request.student_text.as_deref().filter(|t| !t.trim().is_empty())
    else {
        return Err(ApiError::bad_request("studentText is required.").envelope());
    };

    let body = GenerateRequest::from_parts(grade_parts(&request, student_text)).into_value();

    let gemini = &state.gemini;
    let credential = &credential;
    let body = &body;
    let rotated = Rotation::new(&profile.models, profile.rotation)
        .run(move |model| async move {
            non_empty(gemini.send_text(&model, body, credential).await?)
        })
        .await
        .map_err(rotation_failure)?;

    Ok(Json(json!({ "success": true, "data": rotated.value })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RubricSection {
    #[serde(default)]
    pub combined_text: String,
    #[serde(default)]
    pub image_parts: Vec<ImagePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePart {
    #[serde(default)]
    pub filename: String,
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RubricGradeBody {
    pub instructions_data: Option<RubricSection>,
    pub rubric_data: Option<RubricSection>,
    pub essay_data: Option<RubricSection>,
    pub extra_instructions: Option<String>,
    pub strictness: Option<Value>,
}

fn rubric_system_prompt(strictness: &str, extra_instructions: Option<&str>) -> String {
    let critical = match extra_instructions.filter(|e| !e.trim().is_empty()) {
        Some(extra) => format!(
            "CRITICAL INSTRUCTION: Prioritize this above all else: \"{}\"",
            extra
        ),
        None => String::new(),
    };
    format!(
        "You are an expert AI assignment grader. Your task is to evaluate a student's assignment based on the provided instructions and a specific grading rubric.

Grading Strictness Level: {strictness} (1=Very Lenient, 3=Normal, 5=Very Strict).
- Level 1-2 (Lenient): Focus on major concepts and effort. Be forgiving of minor errors.
- Level 3 (Normal): Provide a balanced assessment of strengths and weaknesses.
- Level 4-5 (Strict): Be highly critical. Identify all errors, even minor ones, and apply point deductions rigorously.

{critical}

Output your response in structured Markdown with these exact headings and ample spacing. Give SPECIFIC examples inside the user input to back up what you are saying:
# Overall Grade
## Detailed Feedback
## General Comments
## What to Work On to Improve"
    )
}

fn push_section(prompt: &mut PromptBuilder, label: &str, section: Option<&RubricSection>) {
    let Some(section) = section else {
        return;
    };
    prompt.push_text(format!("\n\n--- {} ---\n{}", label, section.combined_text));
    for image in &section.image_parts {
        prompt.push_text(format!("\n(Image reference: {})", image.filename));
        prompt.push(ContentPart::inline_data(image.mime_type.as_str(), image.data.as_str()));
    }
}

fn rubric_parts(request: &RubricGradeBody) -> Vec<ContentPart> {
    let strictness = match &request.strictness {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => "3".to_string(),
    };
    let mut prompt = PromptBuilder::new().text(rubric_system_prompt(
        &strictness,
        request.extra_instructions.as_deref(),
    ));
    push_section(&mut prompt, "ASSIGNMENT INSTRUCTIONS", request.instructions_data.as_ref());
    push_section(&mut prompt, "GRADING RUBRIC", request.rubric_data.as_ref());
    push_section(&mut prompt, "STUDENT'S ASSIGNMENT TO GRADE", request.essay_data.as_ref());
    prompt.build()
}

/// Rubric-based grading with a single fixed model.
pub async fn grade_rubric(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<RubricGradeBody>,
) -> Result<Json<Value>, ApiError> {
    let profile = &state.config.endpoints.rubric_grade;
    let credential = state.credential(profile, None).map_err(|_| {
        ApiError::internal(format!(
            "API key ({}) is not configured on the server.",
            profile.secret
        ))
    })?;
    let model = profile
        .primary_model()
        .ok_or_else(|| ApiError::internal("No grading model configured."))?;

    let body = GenerateRequest::from_parts(rubric_parts(&request)).into_value();

    match state.gemini.send_text(model, &body, &credential).await {
        Ok(text) => Ok(Json(json!({ "text": text }))),
        Err(ProxyError::UpstreamHttp { status, message }) => Err(ApiError::new(
            StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
            format!("Google Gemini API Error: {}", message),
        )),
        Err(ProxyError::MalformedResponse(_)) => Err(ApiError::internal(
            "Received an invalid or empty response structure from the Gemini API.",
        )),
        Err(e) => {
            tracing::error!("Rubric grading failed: {}", e);
            Err(ApiError::internal(e.detail()))
        }
    }
}
