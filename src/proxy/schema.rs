// Tolerant matching of model-produced JSON objects

use serde::Serialize;
use serde_json::{Map, Value};

/// Matches an object key whose lowercase form contains every fragment.
#[derive(Debug, Clone, Copy)]
pub struct KeyMatcher {
    fragments: &'static [&'static str],
}

impl KeyMatcher {
    pub const fn new(fragments: &'static [&'static str]) -> Self {
        Self { fragments }
    }

    pub fn matches(&self, key: &str) -> bool {
        let lower = key.to_lowercase();
        self.fragments.iter().all(|f| lower.contains(f))
    }

    /// Values of every matching key, in object order.
    pub fn find<'a>(&self, object: &'a Map<String, Value>) -> impl Iterator<Item = &'a Value> + 'a {
        let matcher = *self;
        object
            .iter()
            .filter(move |(key, _)| matcher.matches(key))
            .map(|(_, value)| value)
    }
}

const STUDY_GUIDE_KEY: KeyMatcher = KeyMatcher::new(&["study", "guide"]);
const QUIZ_QUESTIONS_KEY: KeyMatcher = KeyMatcher::new(&["quiz", "question"]);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyGuideSchema {
    pub study_guide: String,
    pub quiz_questions: Vec<Value>,
}

impl StudyGuideSchema {
    /// Pull a study guide out of whatever keys the model chose.
    ///
    /// The guide must be a string (possibly empty) and the questions a
    /// non-empty array. When several keys match, the last usable one wins.
    pub fn extract(value: &Value) -> Option<Self> {
        let object = value.as_object()?;

        let study_guide = STUDY_GUIDE_KEY
            .find(object)
            .filter_map(|v| v.as_str())
            .last()?
            .to_string();

        let quiz_questions = QUIZ_QUESTIONS_KEY
            .find(object)
            .filter_map(|v| v.as_array())
            .filter(|a| !a.is_empty())
            .last()?
            .clone();

        Some(Self {
            study_guide,
            quiz_questions,
        })
    }
}

/// Remove a surrounding markdown code fence, if any.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let body = if let Some(rest) = trimmed.strip_prefix("```json") {
        rest
    } else if let Some(rest) = trimmed.strip_prefix("```") {
        rest
    } else {
        return trimmed;
    };
    body.strip_suffix("```").unwrap_or(body).trim()
}
