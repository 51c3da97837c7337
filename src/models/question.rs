use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Directory name that marks a stored field as an image reference.
pub const IMAGE_DIR_NAME: &str = "Images";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Question {
    pub question_id: i32,
    pub subject: Option<String>,
    pub topic: Option<String>,
    pub difficulty_level: Option<String>,
    pub question_text: Option<String>,
    pub option_a: Option<String>,
    pub option_b: Option<String>,
    pub option_c: Option<String>,
    pub option_d: Option<String>,
    pub correct_answer: Option<String>,
    pub created_by: Option<i32>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A row assembled by the import, not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewQuestion {
    pub subject: String,
    pub topic: String,
    pub difficulty_level: String,
    pub question_text: String,
    pub option_a: String,
    pub option_b: String,
    pub option_c: String,
    pub option_d: String,
    pub correct_answer: String,
    pub created_by: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NewQuestion {
    pub fn key(&self) -> QuestionKey {
        QuestionKey {
            subject: self.subject.clone(),
            topic: self.topic.clone(),
            question_text: self.question_text.clone(),
        }
    }
}

/// Natural key used when deciding whether an imported row repeats a stored one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuestionKey {
    pub subject: String,
    pub topic: String,
    pub question_text: String,
}

impl Question {
    pub fn key(&self) -> QuestionKey {
        QuestionKey {
            subject: self.subject.clone().unwrap_or_default(),
            topic: self.topic.clone().unwrap_or_default(),
            question_text: self.question_text.clone().unwrap_or_default(),
        }
    }
}

/// What a stored text field actually holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldContent<'a> {
    Empty,
    Image(&'a str),
    Text(&'a str),
}

impl<'a> FieldContent<'a> {
    pub fn classify(value: Option<&'a str>) -> Self {
        match value {
            None => FieldContent::Empty,
            Some(v) if v.is_empty() => FieldContent::Empty,
            Some(v) if is_image_reference(v) => FieldContent::Image(v),
            Some(v) => FieldContent::Text(v),
        }
    }
}

/// Case-sensitive check for `Images/` or `Images\` at the start of a value.
pub fn is_image_reference(value: &str) -> bool {
    value
        .strip_prefix(IMAGE_DIR_NAME)
        .map(|rest| rest.starts_with('/') || rest.starts_with('\\'))
        .unwrap_or(false)
}
