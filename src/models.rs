// models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub is_superuser: bool,
    pub is_active: bool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Question {
    pub id: i64,
    pub title: String,
    pub text: String,
    pub pub_date: DateTime<Utc>,
    pub date_start: DateTime<Utc>,
    pub date_end: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Answer {
    pub id: i64,
    pub question_id: i64,
    pub answer_text: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Vote {
    pub id: i64,
    pub user_id: i64,
    pub question_id: i64,
    pub answer_id: i64,
}

/// One grouped (question, answer) row of the statistics query.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StatisticRow {
    pub question_id: i64,
    pub question_title: String,
    pub answer_id: i64,
    pub answer_text: String,
    pub total: i64,
    pub question_total: i64,
}

// Request bodies. Fields are optional so a missing one surfaces as a field error
// rather than a generic deserialization failure.

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

/// A record id as sent in a body: a JSON number, or text from a form field.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum IdField {
    Number(i64),
    Text(String),
}

impl IdField {
    pub fn parse(self, field: &'static str) -> Result<i64, ApiError> {
        match self {
            IdField::Number(id) => Ok(id),
            IdField::Text(text) => text
                .trim()
                .parse()
                .map_err(|_| ApiError::field(field, "A valid integer is required.")),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub answer: Option<IdField>,
}

// Response bodies.

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct SignOnResponse {
    pub user_id: i64,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct QuestionListItem {
    pub id: i64,
    pub title: String,
    pub pub_date: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct AnswerItem {
    pub id: i64,
    pub answer_text: String,
}

#[derive(Debug, Serialize)]
pub struct QuestionDetail {
    pub title: String,
    pub text: String,
    pub date_start: DateTime<Utc>,
    pub date_end: DateTime<Utc>,
    pub answer_set: Vec<AnswerItem>,
}

#[derive(Debug, Serialize)]
pub struct VoteResponse {
    pub question: i64,
    pub answer: i64,
}

#[derive(Debug, Serialize)]
pub struct Statistic {
    pub question: i64,
    #[serde(rename = "question__title")]
    pub question_title: String,
    pub answer: i64,
    #[serde(rename = "answer__answer_text")]
    pub answer_text: String,
    pub total: i64,
    pub question_total: i64,
    /// Share of the question's votes, two decimal places.
    pub frequency: String,
}

impl From<Question> for QuestionListItem {
    fn from(q: Question) -> Self {
        Self {
            id: q.id,
            title: q.title,
            pub_date: q.pub_date,
        }
    }
}

impl From<Answer> for AnswerItem {
    fn from(a: Answer) -> Self {
        Self {
            id: a.id,
            answer_text: a.answer_text,
        }
    }
}

impl QuestionDetail {
    pub fn new(question: Question, answers: Vec<Answer>) -> Self {
        Self {
            title: question.title,
            text: question.text,
            date_start: question.date_start,
            date_end: question.date_end,
            answer_set: answers.into_iter().map(AnswerItem::from).collect(),
        }
    }
}

impl From<Vote> for VoteResponse {
    fn from(v: Vote) -> Self {
        Self {
            question: v.question_id,
            answer: v.answer_id,
        }
    }
}

impl From<StatisticRow> for Statistic {
    fn from(row: StatisticRow) -> Self {
        let ratio = if row.question_total > 0 {
            row.total as f64 / row.question_total as f64
        } else {
            0.0
        };
        Self {
            question: row.question_id,
            question_title: row.question_title,
            answer: row.answer_id,
            answer_text: row.answer_text,
            total: row.total,
            question_total: row.question_total,
            frequency: format!("{ratio:.2}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(total: i64, question_total: i64) -> StatisticRow {
        StatisticRow {
            question_id: 1,
            question_title: "colour".into(),
            answer_id: 2,
            answer_text: "blue".into(),
            total,
            question_total,
        }
    }

    #[test]
    fn frequency_has_two_decimal_places() {
        assert_eq!(Statistic::from(row(1, 2)).frequency, "0.50");
        assert_eq!(Statistic::from(row(1, 3)).frequency, "0.33");
        assert_eq!(Statistic::from(row(2, 3)).frequency, "0.67");
        assert_eq!(Statistic::from(row(4, 4)).frequency, "1.00");
    }

    #[test]
    fn statistic_uses_related_field_names() {
        let value = serde_json::to_value(Statistic::from(row(1, 4))).unwrap();
        assert_eq!(
            value,
            json!({
                "question": 1,
                "question__title": "colour",
                "answer": 2,
                "answer__answer_text": "blue",
                "total": 1,
                "question_total": 4,
                "frequency": "0.25",
            })
        );
    }

    #[test]
    fn detail_nests_answers() {
        let now = Utc::now();
        let question = Question {
            id: 7,
            title: "t".into(),
            text: "body".into(),
            pub_date: now,
            date_start: now,
            date_end: now,
        };
        let answers = vec![Answer {
            id: 3,
            question_id: 7,
            answer_text: "yes".into(),
        }];
        let value = serde_json::to_value(QuestionDetail::new(question, answers)).unwrap();
        assert_eq!(value["answer_set"], json!([{ "id": 3, "answer_text": "yes" }]));
        assert!(value.get("id").is_none());
    }

    #[test]
    fn id_field_accepts_number_or_text() {
        let json: VoteRequest = serde_json::from_value(json!({ "answer": 5 })).unwrap();
        assert_eq!(json.answer.unwrap().parse("answer").unwrap(), 5);

        let text: VoteRequest = serde_json::from_value(json!({ "answer": "5" })).unwrap();
        assert_eq!(text.answer.unwrap().parse("answer").unwrap(), 5);

        let bad: VoteRequest = serde_json::from_value(json!({ "answer": "five" })).unwrap();
        assert!(matches!(
            bad.answer.unwrap().parse("answer"),
            Err(ApiError::Field { field: "answer", .. })
        ));
    }
}
