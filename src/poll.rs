// src/poll.rs
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db::{is_unique_violation, DbPool};
use crate::models::{Answer, Question, StatisticRow, Vote};

const QUESTION_COLUMNS: &str = "id, title, text, pub_date, date_start, date_end";

// Timestamps are stored as RFC 3339 text; julianday() compares them as instants.
const ACTIVE_FILTER: &str = "julianday(date_start) < julianday(?1) AND julianday(date_end) > julianday(?1)";

/// Why a vote was refused. The display text is what the caller sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VoteRejection {
    #[error("Answer is not valid")]
    ForeignAnswer,
    #[error("Question is not active")]
    Inactive,
    #[error("Already voted")]
    AlreadyVoted,
}

#[derive(Debug, Error)]
pub enum VoteError {
    #[error(transparent)]
    Rejected(#[from] VoteRejection),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl Question {
    /// Voting accepts both window boundaries.
    pub fn accepts_votes_at(&self, now: DateTime<Utc>) -> bool {
        self.date_start <= now && now <= self.date_end
    }
}

/// Checks a prospective vote. The first failing rule wins.
pub fn check_vote(
    question: &Question,
    answer: &Answer,
    now: DateTime<Utc>,
    already_voted: bool,
) -> Result<(), VoteRejection> {
    if answer.question_id != question.id {
        return Err(VoteRejection::ForeignAnswer);
    }
    if !question.accepts_votes_at(now) {
        return Err(VoteRejection::Inactive);
    }
    if already_voted {
        return Err(VoteRejection::AlreadyVoted);
    }
    Ok(())
}

pub async fn list_active(pool: &DbPool, now: DateTime<Utc>) -> Result<Vec<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "SELECT {QUESTION_COLUMNS} FROM questions WHERE {ACTIVE_FILTER} ORDER BY id"
    ))
    .bind(now)
    .fetch_all(pool)
    .await
}

pub async fn get_active(
    pool: &DbPool,
    id: i64,
    now: DateTime<Utc>,
) -> Result<Option<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "SELECT {QUESTION_COLUMNS} FROM questions WHERE {ACTIVE_FILTER} AND id = ?2"
    ))
    .bind(now)
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn get_question(pool: &DbPool, id: i64) -> Result<Option<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!("SELECT {QUESTION_COLUMNS} FROM questions WHERE id = ?1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn answers_for(pool: &DbPool, question_id: i64) -> Result<Vec<Answer>, sqlx::Error> {
    sqlx::query_as::<_, Answer>(
        "SELECT id, question_id, answer_text FROM answers WHERE question_id = ?1 ORDER BY id",
    )
    .bind(question_id)
    .fetch_all(pool)
    .await
}

pub async fn get_answer(pool: &DbPool, id: i64) -> Result<Option<Answer>, sqlx::Error> {
    sqlx::query_as::<_, Answer>("SELECT id, question_id, answer_text FROM answers WHERE id = ?1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn has_voted(pool: &DbPool, user_id: i64, question_id: i64) -> Result<bool, sqlx::Error> {
    let found: Option<i64> =
        sqlx::query_scalar("SELECT id FROM votes WHERE user_id = ?1 AND question_id = ?2")
            .bind(user_id)
            .bind(question_id)
            .fetch_optional(pool)
            .await?;
    Ok(found.is_some())
}

/// Stores a vote. A concurrent duplicate that slipped past `has_voted`
/// trips the (user, question) constraint and is reported as already voted.
pub async fn insert_vote(
    pool: &DbPool,
    user_id: i64,
    question_id: i64,
    answer_id: i64,
) -> Result<Vote, VoteError> {
    sqlx::query_as::<_, Vote>(
        "INSERT INTO votes (user_id, question_id, answer_id)
         VALUES (?1, ?2, ?3)
         RETURNING id, user_id, question_id, answer_id",
    )
    .bind(user_id)
    .bind(question_id)
    .bind(answer_id)
    .fetch_one(pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            VoteError::Rejected(VoteRejection::AlreadyVoted)
        } else {
            VoteError::Database(e)
        }
    })
}

/// Validates and records a vote for `question`.
pub async fn cast_vote(
    pool: &DbPool,
    user_id: i64,
    question: &Question,
    answer: &Answer,
    now: DateTime<Utc>,
) -> Result<Vote, VoteError> {
    let already_voted = has_voted(pool, user_id, question.id).await?;
    check_vote(question, answer, now, already_voted)?;
    insert_vote(pool, user_id, question.id, answer.id).await
}

pub async fn create_question(
    pool: &DbPool,
    owner_id: i64,
    title: &str,
    text: &str,
    date_start: DateTime<Utc>,
    date_end: DateTime<Utc>,
) -> Result<Question, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "INSERT INTO questions (title, text, owner_id, pub_date, date_start, date_end)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         RETURNING {QUESTION_COLUMNS}"
    ))
    .bind(title)
    .bind(text)
    .bind(owner_id)
    .bind(Utc::now())
    .bind(date_start)
    .bind(date_end)
    .fetch_one(pool)
    .await
}

pub async fn create_answer(
    pool: &DbPool,
    question_id: i64,
    answer_text: &str,
) -> Result<Answer, sqlx::Error> {
    sqlx::query_as::<_, Answer>(
        "INSERT INTO answers (question_id, answer_text) VALUES (?1, ?2)
         RETURNING id, question_id, answer_text",
    )
    .bind(question_id)
    .bind(answer_text)
    .fetch_one(pool)
    .await
}

/// Vote counts per (question, answer), with the question's overall count.
pub async fn statistics(pool: &DbPool) -> Result<Vec<StatisticRow>, sqlx::Error> {
    sqlx::query_as::<_, StatisticRow>(
        r#"
        SELECT v.question_id AS question_id,
               q.title AS question_title,
               v.answer_id AS answer_id,
               a.answer_text AS answer_text,
               COUNT(*) AS total,
               (SELECT COUNT(*) FROM votes qv WHERE qv.question_id = v.question_id) AS question_total
        FROM votes v
        JOIN questions q ON q.id = v.question_id
        JOIN answers a ON a.id = v.answer_id
        GROUP BY v.question_id, v.answer_id
        ORDER BY v.question_id, v.answer_id
        "#,
    )
    .fetch_all(pool)
    .await
}
