// handlers.rs
use axum::{
    extract::{rejection::PathRejection, Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;

use crate::auth::{AuthUser, ClientUser};
use crate::db::is_unique_violation;
use crate::error::ApiError;
use crate::extract::Payload;
use crate::models::{
    Credentials, QuestionDetail, QuestionListItem, SignOnResponse, Statistic, TokenResponse,
    VoteRequest, VoteResponse,
};
use crate::poll::{self, VoteError};
use crate::state::AppState;
use crate::users;

const MAX_USERNAME_LEN: usize = 150;

/// Pulls a non-blank string field out of a request body.
fn required_field(value: Option<String>, field: &'static str) -> Result<String, ApiError> {
    match value {
        None => Err(ApiError::required(field)),
        Some(v) if v.trim().is_empty() => Err(ApiError::field(field, "This field may not be blank.")),
        Some(v) => Ok(v),
    }
}

fn username_exists() -> ApiError {
    ApiError::field("username", "A user with that username already exists.")
}

/// A registration that lost a race on the username constraint is reported
/// like any other taken username.
fn registration_error(err: anyhow::Error) -> ApiError {
    match err.downcast::<sqlx::Error>() {
        Ok(e) if is_unique_violation(&e) => username_exists(),
        Ok(e) => e.into(),
        Err(other) => other.into(),
    }
}

/// Exchange credentials for the user's token
pub async fn obtain_token(
    State(state): State<AppState>,
    Payload(credentials): Payload<Credentials>,
) -> Result<Json<TokenResponse>, ApiError> {
    let username = required_field(credentials.username, "username")?;
    let password = required_field(credentials.password, "password")?;

    let Some(user) = users::authenticate(&state.pool, &username, &password).await? else {
        tracing::warn!(%username, "login failed");
        return Err(ApiError::field(
            "non_field_errors",
            "Unable to log in with provided credentials.",
        ));
    };

    let token = users::token_for_user(&state.pool, user.id).await?;
    Ok(Json(TokenResponse { token }))
}

/// Register a new account and hand back its token
pub async fn sign_on(
    State(state): State<AppState>,
    Payload(credentials): Payload<Credentials>,
) -> Result<(StatusCode, Json<SignOnResponse>), ApiError> {
    let username = required_field(credentials.username, "username")?;
    let password = required_field(credentials.password, "password")?;

    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(ApiError::field(
            "username",
            format!("Ensure this field has no more than {MAX_USERNAME_LEN} characters."),
        ));
    }
    if users::username_taken(&state.pool, &username).await? {
        return Err(username_exists());
    }

    let user = users::create_user(&state.pool, &username, &password, false)
        .await
        .map_err(registration_error)?;
    let token = users::token_for_user(&state.pool, user.id).await?;

    Ok((
        StatusCode::CREATED,
        Json(SignOnResponse {
            user_id: user.id,
            token,
        }),
    ))
}

/// List questions that are currently open
pub async fn list_questions(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> Result<Json<Vec<QuestionListItem>>, ApiError> {
    let questions = poll::list_active(&state.pool, Utc::now()).await?;
    Ok(Json(questions.into_iter().map(QuestionListItem::from).collect()))
}

/// Detail of an open question with its answer options
pub async fn question_detail(
    State(state): State<AppState>,
    _auth: AuthUser,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<QuestionDetail>, ApiError> {
    let Path(id) = path?;
    let question = poll::get_active(&state.pool, id, Utc::now())
        .await?
        .ok_or(ApiError::NotFound)?;
    let answers = poll::answers_for(&state.pool, question.id).await?;
    Ok(Json(QuestionDetail::new(question, answers)))
}

/// Vote for an answer of a question
pub async fn vote(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    path: Result<Path<i64>, PathRejection>,
    Payload(request): Payload<VoteRequest>,
) -> Result<(StatusCode, Json<VoteResponse>), ApiError> {
    let Path(id) = path?;
    let answer_id = request
        .answer
        .ok_or_else(|| ApiError::required("answer"))?
        .parse("answer")?;

    let question = poll::get_question(&state.pool, id)
        .await?
        .ok_or(ApiError::NotFound)?;
    let answer = poll::get_answer(&state.pool, answer_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    match poll::cast_vote(&state.pool, user.id, &question, &answer, Utc::now()).await {
        Ok(vote) => {
            tracing::info!(
                vote_id = vote.id,
                user_id = vote.user_id,
                question_id = question.id,
                answer_id,
                "vote recorded"
            );
            Ok((StatusCode::CREATED, Json(VoteResponse::from(vote))))
        }
        Err(VoteError::Rejected(reason)) => {
            tracing::warn!(user_id = user.id, question_id = question.id, %reason, "vote rejected");
            Err(ApiError::Validation(reason.to_string()))
        }
        Err(VoteError::Database(e)) => Err(e.into()),
    }
}

/// Aggregate vote counts for privileged clients
pub async fn statistics(
    State(state): State<AppState>,
    ClientUser(client): ClientUser,
) -> Result<Json<Vec<Statistic>>, ApiError> {
    let rows = poll::statistics(&state.pool).await?;
    tracing::debug!(user_id = client.id, rows = rows.len(), "statistics served");
    Ok(Json(rows.into_iter().map(Statistic::from).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn lost_username_race_is_a_field_error() {
        let pool = test_pool().await;
        users::create_user(&pool, "twin", "pass12345", false).await.unwrap();
        let err = users::create_user(&pool, "twin", "pass12345", false)
            .await
            .unwrap_err();

        match registration_error(err) {
            ApiError::Field { field, message } => {
                assert_eq!(field, "username");
                assert_eq!(message, "A user with that username already exists.");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn other_registration_failures_stay_internal() {
        let err = registration_error(anyhow::anyhow!("password hashing failed"));
        assert!(matches!(err, ApiError::Internal(_)));
    }
}
