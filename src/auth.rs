// src/auth.rs
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};

use crate::error::ApiError;
use crate::models::User;
use crate::state::AppState;
use crate::users;

/// A request carrying a valid `Authorization: Token <key>` header.
pub struct AuthUser(pub User);

/// An authenticated superuser or member of the configured clients group.
pub struct ClientUser(pub User);

fn extract_token(parts: &Parts) -> Option<&str> {
    let raw = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())?;

    let mut words = raw.split_whitespace();
    match (words.next(), words.next(), words.next()) {
        (Some(scheme), Some(key), None) if scheme.eq_ignore_ascii_case("token") => Some(key),
        _ => None,
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let key = extract_token(parts).ok_or(ApiError::Unauthorized)?;

        let user = users::user_for_token(&state.pool, key)
            .await?
            .filter(|u| u.is_active)
            .ok_or(ApiError::InvalidToken)?;

        Ok(AuthUser(user))
    }
}

impl FromRequestParts<AppState> for ClientUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;

        if is_client(state, &user).await? {
            Ok(ClientUser(user))
        } else {
            Err(ApiError::Forbidden)
        }
    }
}

pub async fn is_client(state: &AppState, user: &User) -> Result<bool, sqlx::Error> {
    if user.is_superuser {
        return Ok(true);
    }
    users::is_in_group(&state.pool, user.id, &state.config.clients_group).await
}
