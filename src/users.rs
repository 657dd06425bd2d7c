// src/users.rs
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::Utc;
use rand::RngCore;
use sqlx::SqliteConnection;

use crate::db::DbPool;
use crate::models::User;

const USER_COLUMNS: &str = "id, username, password_hash, is_superuser, is_active";

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {e}"))?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    PasswordHash::new(password_hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// 40 lowercase hex characters.
pub fn generate_token() -> String {
    let mut bytes = [0_u8; 20];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Insert a user and issue its token in one transaction.
pub async fn create_user(
    pool: &DbPool,
    username: &str,
    password: &str,
    is_superuser: bool,
) -> anyhow::Result<User> {
    let password_hash = hash_password(password)?;

    let mut tx = pool.begin().await?;
    let user = sqlx::query_as::<_, User>(&format!(
        "INSERT INTO users (username, password_hash, is_superuser, is_active, date_joined)
         VALUES (?1, ?2, ?3, 1, ?4)
         RETURNING {USER_COLUMNS}"
    ))
    .bind(username)
    .bind(&password_hash)
    .bind(is_superuser)
    .bind(Utc::now())
    .fetch_one(&mut *tx)
    .await?;

    issue_token(&mut *tx, user.id).await?;
    tx.commit().await?;

    tracing::info!(user_id = user.id, username, "user created");
    Ok(user)
}

async fn issue_token(conn: &mut SqliteConnection, user_id: i64) -> Result<String, sqlx::Error> {
    let key = generate_token();
    sqlx::query("INSERT INTO auth_tokens (key, user_id, created) VALUES (?1, ?2, ?3)")
        .bind(&key)
        .bind(user_id)
        .bind(Utc::now())
        .execute(conn)
        .await?;
    Ok(key)
}

pub async fn get_user_by_username(pool: &DbPool, username: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"))
        .bind(username)
        .fetch_optional(pool)
        .await
}

pub async fn username_taken(pool: &DbPool, username: &str) -> Result<bool, sqlx::Error> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE username = ?1")
        .bind(username)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

/// Active user matching the credentials, if any.
pub async fn authenticate(
    pool: &DbPool,
    username: &str,
    password: &str,
) -> Result<Option<User>, sqlx::Error> {
    let user = get_user_by_username(pool, username).await?;
    Ok(user.filter(|u| u.is_active && verify_password(password, &u.password_hash)))
}

/// The user's token, issuing one if the user has none yet.
pub async fn token_for_user(pool: &DbPool, user_id: i64) -> Result<String, sqlx::Error> {
    let mut conn = pool.acquire().await?;
    let existing: Option<String> = sqlx::query_scalar("SELECT key FROM auth_tokens WHERE user_id = ?1")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;

    match existing {
        Some(key) => Ok(key),
        None => issue_token(&mut *conn, user_id).await,
    }
}

pub async fn user_for_token(pool: &DbPool, key: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(
        "SELECT u.id, u.username, u.password_hash, u.is_superuser, u.is_active
         FROM auth_tokens t JOIN users u ON u.id = t.user_id
         WHERE t.key = ?1",
    )
    .bind(key)
    .fetch_optional(pool)
    .await
}

pub async fn is_in_group(pool: &DbPool, user_id: i64, group: &str) -> Result<bool, sqlx::Error> {
    let found: Option<i64> = sqlx::query_scalar(
        "SELECT 1 FROM user_groups ug JOIN auth_groups g ON g.id = ug.group_id
         WHERE ug.user_id = ?1 AND g.name = ?2",
    )
    .bind(user_id)
    .bind(group)
    .fetch_optional(pool)
    .await?;
    Ok(found.is_some())
}

/// Adds the user to the named group, creating the group when absent.
pub async fn add_to_group(pool: &DbPool, user_id: i64, group: &str) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query("INSERT OR IGNORE INTO auth_groups (name) VALUES (?1)")
        .bind(group)
        .execute(&mut *tx)
        .await?;
    sqlx::query(
        "INSERT OR IGNORE INTO user_groups (user_id, group_id)
         SELECT ?1, id FROM auth_groups WHERE name = ?2",
    )
    .bind(user_id)
    .bind(group)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[test]
    fn tokens_are_forty_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 40);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(token, generate_token());
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("pass12345").unwrap();
        assert_ne!(hash, "pass12345");
        assert!(verify_password("pass12345", &hash));
        assert!(!verify_password("wrong", &hash));
        assert!(!verify_password("pass12345", "not-a-phc-string"));
    }

    #[tokio::test]
    async fn create_user_issues_token() {
        let pool = test_pool().await;
        let user = create_user(&pool, "test_account", "pass12345", false).await.unwrap();
        assert!(!user.is_superuser);

        let token = token_for_user(&pool, user.id).await.unwrap();
        let resolved = user_for_token(&pool, &token).await.unwrap().unwrap();
        assert_eq!(resolved.id, user.id);
        // get-or-create keeps returning the same key
        assert_eq!(token_for_user(&pool, user.id).await.unwrap(), token);
    }

    #[tokio::test]
    async fn duplicate_username_is_rejected() {
        let pool = test_pool().await;
        create_user(&pool, "dup", "pass12345", false).await.unwrap();
        assert!(username_taken(&pool, "dup").await.unwrap());
        assert!(create_user(&pool, "dup", "other", false).await.is_err());
    }

    #[tokio::test]
    async fn authenticate_checks_password() {
        let pool = test_pool().await;
        create_user(&pool, "alice", "secret", false).await.unwrap();
        assert!(authenticate(&pool, "alice", "secret").await.unwrap().is_some());
        assert!(authenticate(&pool, "alice", "nope").await.unwrap().is_none());
        assert!(authenticate(&pool, "bob", "secret").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn group_membership() {
        let pool = test_pool().await;
        let user = create_user(&pool, "client", "secret", false).await.unwrap();
        assert!(!is_in_group(&pool, user.id, "Clients").await.unwrap());
        add_to_group(&pool, user.id, "Clients").await.unwrap();
        // idempotent
        add_to_group(&pool, user.id, "Clients").await.unwrap();
        assert!(is_in_group(&pool, user.id, "Clients").await.unwrap());
        assert!(!is_in_group(&pool, user.id, "Staff").await.unwrap());
    }
}
