// src/cli.rs
use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

use crate::db::DbPool;
use crate::{poll, users};

#[derive(Debug, Parser)]
#[command(name = "timed-polls", about = "HTTP API for timed polls")]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Create an account with superuser rights
    CreateSuperuser {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Add an existing account to a group, creating the group if needed
    AddToGroup {
        #[arg(long)]
        username: String,
        #[arg(long)]
        group: String,
    },
    /// Publish a poll with its answer options
    CreatePoll {
        /// Username of the poll owner
        #[arg(long)]
        owner: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        text: String,
        /// Activation start, RFC 3339
        #[arg(long)]
        start: DateTime<Utc>,
        /// Activation end, RFC 3339
        #[arg(long)]
        end: DateTime<Utc>,
        /// Answer option text; repeat for each option
        #[arg(long = "answer", required = true)]
        answers: Vec<String>,
    },
}

/// Runs an administrative command against the datastore.
pub async fn run_admin(pool: &DbPool, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Serve => bail!("serve is not an administrative command"),
        Command::CreateSuperuser { username, password } => {
            if users::username_taken(pool, &username).await? {
                bail!("user {username} already exists");
            }
            let user = users::create_user(pool, &username, &password, true).await?;
            println!("created superuser {} (id {})", user.username, user.id);
        }
        Command::AddToGroup { username, group } => {
            let user = users::get_user_by_username(pool, &username)
                .await?
                .with_context(|| format!("no user named {username}"))?;
            users::add_to_group(pool, user.id, &group).await?;
            println!("added {username} to {group}");
        }
        Command::CreatePoll {
            owner,
            title,
            text,
            start,
            end,
            answers,
        } => {
            let owner = users::get_user_by_username(pool, &owner)
                .await?
                .with_context(|| format!("no user named {owner}"))?;
            if start >= end {
                tracing::warn!(%start, %end, "poll window is empty; it will never be active");
            }
            let question = poll::create_question(pool, owner.id, &title, &text, start, end).await?;
            for answer in &answers {
                poll::create_answer(pool, question.id, answer).await?;
            }
            println!(
                "created poll {} with {} answer(s)",
                question.id,
                answers.len()
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[test]
    fn no_subcommand_means_serve() {
        let args = Args::try_parse_from(["timed-polls"]).unwrap();
        assert!(args.command.is_none());
    }

    #[test]
    fn create_poll_parses_dates_and_answers() {
        let args = Args::try_parse_from([
            "timed-polls",
            "create-poll",
            "--owner",
            "admin",
            "--title",
            "Lunch",
            "--text",
            "Where to?",
            "--start",
            "2026-01-01T00:00:00Z",
            "--end",
            "2026-01-08T00:00:00Z",
            "--answer",
            "Pizza",
            "--answer",
            "Sushi",
        ])
        .unwrap();
        match args.command {
            Some(Command::CreatePoll { answers, start, .. }) => {
                assert_eq!(answers, vec!["Pizza", "Sushi"]);
                assert_eq!(start.to_rfc3339(), "2026-01-01T00:00:00+00:00");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[tokio::test]
    async fn admin_commands_populate_the_store() {
        let pool = test_pool().await;
        run_admin(
            &pool,
            Command::CreateSuperuser {
                username: "admin".into(),
                password: "secret".into(),
            },
        )
        .await
        .unwrap();
        run_admin(
            &pool,
            Command::AddToGroup {
                username: "admin".into(),
                group: "Clients".into(),
            },
        )
        .await
        .unwrap();

        let now = Utc::now();
        run_admin(
            &pool,
            Command::CreatePoll {
                owner: "admin".into(),
                title: "Lunch".into(),
                text: "Where to?".into(),
                start: now - chrono::Duration::hours(1),
                end: now + chrono::Duration::days(1),
                answers: vec!["Pizza".into(), "Sushi".into()],
            },
        )
        .await
        .unwrap();

        let admin = users::get_user_by_username(&pool, "admin").await.unwrap().unwrap();
        assert!(admin.is_superuser);
        assert!(users::is_in_group(&pool, admin.id, "Clients").await.unwrap());

        let open = poll::list_active(&pool, Utc::now()).await.unwrap();
        assert_eq!(open.len(), 1);
        let answers = poll::answers_for(&pool, open[0].id).await.unwrap();
        assert_eq!(answers.len(), 2);
    }

    #[tokio::test]
    async fn create_poll_needs_known_owner() {
        let pool = test_pool().await;
        let now = Utc::now();
        let err = run_admin(
            &pool,
            Command::CreatePoll {
                owner: "ghost".into(),
                title: "t".into(),
                text: "t".into(),
                start: now,
                end: now,
                answers: vec!["a".into()],
            },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }
}
