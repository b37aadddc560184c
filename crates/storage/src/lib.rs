use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::domain::{TeamId, UserId};

const PREVIOUS_TEAM_KEY_PREFIX: &str = "user_prev_team:";
const TEAM_JOINED_ON_LOAD_KEY: &str = "team_id_joined_on_load";

/// Durable key/value storage for client-side session hints.
#[derive(Clone)]
pub struct ClientStorage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone)]
pub struct StoredItem {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

impl ClientStorage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // Every connection to an in-memory database sees its own empty schema.
        let max_connections = if database_url.contains(":memory:") {
            1
        } else {
            5
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO client_kv (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value=excluded.value, updated_at=excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to store client item '{key}'"))?;
        Ok(())
    }

    pub async fn get_item(&self, key: &str) -> Result<Option<StoredItem>> {
        let row = sqlx::query("SELECT key, value, updated_at FROM client_kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to read client item '{key}'"))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let updated_at: String = row.try_get("updated_at")?;
        let updated_at = DateTime::parse_from_rfc3339(&updated_at)
            .map(|value| value.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        Ok(Some(StoredItem {
            key: row.try_get("key")?,
            value: row.try_get("value")?,
            updated_at,
        }))
    }

    pub async fn remove_item(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM client_kv WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to remove client item '{key}'"))?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_previous_team_id(&self, user_id: &UserId, team_id: &TeamId) -> Result<()> {
        self.set_item(&previous_team_key(user_id), team_id.as_str())
            .await
    }

    pub async fn previous_team_id(&self, user_id: &UserId) -> Result<Option<TeamId>> {
        Ok(self
            .get_item(&previous_team_key(user_id))
            .await?
            .map(|item| TeamId::new(item.value)))
    }

    pub async fn set_team_id_joined_on_load(&self, team_id: &TeamId) -> Result<()> {
        self.set_item(TEAM_JOINED_ON_LOAD_KEY, team_id.as_str())
            .await
    }

    pub async fn team_id_joined_on_load(&self) -> Result<Option<TeamId>> {
        Ok(self
            .get_item(TEAM_JOINED_ON_LOAD_KEY)
            .await?
            .map(|item| TeamId::new(item.value)))
    }

    /// Clears the joined-on-load marker once the welcome flow has consumed it.
    pub async fn take_team_id_joined_on_load(&self) -> Result<Option<TeamId>> {
        let team_id = self.team_id_joined_on_load().await?;
        if team_id.is_some() {
            self.remove_item(TEAM_JOINED_ON_LOAD_KEY).await?;
        }
        Ok(team_id)
    }
}

fn previous_team_key(user_id: &UserId) -> String {
    format!("{PREVIOUS_TEAM_KEY_PREFIX}{user_id}")
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.contains(":memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
