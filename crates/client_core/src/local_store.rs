use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use shared::domain::{TeamId, UserId};
use storage::ClientStorage;
use tokio::sync::Mutex;

/// Durable client-side hints read by the UI on the next load.
#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn set_previous_team_id(&self, user_id: &UserId, team_id: &TeamId) -> Result<()>;
    async fn previous_team_id(&self, user_id: &UserId) -> Result<Option<TeamId>>;
    async fn set_team_id_joined_on_load(&self, team_id: &TeamId) -> Result<()>;
    async fn team_id_joined_on_load(&self) -> Result<Option<TeamId>>;
}

#[async_trait]
impl LocalStore for ClientStorage {
    async fn set_previous_team_id(&self, user_id: &UserId, team_id: &TeamId) -> Result<()> {
        ClientStorage::set_previous_team_id(self, user_id, team_id).await
    }

    async fn previous_team_id(&self, user_id: &UserId) -> Result<Option<TeamId>> {
        ClientStorage::previous_team_id(self, user_id).await
    }

    async fn set_team_id_joined_on_load(&self, team_id: &TeamId) -> Result<()> {
        ClientStorage::set_team_id_joined_on_load(self, team_id).await
    }

    async fn team_id_joined_on_load(&self) -> Result<Option<TeamId>> {
        ClientStorage::team_id_joined_on_load(self).await
    }
}

/// Process-local [`LocalStore`] for sessions without a database.
#[derive(Default)]
pub struct MemoryLocalStore {
    previous_teams: Mutex<HashMap<UserId, TeamId>>,
    team_joined_on_load: Mutex<Option<TeamId>>,
}

#[async_trait]
impl LocalStore for MemoryLocalStore {
    async fn set_previous_team_id(&self, user_id: &UserId, team_id: &TeamId) -> Result<()> {
        self.previous_teams
            .lock()
            .await
            .insert(user_id.clone(), team_id.clone());
        Ok(())
    }

    async fn previous_team_id(&self, user_id: &UserId) -> Result<Option<TeamId>> {
        Ok(self.previous_teams.lock().await.get(user_id).cloned())
    }

    async fn set_team_id_joined_on_load(&self, team_id: &TeamId) -> Result<()> {
        *self.team_joined_on_load.lock().await = Some(team_id.clone());
        Ok(())
    }

    async fn team_id_joined_on_load(&self) -> Result<Option<TeamId>> {
        Ok(self.team_joined_on_load.lock().await.clone())
    }
}
