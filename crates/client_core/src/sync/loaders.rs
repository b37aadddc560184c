//! Background loaders. These run as detached tasks; their failures are
//! logged and never reach the operation that started them.

use std::{
    collections::{BTreeSet, HashSet},
    sync::Arc,
};

use chrono::Utc;
use shared::{
    domain::{ChannelId, Preference, UserId},
    error::ApiError,
};
use tracing::debug;

use super::SyncOrchestrator;
use crate::{
    error::{SyncError, SyncResult},
    selectors::{
        self, CATEGORY_CHANNEL_OPEN_TIME, CATEGORY_DIRECT_CHANNEL_SHOW,
        CATEGORY_GROUP_CHANNEL_SHOW,
    },
    store::{Action, EntitiesState},
    DetachedTask,
};

impl SyncOrchestrator {
    pub(super) fn spawn_load_roles(self: &Arc<Self>, names: BTreeSet<String>) {
        let this = Arc::clone(self);
        let task = DetachedTask::LoadRoles(names.iter().cloned().collect());
        self.spawn_detached(task, async move {
            let _ = this.load_roles_if_needed(names).await;
        });
    }

    pub(super) fn spawn_persist_preferences(
        self: &Arc<Self>,
        user_id: UserId,
        preferences: Vec<Preference>,
    ) {
        let this = Arc::clone(self);
        let task = DetachedTask::SavePreferences {
            user_id: user_id.clone(),
            count: preferences.len(),
        };
        self.spawn_detached(task, async move {
            let _ = this.persist_preferences(&user_id, &preferences).await;
        });
    }

    pub(super) fn spawn_load_profiles(self: &Arc<Self>, user_ids: Vec<UserId>) {
        let this = Arc::clone(self);
        self.spawn_detached(DetachedTask::LoadProfiles(user_ids.clone()), async move {
            let _ = this.load_missing_profiles(user_ids).await;
        });
    }

    pub(super) fn spawn_load_profiles_in_channel(self: &Arc<Self>, channel_id: ChannelId) {
        let this = Arc::clone(self);
        let task = DetachedTask::LoadProfilesInChannel(channel_id.clone());
        self.spawn_detached(task, async move {
            let _ = this.load_profiles_in_channel(&channel_id).await;
        });
    }

    /// Fetches the roles among `names` that are not cached yet.
    pub async fn load_roles_if_needed(&self, names: BTreeSet<String>) -> SyncResult<()> {
        let state = self.store.snapshot().await;
        let missing: Vec<String> = names
            .into_iter()
            .filter(|name| !name.is_empty() && !selectors::has_role(&state, name))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        match self.gateway.get_roles_by_names(&missing).await {
            Ok(roles) => {
                debug!(requested = missing.len(), received = roles.len(), "sync: roles loaded");
                self.store
                    .dispatch("load_roles", Action::ReceivedRoles(roles))
                    .await;
                Ok(())
            }
            Err(err) => self.report(err).await,
        }
    }

    /// Commits `preferences` locally, then persists them.
    pub async fn save_preferences(
        &self,
        user_id: &UserId,
        preferences: Vec<Preference>,
    ) -> SyncResult<()> {
        self.store
            .dispatch(
                "save_preferences",
                Action::ReceivedPreferences(preferences.clone()),
            )
            .await;
        self.persist_preferences(user_id, &preferences).await
    }

    async fn persist_preferences(
        &self,
        user_id: &UserId,
        preferences: &[Preference],
    ) -> SyncResult<()> {
        match self.gateway.save_preferences(user_id, preferences).await {
            Ok(()) => {
                debug!(user_id = %user_id, count = preferences.len(), "sync: preferences saved");
                Ok(())
            }
            Err(err) => self.report(err).await,
        }
    }

    /// Marks an unread direct channel as shown in the sidebar when the user
    /// had hidden it, and loads the peer's profile.
    pub async fn load_new_dm_if_needed(&self, channel_id: &ChannelId) -> SyncResult<()> {
        let state = self.store.snapshot().await;
        let current_user_id = selectors::current_user_id(&state)
            .cloned()
            .ok_or(SyncError::NotLoggedIn)?;
        let Some(peer_id) = selectors::channel(&state, channel_id)
            .and_then(|channel| selectors::direct_channel_peer_id(&state, channel))
        else {
            debug!(channel_id = %channel_id, "sync: not a known direct channel");
            return Ok(());
        };

        if selectors::preference_enabled(
            &state,
            &current_user_id,
            CATEGORY_DIRECT_CHANNEL_SHOW,
            peer_id.as_str(),
        ) {
            return Ok(());
        }

        let now = Utc::now().timestamp_millis();
        let preferences = vec![
            Preference::new(
                current_user_id.clone(),
                CATEGORY_DIRECT_CHANNEL_SHOW,
                peer_id.as_str(),
                "true",
            ),
            Preference::new(
                current_user_id.clone(),
                CATEGORY_CHANNEL_OPEN_TIME,
                channel_id.as_str(),
                now.to_string(),
            ),
        ];
        self.save_preferences(&current_user_id, preferences).await?;
        self.load_missing_profiles(vec![peer_id]).await
    }

    /// Group channel counterpart of [`Self::load_new_dm_if_needed`].
    pub async fn load_new_gm_if_needed(&self, channel_id: &ChannelId) -> SyncResult<()> {
        let state = self.store.snapshot().await;
        let current_user_id = selectors::current_user_id(&state)
            .cloned()
            .ok_or(SyncError::NotLoggedIn)?;

        if selectors::preference_enabled(
            &state,
            &current_user_id,
            CATEGORY_GROUP_CHANNEL_SHOW,
            channel_id.as_str(),
        ) {
            return Ok(());
        }

        let now = Utc::now().timestamp_millis();
        let preferences = vec![
            Preference::new(
                current_user_id.clone(),
                CATEGORY_GROUP_CHANNEL_SHOW,
                channel_id.as_str(),
                "true",
            ),
            Preference::new(
                current_user_id.clone(),
                CATEGORY_CHANNEL_OPEN_TIME,
                channel_id.as_str(),
                now.to_string(),
            ),
        ];
        self.save_preferences(&current_user_id, preferences).await?;
        self.load_profiles_in_channel(channel_id).await
    }

    /// Loads profiles for every direct channel peer and group channel member
    /// the sidebar shows and the store does not have yet.
    pub async fn load_profiles_for_sidebar(&self) {
        let state = self.store.snapshot().await;

        let peers: Vec<UserId> = selectors::direct_channels(&state)
            .filter_map(|channel| selectors::direct_channel_peer_id(&state, channel))
            .collect();
        let _ = self.load_missing_profiles(peers).await;

        let mut group_channel_ids: Vec<ChannelId> = selectors::group_channels(&state)
            .filter(|channel| !state.profiles_in_channel.contains_key(&channel.id))
            .map(|channel| channel.id.clone())
            .collect();
        group_channel_ids.sort();
        for channel_id in group_channel_ids {
            let _ = self.load_profiles_in_channel(&channel_id).await;
        }
    }

    async fn load_missing_profiles(&self, user_ids: Vec<UserId>) -> SyncResult<()> {
        let state = self.store.snapshot().await;
        let missing: BTreeSet<UserId> = user_ids
            .into_iter()
            .filter(|user_id| !state.users.contains_key(user_id))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        let missing: Vec<UserId> = missing.into_iter().collect();
        match self.gateway.get_profiles_by_ids(&missing).await {
            Ok(profiles) => {
                self.store
                    .dispatch("load_profiles", Action::ReceivedProfiles(profiles))
                    .await;
                Ok(())
            }
            Err(err) => self.report(err).await,
        }
    }

    async fn load_profiles_in_channel(&self, channel_id: &ChannelId) -> SyncResult<()> {
        match self.gateway.get_profiles_in_channel(channel_id).await {
            Ok(profiles) => {
                self.store
                    .dispatch(
                        "load_profiles_in_channel",
                        Action::ReceivedProfilesInChannel {
                            channel_id: channel_id.clone(),
                            profiles,
                        },
                    )
                    .await;
                Ok(())
            }
            Err(err) => self.report(err).await,
        }
    }

    /// Statuses for the current user and every direct channel peer. `None`
    /// when there is nobody to ask about.
    pub(super) async fn load_statuses_for_sidebar(
        &self,
        state: &EntitiesState,
    ) -> Option<Result<Action, ApiError>> {
        let mut seen = HashSet::new();
        let user_ids: Vec<UserId> = selectors::current_user_id(state)
            .cloned()
            .into_iter()
            .chain(
                selectors::direct_channels(state)
                    .filter_map(|channel| selectors::direct_channel_peer_id(state, channel)),
            )
            .filter(|user_id| seen.insert(user_id.clone()))
            .collect();
        if user_ids.is_empty() {
            return None;
        }

        Some(
            self.gateway
                .get_statuses_by_ids(&user_ids)
                .await
                .map(Action::ReceivedStatuses),
        )
    }

    async fn report(&self, err: ApiError) -> SyncResult<()> {
        self.handle_api_error(&err).await;
        Err(err.into())
    }
}
