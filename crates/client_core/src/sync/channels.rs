use std::{collections::BTreeSet, sync::Arc};

use chrono::Utc;
use futures::future::join_all;
use shared::{
    domain::{
        direct_channel_name, Channel, ChannelId, ChannelMembership, ChannelType,
        NotificationLevel, Preference, TeamId, UserId,
    },
    error::ApiError,
    protocol::ChannelQueryScope,
};
use tracing::{debug, info};

use super::SyncOrchestrator;
use crate::{
    error::{SyncError, SyncResult},
    selectors::{
        self, CATEGORY_CHANNEL_OPEN_TIME, CATEGORY_DIRECT_CHANNEL_SHOW,
        CATEGORY_GROUP_CHANNEL_SHOW,
    },
    store::{Action, Batch},
    ClientEvent, DetachedTask,
};

/// Channels and the current user's memberships in them, as committed to the
/// store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelsAndMembers {
    pub channels: Vec<Channel>,
    pub channel_members: Vec<ChannelMembership>,
}

impl SyncOrchestrator {
    /// Loads channels and memberships in one GraphQL round trip, scoped to
    /// `team_id` or to every team of the user when `None`.
    pub async fn fetch_channels_and_members(
        self: &Arc<Self>,
        team_id: Option<&TeamId>,
    ) -> SyncResult<ChannelsAndMembers> {
        let team_id = team_id.filter(|team_id| !team_id.is_empty());
        let scope = match team_id {
            Some(team_id) => ChannelQueryScope::Team(team_id.clone()),
            None => ChannelQueryScope::AllTeams,
        };

        let payload = match self.gateway.fetch_channels_and_members(&scope).await {
            Ok(payload) => payload,
            Err(err) => {
                self.log_error(&err).await;
                return Err(err.into());
            }
        };
        let Some(payload) = payload.filter(|payload| !payload.is_empty()) else {
            debug!(scope = ?scope, "sync: no channels returned");
            return Ok(ChannelsAndMembers::default());
        };

        let state = self.store.snapshot().await;
        let Some(current_user_id) = selectors::current_user_id(&state).cloned() else {
            let err = SyncError::NotLoggedIn;
            self.handle_sync_error(&err).await;
            return Err(err);
        };

        let role_names: BTreeSet<String> = payload
            .channel_members
            .iter()
            .flat_map(|member| member.roles.iter().map(|role| role.name.clone()))
            .collect();
        let channels: Vec<Channel> = payload.channels.into_iter().map(Channel::from).collect();
        let channel_members: Vec<ChannelMembership> = payload
            .channel_members
            .into_iter()
            .map(|member| member.into_membership(&current_user_id))
            .collect();

        self.store
            .commit(Batch::new(
                "fetch_channels_and_members",
                vec![
                    Action::ReceivedAllChannels(channels.clone()),
                    Action::ReceivedMyChannelMembers {
                        members: channel_members.clone(),
                        current_user_id,
                    },
                ],
            ))
            .await;
        info!(
            scope = ?scope,
            channels = channels.len(),
            members = channel_members.len(),
            "sync: channels and members received"
        );

        if team_id.is_some() && !role_names.is_empty() {
            self.spawn_load_roles(role_names);
        }

        Ok(ChannelsAndMembers {
            channels,
            channel_members,
        })
    }

    /// REST variant of the channel load used by team initialization. Errors
    /// are returned untouched for the caller to report.
    pub async fn fetch_my_channels_and_members(
        self: &Arc<Self>,
        team_id: &TeamId,
    ) -> Result<ChannelsAndMembers, ApiError> {
        let (channels, channel_members) = futures::try_join!(
            self.gateway.get_my_channels(team_id),
            self.gateway.get_my_channel_members(team_id),
        )?;

        let state = self.store.snapshot().await;
        let mut actions = vec![Action::ReceivedChannels {
            team_id: team_id.clone(),
            channels: channels.clone(),
        }];
        if let Some(current_user_id) = selectors::current_user_id(&state) {
            actions.push(Action::ReceivedMyChannelMembers {
                members: channel_members.clone(),
                current_user_id: current_user_id.clone(),
            });
        }
        self.store
            .commit(Batch::new("fetch_my_channels_and_members", actions))
            .await;

        let role_names: BTreeSet<String> = channel_members
            .iter()
            .flat_map(|member| member.role_names().map(str::to_string))
            .collect();
        if !role_names.is_empty() {
            self.spawn_load_roles(role_names);
        }

        Ok(ChannelsAndMembers {
            channels,
            channel_members,
        })
    }

    /// Refreshes the current team's channels, then prefetches unread direct
    /// and group channels and sidebar profiles in the background. Reports
    /// scheduling success only.
    pub async fn load_channels_for_current_user(self: &Arc<Self>) -> SyncResult<bool> {
        let state = self.store.snapshot().await;
        let unreads = selectors::unread_channel_ids(&state);

        match selectors::current_team_id(&state) {
            Some(team_id) => {
                if let Err(err) = self.fetch_my_channels_and_members(team_id).await {
                    self.handle_api_error(&err).await;
                }
            }
            None => debug!("sync: no current team, skipping channel refresh"),
        }

        for channel_id in unreads {
            let Some(channel) = selectors::channel(&state, &channel_id) else {
                continue;
            };
            match channel.channel_type {
                ChannelType::Direct => {
                    let this = Arc::clone(self);
                    let id = channel.id.clone();
                    self.spawn_detached(DetachedTask::LoadNewDm(channel.id.clone()), async move {
                        let _ = this.load_new_dm_if_needed(&id).await;
                    });
                }
                ChannelType::Group => {
                    let this = Arc::clone(self);
                    let id = channel.id.clone();
                    self.spawn_detached(DetachedTask::LoadNewGm(channel.id.clone()), async move {
                        let _ = this.load_new_gm_if_needed(&id).await;
                    });
                }
                ChannelType::Open | ChannelType::Private => {}
            }
        }

        let this = Arc::clone(self);
        self.spawn_detached(DetachedTask::LoadProfilesForSidebar, async move {
            this.load_profiles_for_sidebar().await;
        });

        Ok(true)
    }

    /// Opens the direct channel with `user_id`, creating it when it is not
    /// known locally.
    pub async fn open_direct_channel_to_user_id(
        self: &Arc<Self>,
        user_id: &UserId,
    ) -> SyncResult<Channel> {
        let state = self.store.snapshot().await;
        let current_user_id = selectors::current_user_id(&state)
            .cloned()
            .ok_or(SyncError::NotLoggedIn)?;
        let channel_name = direct_channel_name(&current_user_id, user_id);

        let Some(channel) = selectors::channel_by_name(&state, &channel_name).cloned() else {
            return self.create_direct_channel(&current_user_id, user_id).await;
        };

        let now = Utc::now().timestamp_millis();
        let show = Preference::new(
            current_user_id.clone(),
            CATEGORY_DIRECT_CHANNEL_SHOW,
            user_id.as_str(),
            "true",
        );
        let open_time = Preference::new(
            current_user_id.clone(),
            CATEGORY_CHANNEL_OPEN_TIME,
            channel.id.as_str(),
            now.to_string(),
        );
        self.store
            .commit(Batch::new(
                "open_direct_channel",
                vec![
                    Action::ReceivedPreferences(vec![show.clone()]),
                    Action::ReceivedPreferences(vec![open_time.clone()]),
                ],
            ))
            .await;
        self.spawn_persist_preferences(current_user_id, vec![show, open_time]);

        Ok(channel)
    }

    /// Creates a group channel for `user_ids`. On failure the UI is sent
    /// back to the current team.
    pub async fn open_group_channel_to_user_ids(
        self: &Arc<Self>,
        user_ids: &[UserId],
    ) -> SyncResult<Channel> {
        let result = self.create_group_channel(user_ids).await;
        if result.is_err() {
            let url = selectors::current_team_url(&*self.store.snapshot().await);
            self.emit(ClientEvent::Navigate { url });
        }
        result
    }

    pub async fn create_direct_channel(
        self: &Arc<Self>,
        current_user_id: &UserId,
        other_user_id: &UserId,
    ) -> SyncResult<Channel> {
        let channel = match self
            .gateway
            .create_direct_channel(current_user_id, other_user_id)
            .await
        {
            Ok(channel) => channel,
            Err(err) => {
                self.handle_api_error(&err).await;
                return Err(err.into());
            }
        };

        let now = Utc::now().timestamp_millis();
        let preferences = vec![
            Preference::new(
                current_user_id.clone(),
                CATEGORY_DIRECT_CHANNEL_SHOW,
                other_user_id.as_str(),
                "true",
            ),
            Preference::new(
                current_user_id.clone(),
                CATEGORY_CHANNEL_OPEN_TIME,
                channel.id.as_str(),
                now.to_string(),
            ),
        ];
        self.store
            .commit(Batch::new(
                "create_direct_channel",
                vec![
                    Action::ReceivedChannel(channel.clone()),
                    Action::ReceivedMyChannelMember(new_member(&channel.id, current_user_id)),
                    Action::ReceivedPreferences(preferences.clone()),
                ],
            ))
            .await;
        info!(channel_id = %channel.id, "sync: direct channel created");

        self.spawn_persist_preferences(current_user_id.clone(), preferences);
        self.spawn_load_profiles(vec![current_user_id.clone(), other_user_id.clone()]);
        Ok(channel)
    }

    pub async fn create_group_channel(self: &Arc<Self>, user_ids: &[UserId]) -> SyncResult<Channel> {
        let state = self.store.snapshot().await;
        let current_user_id = selectors::current_user_id(&state)
            .cloned()
            .ok_or(SyncError::NotLoggedIn)?;

        let channel = match self.gateway.create_group_channel(user_ids).await {
            Ok(channel) => channel,
            Err(err) => {
                self.handle_api_error(&err).await;
                return Err(err.into());
            }
        };

        let now = Utc::now().timestamp_millis();
        let preferences = vec![
            Preference::new(
                current_user_id.clone(),
                CATEGORY_GROUP_CHANNEL_SHOW,
                channel.id.as_str(),
                "true",
            ),
            Preference::new(
                current_user_id.clone(),
                CATEGORY_CHANNEL_OPEN_TIME,
                channel.id.as_str(),
                now.to_string(),
            ),
        ];
        self.store
            .commit(Batch::new(
                "create_group_channel",
                vec![
                    Action::ReceivedChannel(channel.clone()),
                    Action::ReceivedMyChannelMember(new_member(&channel.id, &current_user_id)),
                    Action::ReceivedPreferences(preferences.clone()),
                ],
            ))
            .await;
        info!(channel_id = %channel.id, members = user_ids.len(), "sync: group channel created");

        self.spawn_persist_preferences(current_user_id, preferences);
        self.spawn_load_profiles_in_channel(channel.id.clone());
        Ok(channel)
    }

    /// Searches the current team. Unless archived channels are requested,
    /// channels the user already belongs to are filtered out.
    ///
    /// Fails with [`SyncError::NoCurrentTeam`] before any request when no
    /// team is selected. Callers should treat that variant as a programming
    /// error, not a server failure.
    pub async fn search_more_channels(
        &self,
        term: &str,
        show_archived_channels: bool,
    ) -> SyncResult<Vec<Channel>> {
        let state = self.store.snapshot().await;
        let team_id = selectors::current_team_id(&state)
            .cloned()
            .ok_or(SyncError::NoCurrentTeam)?;

        let channels = match self
            .gateway
            .search_channels(&team_id, term, show_archived_channels)
            .await
        {
            Ok(channels) => channels,
            Err(err) => {
                self.handle_api_error(&err).await;
                return Err(err.into());
            }
        };
        self.store
            .dispatch(
                "search_channels",
                Action::ReceivedChannels {
                    team_id,
                    channels: channels.clone(),
                },
            )
            .await;

        if show_archived_channels {
            return Ok(channels);
        }
        let my_members = selectors::my_channel_memberships(&state);
        Ok(channels
            .into_iter()
            .filter(|channel| !my_members.contains_key(&channel.id))
            .collect())
    }

    /// `Ok(None)` when no team is selected.
    pub async fn autocomplete_channels(&self, term: &str) -> SyncResult<Option<Vec<Channel>>> {
        self.autocomplete(term, false).await
    }

    /// Like [`Self::autocomplete_channels`], over the channels searchable
    /// from the message search box.
    pub async fn autocomplete_channels_for_search(
        &self,
        term: &str,
    ) -> SyncResult<Option<Vec<Channel>>> {
        self.autocomplete(term, true).await
    }

    async fn autocomplete(&self, term: &str, for_search: bool) -> SyncResult<Option<Vec<Channel>>> {
        let state = self.store.snapshot().await;
        let Some(team_id) = selectors::current_team_id(&state).cloned() else {
            return Ok(None);
        };

        let result = if for_search {
            self.gateway
                .autocomplete_channels_for_search(&team_id, term)
                .await
        } else {
            self.gateway.autocomplete_channels(&team_id, term).await
        };
        match result {
            Ok(channels) => {
                self.store
                    .dispatch(
                        "autocomplete_channels",
                        Action::ReceivedChannels {
                            team_id,
                            channels: channels.clone(),
                        },
                    )
                    .await;
                Ok(Some(channels))
            }
            Err(err) => {
                self.handle_api_error(&err).await;
                Err(err.into())
            }
        }
    }

    /// Adds each user to `channel_id` concurrently. Any failure fails the
    /// whole call; memberships added by the other requests stay in place.
    pub async fn add_users_to_channel(
        &self,
        channel_id: &ChannelId,
        user_ids: &[UserId],
    ) -> SyncResult<Vec<ChannelMembership>> {
        let results = join_all(
            user_ids
                .iter()
                .map(|user_id| self.add_channel_member(channel_id, user_id)),
        )
        .await;

        results
            .into_iter()
            .collect::<Result<Vec<_>, ApiError>>()
            .map_err(SyncError::from)
    }

    async fn add_channel_member(
        &self,
        channel_id: &ChannelId,
        user_id: &UserId,
    ) -> Result<ChannelMembership, ApiError> {
        match self.gateway.add_channel_member(channel_id, user_id).await {
            Ok(member) => {
                self.store
                    .dispatch("add_channel_member", Action::ReceivedChannelMember(member.clone()))
                    .await;
                Ok(member)
            }
            Err(err) => {
                self.handle_api_error(&err).await;
                Err(err)
            }
        }
    }

    pub async fn mute_channel(&self, user_id: &UserId, channel_id: &ChannelId) -> SyncResult<()> {
        self.update_mark_unread(user_id, channel_id, NotificationLevel::Mention)
            .await
    }

    pub async fn unmute_channel(&self, user_id: &UserId, channel_id: &ChannelId) -> SyncResult<()> {
        self.update_mark_unread(user_id, channel_id, NotificationLevel::All)
            .await
    }

    async fn update_mark_unread(
        &self,
        user_id: &UserId,
        channel_id: &ChannelId,
        level: NotificationLevel,
    ) -> SyncResult<()> {
        if let Err(err) = self
            .gateway
            .update_channel_notify_props(user_id, channel_id, level)
            .await
        {
            self.handle_api_error(&err).await;
            return Err(err.into());
        }

        let state = self.store.snapshot().await;
        let mut notify_props = state
            .my_members
            .get(channel_id)
            .map(|member| member.notify_props.clone())
            .unwrap_or_default();
        notify_props.mark_unread = level;
        self.store
            .dispatch(
                "update_channel_notify_props",
                Action::ReceivedChannelNotifyProps {
                    channel_id: channel_id.clone(),
                    notify_props,
                },
            )
            .await;
        Ok(())
    }
}

fn new_member(channel_id: &ChannelId, user_id: &UserId) -> ChannelMembership {
    ChannelMembership {
        channel_id: channel_id.clone(),
        user_id: user_id.clone(),
        roles: "channel_user".to_string(),
        msg_count: 0,
        mention_count: 0,
        last_viewed_at: 0,
        notify_props: Default::default(),
    }
}
