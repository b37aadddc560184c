//! Normalized client state and the batch commit protocol that mutates it.
//!
//! State is only ever changed by committing a [`Batch`] of [`Action`]s. A
//! commit clones the current snapshot, applies every action in order and then
//! swaps the snapshot in, so readers holding an `Arc<EntitiesState>` never see
//! a partially applied batch.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use shared::{
    domain::{
        Channel, ChannelId, ChannelMembership, ChannelNotifyProps, ClientConfig, Group, GroupId,
        License, Preference, PreferenceKey, Role, Team, TeamId, TeamMembership, UserId,
        UserProfile, UserStatus,
    },
    error::ApiError,
};
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RequestStatus {
    #[default]
    NotStarted,
    Started,
    Success,
    Failure(Option<ApiError>),
}

#[derive(Debug, Clone, Default)]
pub struct EntitiesState {
    pub current_user_id: Option<UserId>,
    pub users: HashMap<UserId, UserProfile>,
    pub statuses: HashMap<UserId, String>,

    pub current_team_id: Option<TeamId>,
    pub teams: HashMap<TeamId, Team>,
    pub my_team_members: HashMap<TeamId, TeamMembership>,

    pub channels: HashMap<ChannelId, Channel>,
    pub my_members: HashMap<ChannelId, ChannelMembership>,
    pub channel_members: HashMap<ChannelId, HashMap<UserId, ChannelMembership>>,
    pub profiles_in_channel: HashMap<ChannelId, HashSet<UserId>>,

    pub preferences: HashMap<PreferenceKey, Preference>,
    pub roles: HashMap<String, Role>,

    pub groups: HashMap<GroupId, Group>,
    pub my_group_ids: HashSet<GroupId>,
    pub team_group_ids: HashMap<TeamId, Vec<GroupId>>,
    pub channel_group_ids: HashMap<ChannelId, Vec<GroupId>>,

    pub license: License,
    pub config: ClientConfig,

    /// Progress of loading channels, memberships and sidebar categories.
    pub memberships_request: RequestStatus,
    pub errors: Vec<ApiError>,
}

/// One state transition record.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    ReceivedMe(UserProfile),
    ReceivedLicense(License),
    ReceivedClientConfig(ClientConfig),
    SelectTeam(TeamId),
    ReceivedTeam(Team),
    ReceivedMyTeamMember(TeamMembership),

    ChannelsMembersCategoriesRequest,
    ChannelsMembersCategoriesSuccess,
    ChannelsMembersCategoriesFailure(Option<ApiError>),

    ReceivedChannels {
        team_id: TeamId,
        channels: Vec<Channel>,
    },
    ReceivedAllChannels(Vec<Channel>),
    ReceivedChannel(Channel),
    ReceivedMyChannelMembers {
        members: Vec<ChannelMembership>,
        current_user_id: UserId,
    },
    ReceivedMyChannelMember(ChannelMembership),
    ReceivedChannelMember(ChannelMembership),
    ReceivedChannelNotifyProps {
        channel_id: ChannelId,
        notify_props: ChannelNotifyProps,
    },

    ReceivedPreferences(Vec<Preference>),
    ReceivedRoles(Vec<Role>),
    ReceivedProfiles(Vec<UserProfile>),
    ReceivedProfilesInChannel {
        channel_id: ChannelId,
        profiles: Vec<UserProfile>,
    },
    ReceivedStatuses(Vec<UserStatus>),

    ReceivedMyGroups(Vec<Group>),
    ReceivedGroupsAssociatedToChannelsInTeam {
        team_id: TeamId,
        groups_by_channel: HashMap<ChannelId, Vec<Group>>,
    },
    ReceivedGroupsAssociatedToTeam {
        team_id: TeamId,
        groups: Vec<Group>,
    },
    ReceivedGroups(Vec<Group>),

    LogError(ApiError),
    LogoutSuccess,
}

/// A named list of actions applied as one atomic unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub name: &'static str,
    pub actions: Vec<Action>,
}

impl Batch {
    pub fn new(name: &'static str, actions: Vec<Action>) -> Self {
        Self { name, actions }
    }

    pub fn single(name: &'static str, action: Action) -> Self {
        Self {
            name,
            actions: vec![action],
        }
    }

    pub fn contains(&self, predicate: impl Fn(&Action) -> bool) -> bool {
        self.actions.iter().any(predicate)
    }
}

impl EntitiesState {
    pub fn apply(&mut self, action: Action) {
        match action {
            Action::ReceivedMe(user) => {
                self.current_user_id = Some(user.id.clone());
                self.users.insert(user.id.clone(), user);
            }
            Action::ReceivedLicense(license) => self.license = license,
            Action::ReceivedClientConfig(config) => self.config = config,
            Action::SelectTeam(team_id) => self.current_team_id = Some(team_id),
            Action::ReceivedTeam(team) => {
                self.teams.insert(team.id.clone(), team);
            }
            Action::ReceivedMyTeamMember(member) => {
                self.my_team_members.insert(member.team_id.clone(), member);
            }
            Action::ChannelsMembersCategoriesRequest => {
                self.memberships_request = RequestStatus::Started;
            }
            Action::ChannelsMembersCategoriesSuccess => {
                self.memberships_request = RequestStatus::Success;
            }
            Action::ChannelsMembersCategoriesFailure(err) => {
                self.memberships_request = RequestStatus::Failure(err);
            }
            Action::ReceivedChannels { channels, .. } | Action::ReceivedAllChannels(channels) => {
                for channel in channels {
                    self.channels.insert(channel.id.clone(), channel);
                }
            }
            Action::ReceivedChannel(channel) => {
                self.channels.insert(channel.id.clone(), channel);
            }
            Action::ReceivedMyChannelMembers {
                members,
                current_user_id,
            } => {
                for member in members {
                    if member.user_id == current_user_id {
                        self.insert_my_channel_member(member);
                    }
                }
            }
            Action::ReceivedMyChannelMember(member) => self.insert_my_channel_member(member),
            Action::ReceivedChannelMember(member) => {
                if self.current_user_id.as_ref() == Some(&member.user_id) {
                    self.insert_my_channel_member(member);
                } else {
                    self.insert_channel_member(member);
                }
            }
            Action::ReceivedChannelNotifyProps {
                channel_id,
                notify_props,
            } => {
                if let Some(member) = self.my_members.get_mut(&channel_id) {
                    member.notify_props = notify_props.clone();
                }
                if let (Some(user_id), Some(members)) = (
                    self.current_user_id.as_ref(),
                    self.channel_members.get_mut(&channel_id),
                ) {
                    if let Some(member) = members.get_mut(user_id) {
                        member.notify_props = notify_props;
                    }
                }
            }
            Action::ReceivedPreferences(preferences) => {
                for preference in preferences {
                    self.preferences.insert(preference.key(), preference);
                }
            }
            Action::ReceivedRoles(roles) => {
                for role in roles {
                    self.roles.insert(role.name.clone(), role);
                }
            }
            Action::ReceivedProfiles(profiles) => {
                for profile in profiles {
                    self.users.insert(profile.id.clone(), profile);
                }
            }
            Action::ReceivedProfilesInChannel {
                channel_id,
                profiles,
            } => {
                let in_channel = self.profiles_in_channel.entry(channel_id).or_default();
                for profile in profiles {
                    in_channel.insert(profile.id.clone());
                    self.users.insert(profile.id.clone(), profile);
                }
            }
            Action::ReceivedStatuses(statuses) => {
                for status in statuses {
                    self.statuses.insert(status.user_id, status.status);
                }
            }
            Action::ReceivedMyGroups(groups) => {
                for group in groups {
                    self.my_group_ids.insert(group.id.clone());
                    self.groups.insert(group.id.clone(), group);
                }
            }
            Action::ReceivedGroupsAssociatedToChannelsInTeam {
                groups_by_channel, ..
            } => {
                for (channel_id, groups) in groups_by_channel {
                    let ids = groups.iter().map(|group| group.id.clone()).collect();
                    self.channel_group_ids.insert(channel_id, ids);
                    for group in groups {
                        self.groups.insert(group.id.clone(), group);
                    }
                }
            }
            Action::ReceivedGroupsAssociatedToTeam { team_id, groups } => {
                let ids = groups.iter().map(|group| group.id.clone()).collect();
                self.team_group_ids.insert(team_id, ids);
                for group in groups {
                    self.groups.insert(group.id.clone(), group);
                }
            }
            Action::ReceivedGroups(groups) => {
                for group in groups {
                    self.groups.insert(group.id.clone(), group);
                }
            }
            Action::LogError(err) => self.errors.push(err),
            Action::LogoutSuccess => {
                *self = Self {
                    license: std::mem::take(&mut self.license),
                    config: std::mem::take(&mut self.config),
                    ..Self::default()
                };
            }
        }
    }

    fn insert_my_channel_member(&mut self, member: ChannelMembership) {
        self.my_members
            .insert(member.channel_id.clone(), member.clone());
        self.insert_channel_member(member);
    }

    fn insert_channel_member(&mut self, member: ChannelMembership) {
        self.channel_members
            .entry(member.channel_id.clone())
            .or_default()
            .insert(member.user_id.clone(), member);
    }
}

/// Shared handle to the client state. Cloning shares the same state.
#[derive(Clone)]
pub struct ClientStore {
    state: Arc<RwLock<Arc<EntitiesState>>>,
    commits: broadcast::Sender<Arc<Batch>>,
}

impl Default for ClientStore {
    fn default() -> Self {
        Self::new(EntitiesState::default())
    }
}

impl ClientStore {
    pub fn new(initial: EntitiesState) -> Self {
        let (commits, _) = broadcast::channel(1024);
        Self {
            state: Arc::new(RwLock::new(Arc::new(initial))),
            commits,
        }
    }

    pub async fn snapshot(&self) -> Arc<EntitiesState> {
        Arc::clone(&*self.state.read().await)
    }

    /// Applies every action of `batch` in order and publishes the result as
    /// one new snapshot. Empty batches are dropped.
    pub async fn commit(&self, batch: Batch) {
        if batch.actions.is_empty() {
            return;
        }

        {
            let mut guard = self.state.write().await;
            let mut next = EntitiesState::clone(&guard);
            for action in batch.actions.iter().cloned() {
                next.apply(action);
            }
            *guard = Arc::new(next);
        }

        debug!(
            batch = batch.name,
            actions = batch.actions.len(),
            "store: batch committed"
        );
        let _ = self.commits.send(Arc::new(batch));
    }

    pub async fn dispatch(&self, name: &'static str, action: Action) {
        self.commit(Batch::single(name, action)).await;
    }

    /// Observes every batch committed after the call.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Batch>> {
        self.commits.subscribe()
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
