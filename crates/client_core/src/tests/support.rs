use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use shared::{
    domain::{
        direct_channel_name, Channel, ChannelId, ChannelMembership, ChannelType, ClientConfig,
        Group, License, NotificationLevel, Preference, Role, Team, TeamId, TeamMembership, UserId,
        UserProfile, UserStatus,
    },
    error::{ApiError, ErrorCode},
    protocol::{ChannelQueryScope, ChannelsAndMembersPayload},
};

use crate::{
    gateway::{GatewayResult, RemoteGateway},
    local_store::MemoryLocalStore,
    store::{Action, Batch, ClientStore, EntitiesState},
    sync::SyncOrchestrator,
};

/// In-memory gateway that records every call by method name.
#[derive(Default)]
pub(crate) struct TestGateway {
    pub me: Option<UserProfile>,
    pub license: License,
    pub config: ClientConfig,
    pub teams: Vec<Team>,
    pub my_channels: Vec<Channel>,
    pub my_members: Vec<ChannelMembership>,
    pub graphql_payload: Option<ChannelsAndMembersPayload>,
    pub search_results: Vec<Channel>,
    pub created_channel: Option<Channel>,
    pub roles: Vec<Role>,
    pub groups: Vec<Group>,
    pub profiles: Vec<UserProfile>,
    /// Methods that fail with the given error.
    pub failures: HashMap<&'static str, ApiError>,
    /// Users `add_channel_member` rejects.
    pub failing_members: HashSet<UserId>,
    pub(crate) calls: Mutex<Vec<String>>,
    pub(crate) saved_preferences: Mutex<Vec<Preference>>,
}

impl TestGateway {
    pub fn fail(mut self, method: &'static str, err: ApiError) -> Self {
        self.failures.insert(method, err);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.calls().iter().filter(|call| call.as_str() == method).count()
    }

    pub fn saved_preferences(&self) -> Vec<Preference> {
        self.saved_preferences.lock().expect("prefs lock").clone()
    }

    fn call(&self, method: &'static str) -> GatewayResult<()> {
        self.calls.lock().expect("calls lock").push(method.to_string());
        match self.failures.get(method) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteGateway for TestGateway {
    async fn get_me(&self) -> GatewayResult<UserProfile> {
        self.call("get_me")?;
        self.me
            .clone()
            .ok_or_else(|| ApiError::from_status(401, "no session"))
    }

    async fn get_client_license(&self) -> GatewayResult<License> {
        self.call("get_client_license")?;
        Ok(self.license.clone())
    }

    async fn get_client_config(&self) -> GatewayResult<ClientConfig> {
        self.call("get_client_config")?;
        Ok(self.config.clone())
    }

    async fn get_my_channels(&self, _team_id: &TeamId) -> GatewayResult<Vec<Channel>> {
        self.call("get_my_channels")?;
        Ok(self.my_channels.clone())
    }

    async fn get_my_channel_members(
        &self,
        _team_id: &TeamId,
    ) -> GatewayResult<Vec<ChannelMembership>> {
        self.call("get_my_channel_members")?;
        Ok(self.my_members.clone())
    }

    async fn fetch_channels_and_members(
        &self,
        scope: &ChannelQueryScope,
    ) -> GatewayResult<Option<ChannelsAndMembersPayload>> {
        self.call(match scope {
            ChannelQueryScope::Team(_) => "fetch_channels_and_members:team",
            ChannelQueryScope::AllTeams => "fetch_channels_and_members:all",
        })?;
        Ok(self.graphql_payload.clone())
    }

    async fn search_channels(
        &self,
        _team_id: &TeamId,
        _term: &str,
        _archived: bool,
    ) -> GatewayResult<Vec<Channel>> {
        self.call("search_channels")?;
        Ok(self.search_results.clone())
    }

    async fn autocomplete_channels(
        &self,
        _team_id: &TeamId,
        _term: &str,
    ) -> GatewayResult<Vec<Channel>> {
        self.call("autocomplete_channels")?;
        Ok(self.search_results.clone())
    }

    async fn autocomplete_channels_for_search(
        &self,
        _team_id: &TeamId,
        _term: &str,
    ) -> GatewayResult<Vec<Channel>> {
        self.call("autocomplete_channels_for_search")?;
        Ok(self.search_results.clone())
    }

    async fn add_channel_member(
        &self,
        channel_id: &ChannelId,
        user_id: &UserId,
    ) -> GatewayResult<ChannelMembership> {
        self.call("add_channel_member")?;
        if self.failing_members.contains(user_id) {
            return Err(ApiError::from_status(403, "cannot add user").with_server_error_id(
                "api.channel.add_members.error",
            ));
        }
        Ok(member(channel_id.as_str(), user_id.as_str(), "channel_user"))
    }

    async fn update_channel_notify_props(
        &self,
        _user_id: &UserId,
        _channel_id: &ChannelId,
        _mark_unread: NotificationLevel,
    ) -> GatewayResult<()> {
        self.call("update_channel_notify_props")
    }

    async fn create_direct_channel(
        &self,
        user_id: &UserId,
        other_user_id: &UserId,
    ) -> GatewayResult<Channel> {
        self.call("create_direct_channel")?;
        Ok(self.created_channel.clone().unwrap_or_else(|| {
            channel(
                "dm1",
                ChannelType::Direct,
                &direct_channel_name(user_id, other_user_id),
            )
        }))
    }

    async fn create_group_channel(&self, _user_ids: &[UserId]) -> GatewayResult<Channel> {
        self.call("create_group_channel")?;
        Ok(self
            .created_channel
            .clone()
            .unwrap_or_else(|| channel("gm1", ChannelType::Group, "gm1")))
    }

    async fn get_team_by_name(&self, name: &str) -> GatewayResult<Team> {
        self.call("get_team_by_name")?;
        self.teams
            .iter()
            .find(|team| team.name == name)
            .cloned()
            .ok_or_else(|| {
                ApiError::new(ErrorCode::NotFound, "team not found")
                    .with_server_error_id("app.team.get_by_name.missing.app_error")
            })
    }

    async fn add_user_to_team(
        &self,
        team_id: &TeamId,
        user_id: &UserId,
    ) -> GatewayResult<TeamMembership> {
        self.call("add_user_to_team")?;
        Ok(TeamMembership {
            team_id: team_id.clone(),
            user_id: user_id.clone(),
            roles: "team_user".into(),
            delete_at: 0,
        })
    }

    async fn save_preferences(
        &self,
        _user_id: &UserId,
        preferences: &[Preference],
    ) -> GatewayResult<()> {
        self.call("save_preferences")?;
        self.saved_preferences
            .lock()
            .expect("prefs lock")
            .extend_from_slice(preferences);
        Ok(())
    }

    async fn get_roles_by_names(&self, names: &[String]) -> GatewayResult<Vec<Role>> {
        self.call("get_roles_by_names")?;
        Ok(self
            .roles
            .iter()
            .filter(|role| names.contains(&role.name))
            .cloned()
            .collect())
    }

    async fn get_groups_by_user_id(
        &self,
        _user_id: &UserId,
        _page: u32,
        _per_page: u32,
    ) -> GatewayResult<Vec<Group>> {
        self.call("get_groups_by_user_id")?;
        Ok(self.groups.clone())
    }

    async fn get_all_groups_associated_to_channels_in_team(
        &self,
        _team_id: &TeamId,
        _filter_allow_reference: bool,
    ) -> GatewayResult<HashMap<ChannelId, Vec<Group>>> {
        self.call("get_all_groups_associated_to_channels_in_team")?;
        Ok(HashMap::new())
    }

    async fn get_all_groups_associated_to_team(
        &self,
        _team_id: &TeamId,
        _filter_allow_reference: bool,
    ) -> GatewayResult<Vec<Group>> {
        self.call("get_all_groups_associated_to_team")?;
        Ok(self.groups.clone())
    }

    async fn get_groups(
        &self,
        _filter_allow_reference: bool,
        _page: u32,
        _per_page: u32,
    ) -> GatewayResult<Vec<Group>> {
        self.call("get_groups")?;
        Ok(self.groups.clone())
    }

    async fn get_profiles_by_ids(&self, user_ids: &[UserId]) -> GatewayResult<Vec<UserProfile>> {
        self.call("get_profiles_by_ids")?;
        Ok(self
            .profiles
            .iter()
            .filter(|profile| user_ids.contains(&profile.id))
            .cloned()
            .collect())
    }

    async fn get_profiles_in_channel(
        &self,
        _channel_id: &ChannelId,
    ) -> GatewayResult<Vec<UserProfile>> {
        self.call("get_profiles_in_channel")?;
        Ok(self.profiles.clone())
    }

    async fn get_statuses_by_ids(&self, user_ids: &[UserId]) -> GatewayResult<Vec<UserStatus>> {
        self.call("get_statuses_by_ids")?;
        Ok(user_ids
            .iter()
            .map(|user_id| UserStatus {
                user_id: user_id.clone(),
                status: "online".into(),
            })
            .collect())
    }
}

pub(crate) fn user(id: &str, roles: &str) -> UserProfile {
    UserProfile {
        id: UserId::new(id),
        username: format!("{id}-name"),
        roles: roles.into(),
    }
}

pub(crate) fn team(id: &str, name: &str, delete_at: i64, group_constrained: bool) -> Team {
    Team {
        id: TeamId::new(id),
        name: name.into(),
        display_name: name.to_uppercase(),
        delete_at,
        group_constrained,
    }
}

pub(crate) fn channel(id: &str, channel_type: ChannelType, name: &str) -> Channel {
    Channel {
        id: ChannelId::new(id),
        team_id: TeamId::new("t1"),
        channel_type,
        name: name.into(),
        display_name: name.into(),
        delete_at: 0,
        last_post_at: 0,
        total_msg_count: 0,
    }
}

pub(crate) fn member(channel_id: &str, user_id: &str, roles: &str) -> ChannelMembership {
    ChannelMembership {
        channel_id: ChannelId::new(channel_id),
        user_id: UserId::new(user_id),
        roles: roles.into(),
        msg_count: 0,
        mention_count: 0,
        last_viewed_at: 0,
        notify_props: Default::default(),
    }
}

pub(crate) fn licensed(ldap_groups: bool) -> License {
    License {
        is_licensed: "true".into(),
        ldap_groups: ldap_groups.to_string(),
    }
}

pub(crate) fn config(custom_groups: bool) -> ClientConfig {
    ClientConfig {
        site_url: "https://chat.example.com".into(),
        enable_custom_groups: custom_groups.to_string(),
    }
}

/// State of a logged in session for `me`.
pub(crate) fn session_state(me: &UserProfile, license: License, config: ClientConfig) -> EntitiesState {
    let mut state = EntitiesState::default();
    for action in [
        Action::ReceivedClientConfig(config),
        Action::ReceivedLicense(license),
        Action::ReceivedMe(me.clone()),
    ] {
        state.apply(action);
    }
    state
}

pub(crate) fn orchestrator(
    gateway: Arc<TestGateway>,
    state: EntitiesState,
) -> (Arc<SyncOrchestrator>, Arc<MemoryLocalStore>) {
    let local_store = Arc::new(MemoryLocalStore::default());
    let sync = SyncOrchestrator::new(gateway, local_store.clone(), ClientStore::new(state));
    (sync, local_store)
}

/// Every batch received so far, without waiting.
pub(crate) fn drain<T: Clone>(receiver: &mut tokio::sync::broadcast::Receiver<T>) -> Vec<T> {
    let mut items = Vec::new();
    while let Ok(item) = receiver.try_recv() {
        items.push(item);
    }
    items
}

pub(crate) fn batch_names(batches: &[Arc<Batch>]) -> Vec<&'static str> {
    batches.iter().map(|batch| batch.name).collect()
}
