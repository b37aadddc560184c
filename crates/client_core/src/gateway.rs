use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::{
        Channel, ChannelId, ChannelMembership, ClientConfig, Group, License, NotificationLevel,
        Preference, Role, Team, TeamId, TeamMembership, UserId, UserProfile, UserStatus,
    },
    error::{ApiError, ErrorCode, ServerErrorBody},
    protocol::{
        AddChannelMemberRequest, AddTeamMemberRequest, ChannelGroupsResponse,
        ChannelQueryScope, ChannelsAndMembersPayload, GraphQlResponse, NotifyPropsPatch,
        SearchChannelsRequest, TeamGroupsResponse,
    },
};
use url::Url;

use crate::error::{SyncError, SyncResult};

pub type GatewayResult<T> = std::result::Result<T, ApiError>;

/// Page size the client uses for group listings.
pub const GROUPS_PER_PAGE: u32 = 60;
pub const PROFILES_PER_PAGE: u32 = 100;

/// Every remote call the synchronization layer makes.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    async fn get_me(&self) -> GatewayResult<UserProfile>;
    async fn get_client_license(&self) -> GatewayResult<License>;
    async fn get_client_config(&self) -> GatewayResult<ClientConfig>;

    async fn get_my_channels(&self, team_id: &TeamId) -> GatewayResult<Vec<Channel>>;
    async fn get_my_channel_members(&self, team_id: &TeamId)
        -> GatewayResult<Vec<ChannelMembership>>;
    /// Single GraphQL round trip; `None` when the server returned no data.
    async fn fetch_channels_and_members(
        &self,
        scope: &ChannelQueryScope,
    ) -> GatewayResult<Option<ChannelsAndMembersPayload>>;

    async fn search_channels(
        &self,
        team_id: &TeamId,
        term: &str,
        archived: bool,
    ) -> GatewayResult<Vec<Channel>>;
    async fn autocomplete_channels(&self, team_id: &TeamId, term: &str)
        -> GatewayResult<Vec<Channel>>;
    async fn autocomplete_channels_for_search(
        &self,
        team_id: &TeamId,
        term: &str,
    ) -> GatewayResult<Vec<Channel>>;

    async fn add_channel_member(
        &self,
        channel_id: &ChannelId,
        user_id: &UserId,
    ) -> GatewayResult<ChannelMembership>;
    async fn update_channel_notify_props(
        &self,
        user_id: &UserId,
        channel_id: &ChannelId,
        mark_unread: NotificationLevel,
    ) -> GatewayResult<()>;
    async fn create_direct_channel(
        &self,
        user_id: &UserId,
        other_user_id: &UserId,
    ) -> GatewayResult<Channel>;
    async fn create_group_channel(&self, user_ids: &[UserId]) -> GatewayResult<Channel>;

    async fn get_team_by_name(&self, name: &str) -> GatewayResult<Team>;
    async fn add_user_to_team(
        &self,
        team_id: &TeamId,
        user_id: &UserId,
    ) -> GatewayResult<TeamMembership>;

    async fn save_preferences(
        &self,
        user_id: &UserId,
        preferences: &[Preference],
    ) -> GatewayResult<()>;
    async fn get_roles_by_names(&self, names: &[String]) -> GatewayResult<Vec<Role>>;

    async fn get_groups_by_user_id(
        &self,
        user_id: &UserId,
        page: u32,
        per_page: u32,
    ) -> GatewayResult<Vec<Group>>;
    async fn get_all_groups_associated_to_channels_in_team(
        &self,
        team_id: &TeamId,
        filter_allow_reference: bool,
    ) -> GatewayResult<HashMap<ChannelId, Vec<Group>>>;
    async fn get_all_groups_associated_to_team(
        &self,
        team_id: &TeamId,
        filter_allow_reference: bool,
    ) -> GatewayResult<Vec<Group>>;
    async fn get_groups(
        &self,
        filter_allow_reference: bool,
        page: u32,
        per_page: u32,
    ) -> GatewayResult<Vec<Group>>;

    async fn get_profiles_by_ids(&self, user_ids: &[UserId]) -> GatewayResult<Vec<UserProfile>>;
    async fn get_profiles_in_channel(
        &self,
        channel_id: &ChannelId,
    ) -> GatewayResult<Vec<UserProfile>>;
    async fn get_statuses_by_ids(&self, user_ids: &[UserId]) -> GatewayResult<Vec<UserStatus>>;
}

/// [`RemoteGateway`] over the server's REST v4 and GraphQL v5 endpoints.
pub struct HttpGateway {
    http: Client,
    server_url: Url,
    token: Option<String>,
}

impl HttpGateway {
    pub fn new(server_url: &str, token: Option<String>) -> SyncResult<Self> {
        let parsed = Url::parse(server_url)
            .map_err(|err| SyncError::InvalidServerUrl(format!("{server_url}: {err}")))?;
        if parsed.cannot_be_a_base() || !matches!(parsed.scheme(), "http" | "https") {
            return Err(SyncError::InvalidServerUrl(format!(
                "{server_url}: server_url must start with http:// or https://"
            )));
        }
        Ok(Self {
            http: Client::new(),
            server_url: parsed,
            token,
        })
    }

    pub fn server_url(&self) -> &Url {
        &self.server_url
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.server_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn api_v4(&self, segments: &[&str]) -> Url {
        let mut full = vec!["api", "v4"];
        full.extend_from_slice(segments);
        self.endpoint(&full)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request
                .bearer_auth(token)
                .header("X-Requested-With", "XMLHttpRequest"),
            None => request.header("X-Requested-With", "XMLHttpRequest"),
        }
    }

    async fn send(&self, request: RequestBuilder, url: &Url) -> GatewayResult<Response> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|err| ApiError::network(err.to_string()).with_url(url.as_str()))?;
        check_status(response, url).await
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        url: &Url,
    ) -> GatewayResult<T> {
        self.send(request, url).await?.json::<T>().await.map_err(|err| {
            ApiError::new(ErrorCode::Internal, format!("invalid response body: {err}"))
                .with_url(url.as_str())
        })
    }
}

async fn check_status(response: Response, url: &Url) -> GatewayResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.json::<ServerErrorBody>().await.unwrap_or_default();
    let message = if body.message.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body.message
    };
    let status_code = body.status_code.unwrap_or(status.as_u16());
    let mut err = ApiError::from_status(status_code, message).with_url(url.as_str());
    if let Some(id) = body.id {
        err = err.with_server_error_id(id);
    }
    Err(err)
}

#[async_trait]
impl RemoteGateway for HttpGateway {
    async fn get_me(&self) -> GatewayResult<UserProfile> {
        let url = self.api_v4(&["users", "me"]);
        self.fetch(self.http.get(url.clone()), &url).await
    }

    async fn get_client_license(&self) -> GatewayResult<License> {
        let url = self.api_v4(&["license", "client"]);
        self.fetch(self.http.get(url.clone()).query(&[("format", "old")]), &url)
            .await
    }

    async fn get_client_config(&self) -> GatewayResult<ClientConfig> {
        let url = self.api_v4(&["config", "client"]);
        self.fetch(self.http.get(url.clone()).query(&[("format", "old")]), &url)
            .await
    }

    async fn get_my_channels(&self, team_id: &TeamId) -> GatewayResult<Vec<Channel>> {
        let url = self.api_v4(&["users", "me", "teams", team_id.as_str(), "channels"]);
        self.fetch(
            self.http
                .get(url.clone())
                .query(&[("include_deleted", "true")]),
            &url,
        )
        .await
    }

    async fn get_my_channel_members(
        &self,
        team_id: &TeamId,
    ) -> GatewayResult<Vec<ChannelMembership>> {
        let url = self.api_v4(&[
            "users",
            "me",
            "teams",
            team_id.as_str(),
            "channels",
            "members",
        ]);
        self.fetch(self.http.get(url.clone()), &url).await
    }

    async fn fetch_channels_and_members(
        &self,
        scope: &ChannelQueryScope,
    ) -> GatewayResult<Option<ChannelsAndMembersPayload>> {
        let url = self.endpoint(&["api", "v5", "graphql"]);
        let response: GraphQlResponse<ChannelsAndMembersPayload> = self
            .fetch(self.http.post(url.clone()).json(&scope.to_request()), &url)
            .await?;
        if let Some(first) = response.errors.first() {
            return Err(
                ApiError::new(ErrorCode::Internal, first.message.clone()).with_url(url.as_str())
            );
        }
        Ok(response.data)
    }

    async fn search_channels(
        &self,
        team_id: &TeamId,
        term: &str,
        archived: bool,
    ) -> GatewayResult<Vec<Channel>> {
        let route = if archived {
            "search_archived"
        } else {
            "search"
        };
        let url = self.api_v4(&["teams", team_id.as_str(), "channels", route]);
        self.fetch(
            self.http
                .post(url.clone())
                .json(&SearchChannelsRequest { term }),
            &url,
        )
        .await
    }

    async fn autocomplete_channels(
        &self,
        team_id: &TeamId,
        term: &str,
    ) -> GatewayResult<Vec<Channel>> {
        let url = self.api_v4(&["teams", team_id.as_str(), "channels", "autocomplete"]);
        self.fetch(self.http.get(url.clone()).query(&[("name", term)]), &url)
            .await
    }

    async fn autocomplete_channels_for_search(
        &self,
        team_id: &TeamId,
        term: &str,
    ) -> GatewayResult<Vec<Channel>> {
        let url = self.api_v4(&[
            "teams",
            team_id.as_str(),
            "channels",
            "search_autocomplete",
        ]);
        self.fetch(self.http.get(url.clone()).query(&[("name", term)]), &url)
            .await
    }

    async fn add_channel_member(
        &self,
        channel_id: &ChannelId,
        user_id: &UserId,
    ) -> GatewayResult<ChannelMembership> {
        let url = self.api_v4(&["channels", channel_id.as_str(), "members"]);
        self.fetch(
            self.http
                .post(url.clone())
                .json(&AddChannelMemberRequest { user_id }),
            &url,
        )
        .await
    }

    async fn update_channel_notify_props(
        &self,
        user_id: &UserId,
        channel_id: &ChannelId,
        mark_unread: NotificationLevel,
    ) -> GatewayResult<()> {
        let url = self.api_v4(&[
            "channels",
            channel_id.as_str(),
            "members",
            user_id.as_str(),
            "notify_props",
        ]);
        let patch = NotifyPropsPatch {
            channel_id: channel_id.clone(),
            user_id: user_id.clone(),
            mark_unread,
        };
        self.send(self.http.put(url.clone()).json(&patch), &url)
            .await?;
        Ok(())
    }

    async fn create_direct_channel(
        &self,
        user_id: &UserId,
        other_user_id: &UserId,
    ) -> GatewayResult<Channel> {
        let url = self.api_v4(&["channels", "direct"]);
        self.fetch(
            self.http
                .post(url.clone())
                .json(&[user_id, other_user_id]),
            &url,
        )
        .await
    }

    async fn create_group_channel(&self, user_ids: &[UserId]) -> GatewayResult<Channel> {
        let url = self.api_v4(&["channels", "group"]);
        self.fetch(self.http.post(url.clone()).json(user_ids), &url)
            .await
    }

    async fn get_team_by_name(&self, name: &str) -> GatewayResult<Team> {
        let url = self.api_v4(&["teams", "name", name]);
        self.fetch(self.http.get(url.clone()), &url).await
    }

    async fn add_user_to_team(
        &self,
        team_id: &TeamId,
        user_id: &UserId,
    ) -> GatewayResult<TeamMembership> {
        let url = self.api_v4(&["teams", team_id.as_str(), "members"]);
        self.fetch(
            self.http
                .post(url.clone())
                .json(&AddTeamMemberRequest { team_id, user_id }),
            &url,
        )
        .await
    }

    async fn save_preferences(
        &self,
        user_id: &UserId,
        preferences: &[Preference],
    ) -> GatewayResult<()> {
        let url = self.api_v4(&["users", user_id.as_str(), "preferences"]);
        self.send(self.http.put(url.clone()).json(preferences), &url)
            .await?;
        Ok(())
    }

    async fn get_roles_by_names(&self, names: &[String]) -> GatewayResult<Vec<Role>> {
        let url = self.api_v4(&["roles", "names"]);
        self.fetch(self.http.post(url.clone()).json(names), &url)
            .await
    }

    async fn get_groups_by_user_id(
        &self,
        user_id: &UserId,
        page: u32,
        per_page: u32,
    ) -> GatewayResult<Vec<Group>> {
        let url = self.api_v4(&["groups"]);
        self.fetch(
            self.http.get(url.clone()).query(&[
                ("filter_allow_reference", "false".to_string()),
                ("page", page.to_string()),
                ("per_page", per_page.to_string()),
                ("include_member_count", "true".to_string()),
                ("filter_has_member", user_id.to_string()),
            ]),
            &url,
        )
        .await
    }

    async fn get_all_groups_associated_to_channels_in_team(
        &self,
        team_id: &TeamId,
        filter_allow_reference: bool,
    ) -> GatewayResult<HashMap<ChannelId, Vec<Group>>> {
        let url = self.api_v4(&["teams", team_id.as_str(), "groups_by_channels"]);
        let response: ChannelGroupsResponse = self
            .fetch(
                self.http.get(url.clone()).query(&[
                    ("paginate", "false".to_string()),
                    ("filter_allow_reference", filter_allow_reference.to_string()),
                ]),
                &url,
            )
            .await?;
        Ok(response.groups)
    }

    async fn get_all_groups_associated_to_team(
        &self,
        team_id: &TeamId,
        filter_allow_reference: bool,
    ) -> GatewayResult<Vec<Group>> {
        let url = self.api_v4(&["teams", team_id.as_str(), "groups"]);
        let response: TeamGroupsResponse = self
            .fetch(
                self.http.get(url.clone()).query(&[
                    ("paginate", "false".to_string()),
                    ("filter_allow_reference", filter_allow_reference.to_string()),
                ]),
                &url,
            )
            .await?;
        Ok(response.groups)
    }

    async fn get_groups(
        &self,
        filter_allow_reference: bool,
        page: u32,
        per_page: u32,
    ) -> GatewayResult<Vec<Group>> {
        let url = self.api_v4(&["groups"]);
        self.fetch(
            self.http.get(url.clone()).query(&[
                ("filter_allow_reference", filter_allow_reference.to_string()),
                ("page", page.to_string()),
                ("per_page", per_page.to_string()),
            ]),
            &url,
        )
        .await
    }

    async fn get_profiles_by_ids(&self, user_ids: &[UserId]) -> GatewayResult<Vec<UserProfile>> {
        let url = self.api_v4(&["users", "ids"]);
        self.fetch(self.http.post(url.clone()).json(user_ids), &url)
            .await
    }

    async fn get_profiles_in_channel(
        &self,
        channel_id: &ChannelId,
    ) -> GatewayResult<Vec<UserProfile>> {
        let url = self.api_v4(&["users"]);
        self.fetch(
            self.http.get(url.clone()).query(&[
                ("in_channel", channel_id.to_string()),
                ("page", "0".to_string()),
                ("per_page", PROFILES_PER_PAGE.to_string()),
            ]),
            &url,
        )
        .await
    }

    async fn get_statuses_by_ids(&self, user_ids: &[UserId]) -> GatewayResult<Vec<UserStatus>> {
        let url = self.api_v4(&["users", "status", "ids"]);
        self.fetch(self.http.post(url.clone()).json(user_ids), &url)
            .await
    }
}

#[cfg(test)]
#[path = "tests/gateway_tests.rs"]
mod tests;
