use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::{
    Channel, ChannelId, ChannelMembership, ChannelNotifyProps, ChannelType, Group, NotificationLevel,
    TeamId, UserId,
};

/// Upper bound the web client asks for; the server pages internally.
pub const GRAPHQL_PAGE_SIZE: u32 = 10000;

const CHANNEL_FIELDS: &str = "id create_at update_at delete_at team { id } type display_name name header purpose last_post_at last_root_post_at total_msg_count";
const CHANNEL_MEMBER_FIELDS: &str = "channel { id } user { id } roles { id name permissions } last_viewed_at msg_count mention_count last_update_at notify_props";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQlRequest {
    pub query: String,
    pub operation_name: String,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub variables: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphQlResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphQlError {
    pub message: String,
}

/// Which channels a channels-and-members query covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelQueryScope {
    Team(TeamId),
    AllTeams,
}

impl ChannelQueryScope {
    pub fn to_request(&self) -> GraphQlRequest {
        match self {
            Self::Team(team_id) => {
                let mut variables = serde_json::Map::new();
                variables.insert("teamId".into(), team_id.as_str().into());
                variables.insert("perPage".into(), GRAPHQL_PAGE_SIZE.into());
                GraphQlRequest {
                    query: format!(
                        "query gqlWebChannelsAndMembersForTeam($teamId: String!, $perPage: Int!) {{ \
                         channels(userId: \"me\", teamId: $teamId, first: $perPage) {{ {CHANNEL_FIELDS} }} \
                         channelMembers(userId: \"me\", teamId: $teamId, first: $perPage) {{ {CHANNEL_MEMBER_FIELDS} }} }}"
                    ),
                    operation_name: "gqlWebChannelsAndMembersForTeam".into(),
                    variables,
                }
            }
            Self::AllTeams => {
                let mut variables = serde_json::Map::new();
                variables.insert("perPage".into(), GRAPHQL_PAGE_SIZE.into());
                GraphQlRequest {
                    query: format!(
                        "query gqlWebChannelsAndMembersForAllTeams($perPage: Int!) {{ \
                         channels(userId: \"me\", first: $perPage) {{ {CHANNEL_FIELDS} }} \
                         channelMembers(userId: \"me\", first: $perPage) {{ {CHANNEL_MEMBER_FIELDS} }} }}"
                    ),
                    operation_name: "gqlWebChannelsAndMembersForAllTeams".into(),
                    variables,
                }
            }
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsAndMembersPayload {
    #[serde(default)]
    pub channels: Vec<GqlChannel>,
    #[serde(default)]
    pub channel_members: Vec<GqlChannelMember>,
}

impl ChannelsAndMembersPayload {
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty() && self.channel_members.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GqlRef<Id> {
    pub id: Id,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GqlChannel {
    pub id: ChannelId,
    #[serde(default)]
    pub team: Option<GqlRef<TeamId>>,
    #[serde(rename = "type")]
    pub channel_type: ChannelType,
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub delete_at: i64,
    #[serde(default)]
    pub last_post_at: i64,
    #[serde(default)]
    pub total_msg_count: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GqlRole {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GqlChannelMember {
    pub channel: GqlRef<ChannelId>,
    #[serde(default)]
    pub roles: Vec<GqlRole>,
    #[serde(default)]
    pub last_viewed_at: i64,
    #[serde(default)]
    pub msg_count: i64,
    #[serde(default)]
    pub mention_count: i64,
    #[serde(default)]
    pub notify_props: ChannelNotifyProps,
}

impl From<GqlChannel> for Channel {
    fn from(value: GqlChannel) -> Self {
        Self {
            id: value.id,
            team_id: value.team.map(|team| team.id).unwrap_or_default(),
            channel_type: value.channel_type,
            name: value.name,
            display_name: value.display_name,
            delete_at: value.delete_at,
            last_post_at: value.last_post_at,
            total_msg_count: value.total_msg_count,
        }
    }
}

impl GqlChannelMember {
    /// Members from the GraphQL endpoint omit the user; they always belong
    /// to the caller.
    pub fn into_membership(self, current_user_id: &UserId) -> ChannelMembership {
        ChannelMembership {
            channel_id: self.channel.id,
            user_id: current_user_id.clone(),
            roles: self
                .roles
                .iter()
                .map(|role| role.name.as_str())
                .collect::<Vec<_>>()
                .join(" "),
            msg_count: self.msg_count,
            mention_count: self.mention_count,
            last_viewed_at: self.last_viewed_at,
            notify_props: self.notify_props,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AddChannelMemberRequest<'a> {
    pub user_id: &'a UserId,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddTeamMemberRequest<'a> {
    pub team_id: &'a TeamId,
    pub user_id: &'a UserId,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchChannelsRequest<'a> {
    pub term: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotifyPropsPatch {
    pub channel_id: ChannelId,
    pub user_id: UserId,
    pub mark_unread: NotificationLevel,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TeamGroupsResponse {
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub total_group_count: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelGroupsResponse {
    #[serde(default)]
    pub groups: HashMap<ChannelId, Vec<Group>>,
}
