//! Pure queries over [`EntitiesState`].

use std::collections::{BTreeSet, HashMap};

use shared::domain::{
    direct_channel_peer, Channel, ChannelId, ChannelMembership, PreferenceKey, TeamId, UserId,
    UserProfile,
};

use crate::store::EntitiesState;

pub const CATEGORY_DIRECT_CHANNEL_SHOW: &str = "direct_channel_show";
pub const CATEGORY_GROUP_CHANNEL_SHOW: &str = "group_channel_show";
pub const CATEGORY_CHANNEL_OPEN_TIME: &str = "channel_open_time";

pub fn current_user_id(state: &EntitiesState) -> Option<&UserId> {
    state.current_user_id.as_ref()
}

pub fn current_user(state: &EntitiesState) -> Option<&UserProfile> {
    state
        .current_user_id
        .as_ref()
        .and_then(|id| state.users.get(id))
}

pub fn current_team_id(state: &EntitiesState) -> Option<&TeamId> {
    state
        .current_team_id
        .as_ref()
        .filter(|team_id| !team_id.is_empty())
}

/// Site root plus the current team's name; the bare site URL without a
/// selected (and known) team.
pub fn current_team_url(state: &EntitiesState) -> String {
    let site_url = state.config.site_url.trim_end_matches('/');
    match current_team_id(state).and_then(|id| state.teams.get(id)) {
        Some(team) => format!("{site_url}/{}", team.name),
        None => site_url.to_string(),
    }
}

pub fn channel<'a>(state: &'a EntitiesState, channel_id: &ChannelId) -> Option<&'a Channel> {
    state.channels.get(channel_id)
}

pub fn channel_by_name<'a>(state: &'a EntitiesState, name: &str) -> Option<&'a Channel> {
    state.channels.values().find(|channel| channel.name == name)
}

pub fn my_channel_memberships(state: &EntitiesState) -> &HashMap<ChannelId, ChannelMembership> {
    &state.my_members
}

/// Channels with messages the current user has not read, or with pending
/// mentions. Sorted for stable iteration.
pub fn unread_channel_ids(state: &EntitiesState) -> Vec<ChannelId> {
    let ids: BTreeSet<ChannelId> = state
        .my_members
        .values()
        .filter(|member| {
            let Some(channel) = state.channels.get(&member.channel_id) else {
                return false;
            };
            if member.mention_count > 0 {
                return true;
            }
            !member.is_muted() && channel.total_msg_count > member.msg_count
        })
        .map(|member| member.channel_id.clone())
        .collect();
    ids.into_iter().collect()
}

pub fn preference_value<'a>(
    state: &'a EntitiesState,
    user_id: &UserId,
    category: &str,
    name: &str,
) -> Option<&'a str> {
    let key = PreferenceKey {
        user_id: user_id.clone(),
        category: category.to_string(),
        name: name.to_string(),
    };
    state.preferences.get(&key).map(|pref| pref.value.as_str())
}

pub fn preference_enabled(
    state: &EntitiesState,
    user_id: &UserId,
    category: &str,
    name: &str,
) -> bool {
    preference_value(state, user_id, category, name) == Some("true")
}

pub fn is_custom_groups_enabled(state: &EntitiesState) -> bool {
    state.config.custom_groups_enabled()
}

pub fn has_role(state: &EntitiesState, name: &str) -> bool {
    state.roles.contains_key(name)
}

/// The other participant of a direct channel.
pub fn direct_channel_peer_id(state: &EntitiesState, channel: &Channel) -> Option<UserId> {
    let current_user_id = current_user_id(state)?;
    direct_channel_peer(&channel.name, current_user_id)
}

pub fn direct_channels(state: &EntitiesState) -> impl Iterator<Item = &Channel> {
    state.channels.values().filter(|channel| channel.is_direct())
}

pub fn group_channels(state: &EntitiesState) -> impl Iterator<Item = &Channel> {
    state.channels.values().filter(|channel| channel.is_group())
}
