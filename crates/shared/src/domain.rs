use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(TeamId);
id_newtype!(ChannelId);
id_newtype!(GroupId);

/// Separator between the two user ids of a direct channel name.
pub const DIRECT_CHANNEL_NAME_SEPARATOR: &str = "__";

pub const SYSTEM_GUEST_ROLE: &str = "system_guest";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelType {
    #[serde(rename = "O")]
    Open,
    #[serde(rename = "P")]
    Private,
    #[serde(rename = "D")]
    Direct,
    #[serde(rename = "G")]
    Group,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    #[default]
    Default,
    All,
    Mention,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub delete_at: i64,
    #[serde(default, deserialize_with = "null_as_false")]
    pub group_constrained: bool,
}

impl Team {
    pub fn is_deleted(&self) -> bool {
        self.delete_at != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMembership {
    pub team_id: TeamId,
    pub user_id: UserId,
    #[serde(default)]
    pub roles: String,
    #[serde(default)]
    pub delete_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    #[serde(default)]
    pub team_id: TeamId,
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

impl Channel {
    pub fn is_direct(&self) -> bool {
        self.channel_type == ChannelType::Direct
    }

    pub fn is_group(&self) -> bool {
        self.channel_type == ChannelType::Group
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChannelNotifyProps {
    #[serde(default)]
    pub mark_unread: NotificationLevel,
    #[serde(default)]
    pub desktop: NotificationLevel,
    #[serde(default)]
    pub push: NotificationLevel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMembership {
    pub channel_id: ChannelId,
    pub user_id: UserId,
    /// Space separated role names, as the server sends them.
    #[serde(default)]
    pub roles: String,
    #[serde(default)]
    pub msg_count: i64,
    #[serde(default)]
    pub mention_count: i64,
    #[serde(default)]
    pub last_viewed_at: i64,
    #[serde(default)]
    pub notify_props: ChannelNotifyProps,
}

impl ChannelMembership {
    pub fn role_names(&self) -> impl Iterator<Item = &str> {
        self.roles.split_whitespace()
    }

    pub fn is_muted(&self) -> bool {
        self.notify_props.mark_unread == NotificationLevel::Mention
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preference {
    pub user_id: UserId,
    pub category: String,
    pub name: String,
    pub value: String,
}

impl Preference {
    pub fn new(
        user_id: UserId,
        category: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            category: category.into(),
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn key(&self) -> PreferenceKey {
        PreferenceKey {
            user_id: self.user_id.clone(),
            category: self.category.clone(),
            name: self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PreferenceKey {
    pub user_id: UserId,
    pub category: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub roles: String,
}

impl UserProfile {
    pub fn is_guest(&self) -> bool {
        self.roles
            .split_whitespace()
            .any(|role| role == SYSTEM_GUEST_ROLE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStatus {
    pub user_id: UserId,
    pub status: String,
}

/// Client-facing license flags; the server sends every value as a string.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct License {
    #[serde(rename = "IsLicensed", default)]
    pub is_licensed: String,
    #[serde(rename = "LDAPGroups", default)]
    pub ldap_groups: String,
}

impl License {
    pub fn licensed(&self) -> bool {
        self.is_licensed == "true"
    }

    pub fn ldap_groups_enabled(&self) -> bool {
        self.ldap_groups == "true"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(rename = "SiteURL", default)]
    pub site_url: String,
    #[serde(rename = "EnableCustomGroups", default)]
    pub enable_custom_groups: String,
}

impl ClientConfig {
    pub fn custom_groups_enabled(&self) -> bool {
        self.enable_custom_groups == "true"
    }
}

fn null_as_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

/// Name of the one-to-one channel between two users: both ids in ascending
/// order joined by [`DIRECT_CHANNEL_NAME_SEPARATOR`].
pub fn direct_channel_name(user_id: &UserId, other_user_id: &UserId) -> String {
    let (first, second) = if user_id > other_user_id {
        (other_user_id, user_id)
    } else {
        (user_id, other_user_id)
    };
    format!("{first}{DIRECT_CHANNEL_NAME_SEPARATOR}{second}")
}

/// The peer of `current_user_id` in a direct channel name. A self-DM yields
/// the current user.
pub fn direct_channel_peer(channel_name: &str, current_user_id: &UserId) -> Option<UserId> {
    let (first, second) = channel_name.split_once(DIRECT_CHANNEL_NAME_SEPARATOR)?;
    if first == current_user_id.as_str() {
        Some(UserId::new(second))
    } else if second == current_user_id.as_str() {
        Some(UserId::new(first))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_channel_name_is_order_independent() {
        let a = UserId::new("aaa");
        let b = UserId::new("bbb");
        assert_eq!(direct_channel_name(&a, &b), "aaa__bbb");
        assert_eq!(direct_channel_name(&b, &a), "aaa__bbb");
    }

    #[test]
    fn direct_channel_peer_resolves_other_side() {
        let me = UserId::new("bbb");
        assert_eq!(
            direct_channel_peer("aaa__bbb", &me),
            Some(UserId::new("aaa"))
        );
        assert_eq!(direct_channel_peer("ccc__ddd", &me), None);
        assert_eq!(direct_channel_peer("town-square", &me), None);
    }

    #[test]
    fn guest_role_is_detected_among_others() {
        let user = UserProfile {
            id: UserId::new("u1"),
            username: "guest".into(),
            roles: "system_user system_guest".into(),
        };
        assert!(user.is_guest());
    }

    #[test]
    fn channel_type_uses_single_letter_wire_codes() {
        let channel: Channel = serde_json::from_str(
            r#"{"id":"c1","team_id":"","type":"D","name":"a__b","display_name":""}"#,
        )
        .expect("channel");
        assert!(channel.is_direct());
        assert_eq!(channel.total_msg_count, 0);
    }

    #[test]
    fn team_group_constrained_tolerates_null() {
        let team: Team =
            serde_json::from_str(r#"{"id":"t1","name":"core","delete_at":0,"group_constrained":null}"#)
                .expect("team");
        assert!(!team.group_constrained);
        assert!(!team.is_deleted());
    }
}
