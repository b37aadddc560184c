use shared::domain::{Team, UserId};

use crate::{selectors, store::EntitiesState};

/// Inputs of the group loading decision after a team is initialized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupSyncFlags {
    pub licensed: bool,
    pub ldap_groups: bool,
    pub custom_groups: bool,
    pub group_constrained: bool,
    pub has_current_user: bool,
}

impl GroupSyncFlags {
    pub fn from_state(state: &EntitiesState, team: &Team, current_user_id: Option<&UserId>) -> Self {
        Self {
            licensed: state.license.licensed(),
            ldap_groups: state.license.ldap_groups_enabled(),
            custom_groups: selectors::is_custom_groups_enabled(state),
            group_constrained: team.group_constrained,
            has_current_user: current_user_id.is_some(),
        }
    }
}

/// Which group calls fire. One row of the decision table per flag
/// combination; see [`GroupCalls::decide`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupCalls {
    pub my_groups: bool,
    pub channel_groups_in_team: bool,
    pub team_groups: bool,
    pub all_groups: bool,
}

impl GroupCalls {
    /// | licensed | ldap | custom | constrained | calls                                   |
    /// |----------|------|--------|-------------|-----------------------------------------|
    /// | false    | *    | *      | *           | none                                    |
    /// | true     | no   | no     | *           | none                                    |
    /// | true     | yes  | *      | yes         | mine, channels in team, team            |
    /// | true     | yes  | *      | no          | mine, channels in team, all (paginated) |
    /// | true     | no   | yes    | *           | mine, all (paginated)                   |
    ///
    /// "mine" additionally requires a current user.
    pub fn decide(flags: GroupSyncFlags) -> Self {
        if !flags.licensed || !(flags.ldap_groups || flags.custom_groups) {
            return Self::default();
        }

        let team_groups = flags.group_constrained && flags.ldap_groups;
        Self {
            my_groups: flags.has_current_user,
            channel_groups_in_team: flags.ldap_groups,
            team_groups,
            all_groups: !team_groups,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
