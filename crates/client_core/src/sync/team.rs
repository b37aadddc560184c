use std::sync::Arc;

use futures::join;
use shared::{
    domain::{Team, UserId},
    error::ApiError,
};
use tracing::{debug, info, warn};

use super::{GroupCalls, GroupSyncFlags, SyncOrchestrator};
use crate::{
    error::{SyncError, SyncResult},
    gateway::GROUPS_PER_PAGE,
    selectors,
    store::{Action, Batch, EntitiesState},
};

impl SyncOrchestrator {
    /// Selects `team` and loads the current user's channels in it, followed by
    /// statuses and, when licensed, groups.
    pub async fn initialize_team(self: &Arc<Self>, team: Team) -> SyncResult<Team> {
        self.store
            .commit(Batch::new(
                "initialize_team",
                vec![
                    Action::SelectTeam(team.id.clone()),
                    Action::ChannelsMembersCategoriesRequest,
                ],
            ))
            .await;

        let state = self.store.snapshot().await;
        let current_user = selectors::current_user(&state).cloned();
        if let Some(user) = &current_user {
            if let Err(err) = self.local_store.set_previous_team_id(&user.id, &team.id).await {
                warn!(team_id = %team.id, "sync: failed to persist previous team: {err:#}");
            }
            if user.is_guest() {
                self.store
                    .dispatch(
                        "initialize_team_guest",
                        Action::ChannelsMembersCategoriesFailure(None),
                    )
                    .await;
            }
        }

        if let Err(err) = self.fetch_my_channels_and_members(&team.id).await {
            self.store
                .dispatch(
                    "initialize_team_failure",
                    Action::ChannelsMembersCategoriesFailure(Some(err.clone())),
                )
                .await;
            self.handle_api_error(&err).await;
            return Err(err.into());
        }

        let current_user_id = current_user.as_ref().map(|user| &user.id);
        let calls = GroupCalls::decide(GroupSyncFlags::from_state(&state, &team, current_user_id));
        if calls.is_empty() {
            debug!(team_id = %team.id, "sync: group sync disabled for team");
        }
        // Statuses cover the direct channels the fetch just committed.
        let fetched = self.store.snapshot().await;
        let mut actions = vec![Action::ChannelsMembersCategoriesSuccess];
        actions.extend(
            self.load_statuses_and_groups(&fetched, &team, current_user_id, calls)
                .await,
        );
        self.store
            .commit(Batch::new("initialize_team_success", actions))
            .await;

        info!(team_id = %team.id, team_name = %team.name, "sync: team initialized");
        Ok(team)
    }

    /// Resolves `team_name`, adds the current user to it and initializes it.
    pub async fn join_team(
        self: &Arc<Self>,
        team_name: &str,
        joined_on_first_load: bool,
    ) -> SyncResult<Team> {
        let state = self.store.snapshot().await;
        let current_user_id = selectors::current_user_id(&state).cloned();

        match self
            .add_current_user_to_team(team_name, current_user_id, joined_on_first_load)
            .await
        {
            Ok(team) => self.initialize_team(team).await,
            Err(err) => {
                self.handle_sync_error(&err).await;
                Err(err)
            }
        }
    }

    async fn add_current_user_to_team(
        &self,
        team_name: &str,
        current_user_id: Option<UserId>,
        joined_on_first_load: bool,
    ) -> SyncResult<Team> {
        let team = self.gateway.get_team_by_name(team_name).await?;
        let Some(user_id) = current_user_id.filter(|_| !team.is_deleted()) else {
            return Err(SyncError::TeamNotFound);
        };

        let member = self.gateway.add_user_to_team(&team.id, &user_id).await?;
        self.store
            .commit(Batch::new(
                "add_user_to_team",
                vec![
                    Action::ReceivedTeam(team.clone()),
                    Action::ReceivedMyTeamMember(member),
                ],
            ))
            .await;
        info!(team_id = %team.id, user_id = %user_id, "sync: joined team");

        if joined_on_first_load {
            if let Err(err) = self.local_store.set_team_id_joined_on_load(&team.id).await {
                warn!(team_id = %team.id, "sync: failed to record team joined on load: {err:#}");
            }
        }
        Ok(team)
    }

    /// Runs the status load and every group call selected by `calls`
    /// concurrently. Failed calls are logged and left out of the result.
    async fn load_statuses_and_groups(
        &self,
        state: &EntitiesState,
        team: &Team,
        current_user_id: Option<&UserId>,
        calls: GroupCalls,
    ) -> Vec<Action> {
        let gateway = &self.gateway;

        let statuses = self.load_statuses_for_sidebar(state);
        let my_groups = async {
            match current_user_id.filter(|_| calls.my_groups) {
                Some(user_id) => Some(
                    gateway
                        .get_groups_by_user_id(user_id, 0, GROUPS_PER_PAGE)
                        .await
                        .map(Action::ReceivedMyGroups),
                ),
                None => None,
            }
        };
        let channel_groups = async {
            if !calls.channel_groups_in_team {
                return None;
            }
            Some(
                gateway
                    .get_all_groups_associated_to_channels_in_team(&team.id, true)
                    .await
                    .map(|groups_by_channel| Action::ReceivedGroupsAssociatedToChannelsInTeam {
                        team_id: team.id.clone(),
                        groups_by_channel,
                    }),
            )
        };
        let team_groups = async {
            if !calls.team_groups {
                return None;
            }
            Some(
                gateway
                    .get_all_groups_associated_to_team(&team.id, true)
                    .await
                    .map(|groups| Action::ReceivedGroupsAssociatedToTeam {
                        team_id: team.id.clone(),
                        groups,
                    }),
            )
        };
        let all_groups = async {
            if !calls.all_groups {
                return None;
            }
            Some(
                gateway
                    .get_groups(false, 0, GROUPS_PER_PAGE)
                    .await
                    .map(Action::ReceivedGroups),
            )
        };

        let (statuses, my_groups, channel_groups, team_groups, all_groups) =
            join!(statuses, my_groups, channel_groups, team_groups, all_groups);

        let mut actions = Vec::new();
        let results: [Option<Result<Action, ApiError>>; 5] =
            [statuses, my_groups, channel_groups, team_groups, all_groups];
        for result in results.into_iter().flatten() {
            match result {
                Ok(action) => actions.push(action),
                Err(err) => self.handle_api_error(&err).await,
            }
        }
        actions
    }
}
