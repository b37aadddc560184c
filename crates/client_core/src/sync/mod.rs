//! Sequencing of gateway calls and store commits for user intents.
//!
//! Every public operation returns a [`SyncResult`]. Gateway failures are
//! caught where they happen: the session is checked for invalidation, the
//! error is logged, and the error is returned. Nothing here retries.

use std::{future::Future, sync::Arc};

use futures::try_join;
use shared::{domain::UserProfile, error::ApiError};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::{
    error::{SyncError, SyncResult},
    gateway::RemoteGateway,
    local_store::LocalStore,
    store::{Action, Batch, ClientStore},
    ClientEvent, DetachedTask,
};

mod channels;
mod groups;
mod loaders;
mod team;

pub use channels::ChannelsAndMembers;
pub use groups::{GroupCalls, GroupSyncFlags};

pub struct SyncOrchestrator {
    gateway: Arc<dyn RemoteGateway>,
    local_store: Arc<dyn LocalStore>,
    store: ClientStore,
    events: broadcast::Sender<ClientEvent>,
}

impl SyncOrchestrator {
    pub fn new(
        gateway: Arc<dyn RemoteGateway>,
        local_store: Arc<dyn LocalStore>,
        store: ClientStore,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(1024);
        Arc::new(Self {
            gateway,
            local_store,
            store,
            events,
        })
    }

    pub fn store(&self) -> &ClientStore {
        &self.store
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }

    /// Starts `future` on the runtime and forgets it.
    fn spawn_detached<F>(&self, task: DetachedTask, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!(task = ?task, "sync: detached task spawned");
        tokio::spawn(future);
        self.emit(ClientEvent::DetachedTaskSpawned(task));
    }

    /// Fetches the current user, license and client config as one session
    /// batch.
    pub async fn load_me(&self) -> SyncResult<UserProfile> {
        let loaded = try_join!(
            self.gateway.get_me(),
            self.gateway.get_client_license(),
            self.gateway.get_client_config(),
        );
        match loaded {
            Ok((me, license, config)) => {
                self.store
                    .commit(Batch::new(
                        "load_me",
                        vec![
                            Action::ReceivedClientConfig(config),
                            Action::ReceivedLicense(license),
                            Action::ReceivedMe(me.clone()),
                        ],
                    ))
                    .await;
                info!(user_id = %me.id, username = %me.username, "sync: session loaded");
                Ok(me)
            }
            Err(err) => {
                self.handle_api_error(&err).await;
                Err(err.into())
            }
        }
    }

    /// Forces a logout when `err` says the session token was rejected.
    async fn force_logout_if_necessary(&self, err: &ApiError) {
        if !err.is_session_invalid() {
            return;
        }
        if self.store.snapshot().await.current_user_id.is_none() {
            return;
        }

        warn!(
            url = err.url.as_deref().unwrap_or_default(),
            "sync: session rejected by server, forcing logout"
        );
        self.store
            .dispatch("force_logout", Action::LogoutSuccess)
            .await;
        self.emit(ClientEvent::ForcedLogout);
    }

    async fn log_error(&self, err: &ApiError) {
        error!(
            code = ?err.code,
            status_code = err.status_code,
            server_error_id = err.server_error_id.as_deref().unwrap_or_default(),
            url = err.url.as_deref().unwrap_or_default(),
            "sync: {}",
            err.message
        );
        if err.is_embargoed() {
            warn!("sync: requested entity is embargoed for this client");
        }
        self.store
            .dispatch("log_error", Action::LogError(err.clone()))
            .await;
    }

    async fn handle_api_error(&self, err: &ApiError) {
        self.force_logout_if_necessary(err).await;
        self.log_error(err).await;
    }

    async fn handle_sync_error(&self, err: &SyncError) {
        match err.api() {
            Some(api) => self.handle_api_error(api).await,
            None => {
                error!("sync: {err}");
                self.emit(ClientEvent::Error(err.to_string()));
            }
        }
    }
}

#[cfg(test)]
#[path = "../tests/sync_tests.rs"]
mod tests;
