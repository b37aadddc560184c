use shared::domain::{ChannelId, UserId};

pub mod error;
pub mod gateway;
pub mod local_store;
pub mod selectors;
pub mod store;
pub mod sync;

pub use error::{SyncError, SyncResult};
pub use gateway::{HttpGateway, RemoteGateway};
pub use local_store::{LocalStore, MemoryLocalStore};
pub use store::{Action, Batch, ClientStore, EntitiesState, RequestStatus};
pub use sync::{ChannelsAndMembers, GroupCalls, GroupSyncFlags, SyncOrchestrator};

/// Side work started without a join handle. Its outcome is never reported
/// back to the operation that started it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetachedTask {
    LoadRoles(Vec<String>),
    LoadNewDm(ChannelId),
    LoadNewGm(ChannelId),
    LoadProfilesForSidebar,
    LoadProfiles(Vec<UserId>),
    LoadProfilesInChannel(ChannelId),
    SavePreferences { user_id: UserId, count: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// The UI should move to `url`.
    Navigate { url: String },
    ForcedLogout,
    DetachedTaskSpawned(DetachedTask),
    Error(String),
}

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;
