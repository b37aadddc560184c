use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::{ClientEvent, ClientStore, HttpGateway, RemoteGateway, SyncOrchestrator};
use serde::Serialize;
use shared::domain::{ChannelId, UserId};
use storage::ClientStorage;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;

#[derive(Parser, Debug)]
#[command(about = "Synchronizes teams and channels with a chat server")]
struct Args {
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    token: Option<String>,
    #[arg(long)]
    database_url: Option<String>,
    /// Team to initialize before running the command.
    #[arg(long)]
    team: Option<String>,
    /// Time given to background loads before exiting.
    #[arg(long, default_value_t = 500)]
    settle_ms: u64,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Join a team by name and load its channels.
    JoinTeam {
        name: String,
        #[arg(long)]
        first_load: bool,
    },
    /// Fetch channels and memberships in one query.
    Channels {
        #[arg(long)]
        all_teams: bool,
    },
    /// Refresh the current team and prefetch unread direct/group channels.
    LoadChannels,
    OpenDm {
        user_id: String,
    },
    OpenGm {
        #[arg(required = true, num_args = 2..)]
        user_ids: Vec<String>,
    },
    Search {
        term: String,
        #[arg(long)]
        archived: bool,
    },
    Autocomplete {
        term: String,
        #[arg(long)]
        for_search: bool,
    },
    AddUsers {
        channel_id: String,
        #[arg(required = true)]
        user_ids: Vec<String>,
    },
    Mute {
        channel_id: String,
    },
    Unmute {
        channel_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = config::load_settings()?;
    if let Some(v) = args.server_url.clone() {
        settings.server_url = v;
    }
    if let Some(v) = args.token.clone() {
        settings.auth_token = Some(v);
    }
    if let Some(v) = args.database_url.clone() {
        settings.database_url = v;
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&settings.log_filter))
        .init();

    let storage = ClientStorage::new(&settings.database_url)
        .await
        .with_context(|| format!("failed to open client storage '{}'", settings.database_url))?;
    storage.health_check().await?;
    let storage = Arc::new(storage);
    let gateway: Arc<dyn RemoteGateway> =
        Arc::new(HttpGateway::new(&settings.server_url, settings.auth_token.clone())?);
    let sync = SyncOrchestrator::new(gateway.clone(), storage.clone(), ClientStore::default());
    let mut events = sync.subscribe_events();

    let me = sync.load_me().await?;
    info!(user_id = %me.id, server_url = %settings.server_url, "desktop: logged in");

    if let Some(team_name) = args.team.as_deref() {
        let team = gateway.get_team_by_name(team_name).await?;
        sync.initialize_team(team).await?;
    }

    match args.command {
        Command::JoinTeam { name, first_load } => {
            print_json(&sync.join_team(&name, first_load).await?)?;
        }
        Command::Channels { all_teams } => {
            let state = sync.store().snapshot().await;
            let team_id = client_core::selectors::current_team_id(&state).filter(|_| !all_teams);
            let loaded = sync.fetch_channels_and_members(team_id).await?;
            print_json(&loaded.channels)?;
        }
        Command::LoadChannels => {
            sync.load_channels_for_current_user().await?;
            let state = sync.store().snapshot().await;
            print_json(&client_core::selectors::unread_channel_ids(&state))?;
        }
        Command::OpenDm { user_id } => {
            print_json(&sync.open_direct_channel_to_user_id(&UserId::new(user_id)).await?)?;
        }
        Command::OpenGm { user_ids } => {
            let user_ids: Vec<UserId> = user_ids.into_iter().map(UserId::new).collect();
            print_json(&sync.open_group_channel_to_user_ids(&user_ids).await?)?;
        }
        Command::Search { term, archived } => {
            print_json(&sync.search_more_channels(&term, archived).await?)?;
        }
        Command::Autocomplete { term, for_search } => {
            let found = if for_search {
                sync.autocomplete_channels_for_search(&term).await?
            } else {
                sync.autocomplete_channels(&term).await?
            };
            print_json(&found.unwrap_or_default())?;
        }
        Command::AddUsers {
            channel_id,
            user_ids,
        } => {
            let user_ids: Vec<UserId> = user_ids.into_iter().map(UserId::new).collect();
            let added = sync
                .add_users_to_channel(&ChannelId::new(channel_id), &user_ids)
                .await?;
            print_json(&added)?;
        }
        Command::Mute { channel_id } => {
            sync.mute_channel(&me.id, &ChannelId::new(channel_id)).await?;
        }
        Command::Unmute { channel_id } => {
            sync.unmute_channel(&me.id, &ChannelId::new(channel_id))
                .await?;
        }
    }

    if let Some(team_id) = storage.take_team_id_joined_on_load().await? {
        println!("welcome: joined team {team_id} on first load");
    }

    tokio::time::sleep(Duration::from_millis(args.settle_ms)).await;
    while let Ok(event) = events.try_recv() {
        match event {
            ClientEvent::Navigate { url } => println!("navigate: {url}"),
            ClientEvent::ForcedLogout => println!("session expired, logged out"),
            ClientEvent::Error(message) => eprintln!("error: {message}"),
            ClientEvent::DetachedTaskSpawned(task) => info!(task = ?task, "desktop: background task"),
        }
    }

    Ok(())
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
