use std::time::Duration;

use anyhow::{Context, Result};
use clap::Subcommand;
use log::info;

use partywave_core::{OperationResult, RoomId, Runtime, RuntimeStore};

/// Operations on the live state of a single room
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the room's queue, playback, and presence as JSON
    Inspect { room_id: RoomId },
    /// List the members that are online
    Online { room_id: RoomId },
    /// Skip the current track
    Skip { room_id: RoomId },
    /// Mark the current track as played and start the next one
    Complete { room_id: RoomId },
    /// Stop playback, keeping the queue
    Stop { room_id: RoomId },
    /// Let the room's state expire unless someone comes back
    Deactivate {
        room_id: RoomId,
        /// Seconds until the state expires, defaults to the configured idle time to live
        #[arg(long)]
        ttl: Option<u64>,
    },
    /// Delete all of the room's live state
    Teardown { room_id: RoomId },
}

pub async fn run<S>(runtime: &Runtime<S>, command: Command) -> Result<()>
where
    S: RuntimeStore,
{
    match command {
        Command::Inspect { room_id } => {
            let snapshot = runtime.snapshot(room_id).await?;
            let json = serde_json::to_string_pretty(&snapshot)
                .context("Could not serialize the snapshot")?;

            println!("{json}");
        }
        Command::Online { room_id } => {
            let members = runtime.presence.members(room_id).await?;

            for user_id in &members {
                println!("{user_id}");
            }

            info!("{} member(s) online in room {}", members.len(), room_id);
        }
        Command::Skip { room_id } => {
            report(runtime.playback.skip_track(room_id).await?);
        }
        Command::Complete { room_id } => {
            report(runtime.playback.complete_track(room_id).await?);
        }
        Command::Stop { room_id } => {
            runtime.playback.stop_playback(room_id).await?;
            println!("Playback stopped");
        }
        Command::Deactivate { room_id, ttl } => {
            let ttl = ttl
                .map(Duration::from_secs)
                .unwrap_or(runtime.config().idle_ttl);

            runtime.lifecycle.deactivate(room_id, ttl).await?;
            println!("Room expires in {}s unless someone joins", ttl.as_secs());
        }
        Command::Teardown { room_id } => {
            let deleted = runtime.lifecycle.teardown(room_id, &[]).await?;
            println!("Deleted {deleted} item(s)");
        }
    }

    Ok(())
}

fn report(result: OperationResult) {
    match result.item_id {
        Some(item_id) if result.success => println!("{} ({})", result.message, item_id),
        _ => println!("{}", result.message),
    }
}
