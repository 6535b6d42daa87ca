//! Command-line interface. The binary runs the service by default;
//! subcommands inspect local state without it.

use anyhow::{anyhow, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};

use crate::db::{Database, RecordingStore};

#[derive(Parser, Debug)]
#[command(name = "boardcast")]
#[command(about = "Recording service for collaborative whiteboards", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Print version information
    Version,
    /// Inspect or delete saved recordings
    Recordings(RecordingsCliArgs),
}

#[derive(ClapArgs, Debug)]
pub struct RecordingsCliArgs {
    #[command(subcommand)]
    pub command: RecordingsCommand,
}

#[derive(Subcommand, Debug)]
pub enum RecordingsCommand {
    /// List a project's saved recordings
    List {
        /// Project to list recordings for
        project_id: String,
    },
    /// Delete a recording's metadata row by id
    Delete {
        /// Recording id to delete
        id: String,
    },
}

pub fn handle_recordings_command(args: RecordingsCliArgs) -> Result<()> {
    let store = RecordingStore::new(Database::open_default()?);

    match args.command {
        RecordingsCommand::List { project_id } => {
            let recordings = store.list(&project_id)?;
            if recordings.is_empty() {
                println!("No recordings found for project {}.", project_id);
                return Ok(());
            }

            println!("Found {} recording(s):\n", recordings.len());
            for recording in recordings {
                println!("ID: {}", recording.id);
                println!("Name: {}", recording.name);
                println!("Date: {}", recording.created_at);
                println!(
                    "Size: {} bytes ({}s)",
                    recording.size_bytes, recording.duration_seconds
                );
                println!("URL: {}", recording.remote_url);
                println!("---");
            }
        }
        RecordingsCommand::Delete { id } => {
            if !store.delete(&id)? {
                return Err(anyhow!("Recording with ID {} not found", id));
            }
            println!("Deleted recording {}.", id);
            println!("Note: only the metadata row is removed; uploaded bytes remain in storage.");
        }
    }

    Ok(())
}
