//! Course Bot
//!
//! A console demonstration of the Anvil command core. Type messages starting
//! with the invoker (`!` by default) to run commands:
//!
//! ```text
//! !mycommand trailing a b c
//! !crn watch cs 225 12345
//! !watch cs 225 12345
//! !crn pending
//! /react out-4 clear
//! !wait
//! /edit in-1 !mycommand myoption
//! !notify the lab room is locked
//! ```
//!
//! The `[plugins.course_bot]` config section is described in [`listeners`].
//!
//! # Usage
//!
//! ```bash
//! cargo run --package course-bot -- --user alice
//! ```

mod commands;
mod console;
mod listeners;

use std::path::PathBuf;
use std::sync::Arc;

use anvil::prelude::*;
use anvil::runtime::ConfigLoader;
use anyhow::Result;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::info;

use crate::commands::{CourseBook, Owners};
use crate::console::ConsolePlatform;
use crate::listeners::CourseBotConfig;

#[derive(Debug, Parser)]
#[command(name = "course-bot", about = "Runs the Anvil demo commands on the terminal")]
struct Cli {
    /// Configuration file to load instead of searching for `anvil.toml`.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Course explorer year.
    #[arg(long, default_value_t = 2026)]
    year: u16,

    /// Course explorer semester.
    #[arg(long, default_value = "fall")]
    semester: String,

    /// Who is typing.
    #[arg(short, long, default_value = "student")]
    user: String,
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut loader = ConfigLoader::new().with_current_dir().with_user_config_dir();
    if let Some(path) = &cli.config {
        loader = loader.file(path);
    }
    let config = loader.load_validated()?;
    let settings: CourseBotConfig = config.plugin_config(listeners::PLUGIN)?;

    let platform = Arc::new(ConsolePlatform::new());
    let owners = Owners::new(platform.clone(), settings.owner_channel.as_str());
    let runtime = AnvilRuntime::builder()
        .config(config)
        .platform(platform)
        .commands(commands::registry(CourseBook::new(cli.year, cli.semester), owners)?)
        .build()?;
    listeners::register(&runtime, &settings);

    info!(
        invoker = %runtime.config().bot.invoker,
        user = %cli.user,
        "Course bot ready, /help lists commands"
    );

    let (tx, events) = mpsc::channel(64);
    tokio::spawn(console::read_input(runtime.clone(), cli.user, tx));
    runtime.run(events).await?;

    Ok(())
}
