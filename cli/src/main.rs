// Copyright 2026 LOKE Flasher Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use loke::observer::{LogLevel, Observer, PortEvent};

mod flash;
mod list;
mod pit;

#[derive(Parser)]
#[command(name = "loke", about = "Host program for the Samsung Odin/LOKE Download Mode protocol")]
struct Cli {
    /// Serial port to use; auto-detected via the device locator if omitted.
    #[arg(short, long, global = true)]
    port: Option<String>,

    /// Verbosity: -v (debug), -vv (trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List serial ports, tagging likely Samsung Download Mode devices.
    List,
    /// Flash a firmware image or tar archive.
    Flash(flash::FlashArgs),
    /// Read or write the partition table (PIT).
    Pit(pit::PitArgs),
    /// Reboot the device out of Download Mode.
    Reboot,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logger(match cli.verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    })?;

    if matches!(cli.command, Command::List) {
        return list::list();
    }

    let observer: Arc<dyn Observer> = Arc::new(CliObserver);

    let port = resolve_port(cli.port.as_deref()).await?;
    log::info!("Connecting on `{port}`");
    let mut session = loke::connect(&port, observer).await.context("connecting to device")?;
    session.greet().await.context("greeting device")?;

    match cli.command {
        Command::List => unreachable!("handled above"),
        Command::Flash(args) => flash::run(&mut session, args).await?,
        Command::Pit(args) => pit::run(&mut session, args).await?,
        Command::Reboot => session.reboot().await.context("rebooting device")?,
    }

    Ok(())
}

async fn resolve_port(explicit: Option<&str>) -> Result<String> {
    if let Some(p) = explicit {
        return Ok(p.to_owned());
    }

    loke::locate()
        .await
        .map(|d| d.port_name)
        .context("no Samsung Download Mode device found; pass --port explicitly")
}

/// Bridges the engine's [`Observer`] notifications to the terminal.
/// `on_log` is a no-op: the `log` crate macros the engine also calls
/// already reach this same terminal through `env_logger`.
struct CliObserver;

impl Observer for CliObserver {
    fn on_log(&self, _level: LogLevel, _message: &str) {}

    fn on_progress(&self, bytes_sent: u64, total: u64) {
        if total == 0 {
            return;
        }
        let pct = (bytes_sent * 100 / total).min(100);
        print!("\r{pct:3}% ({bytes_sent}/{total} bytes)");
        let _ = io::stdout().flush();
        if bytes_sent >= total {
            println!();
        }
    }

    fn on_port(&self, event: PortEvent) {
        match event {
            PortEvent::Added(name) => log::info!("device present on `{name}`"),
            PortEvent::Removed => log::info!("device no longer present"),
            PortEvent::Changed(old, new) => log::info!("device moved from `{old}` to `{new}`"),
        }
    }
}

fn init_logger(level: log::LevelFilter) -> Result<()> {
    let mut logger = env_logger::Builder::from_env("LOKE_LOG");
    logger.filter_level(level);
    logger.format(log_format);
    logger.try_init().context("failed to initialize logger")
}

fn log_format(fmt: &mut env_logger::fmt::Formatter, record: &log::Record<'_>) -> io::Result<()> {
    let level = match record.level() {
        log::Level::Error => "ERROR",
        log::Level::Warn => "WARN",
        log::Level::Info => "INFO",
        log::Level::Debug => "DBG",
        log::Level::Trace => "TRACE",
    };
    writeln!(fmt, "[{level}] {}", record.args())
}
