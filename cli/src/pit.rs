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

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use loke::session::Session;
use loke::transport::SerialBackend;

#[derive(Args)]
pub struct PitArgs {
    #[command(subcommand)]
    pub action: PitAction,
}

#[derive(Subcommand)]
pub enum PitAction {
    /// Read the PIT back from the device and save a timestamped backup.
    Read {
        /// Base directory; the backup lands at `<dir>/backup/samsung/pit/<timestamp>.pit`.
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Write a PIT file to the device.
    Write {
        /// PIT file to upload.
        file: PathBuf,
    },
}

pub async fn run(session: &mut Session<SerialBackend>, args: PitArgs) -> Result<()> {
    match args.action {
        PitAction::Read { out_dir } => {
            let blob = session.read_pit().await.context("reading PIT")?;
            loke::pit::validate(&blob)?;

            let path = loke::pit::backup_path(&out_dir, time::OffsetDateTime::now_utc());
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating `{}`", parent.display()))?;
            }
            std::fs::write(&path, &blob)
                .with_context(|| format!("writing `{}`", path.display()))?;
            log::info!("PIT backed up to `{}`", path.display());
        }
        PitAction::Write { file } => {
            let data =
                std::fs::read(&file).with_context(|| format!("reading `{}`", file.display()))?;
            loke::pit::validate(&data)?;

            session.set_pit().await.context("entering PIT-write mode")?;
            session.write_pit(&data).await.context("writing PIT")?;
            log::info!("PIT written from `{}`", file.display());
        }
    }

    Ok(())
}
