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

use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use loke::bulk::{self, ImageStream, TransferOutcome};
use loke::session::Session;
use loke::tar_stream;
use loke::transport::SerialBackend;

#[derive(Args)]
pub struct FlashArgs {
    /// Image to flash: a single `.img`/`.bin` file, or a `.tar` archive
    /// containing several.
    image: PathBuf,

    /// Optional PIT file to write before the image(s).
    #[arg(long)]
    pit: Option<PathBuf>,
}

pub async fn run(session: &mut Session<SerialBackend>, args: FlashArgs) -> Result<()> {
    if let Some(pit_path) = &args.pit {
        let data = std::fs::read(pit_path)
            .with_context(|| format!("reading `{}`", pit_path.display()))?;
        loke::pit::validate(&data)?;
        session.set_pit().await.context("entering PIT-write mode")?;
        session.write_pit(&data).await.context("writing PIT")?;
    }

    let is_tar = args
        .image
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("tar"))
        .unwrap_or(false);

    if is_tar {
        flash_tar(session, &args.image)?;
    } else {
        flash_single(session, &args.image).await?;
    }

    session.end().await.context("ending session")?;
    Ok(())
}

async fn flash_single(session: &mut Session<SerialBackend>, path: &PathBuf) -> Result<()> {
    let mut file =
        File::open(path).with_context(|| format!("opening `{}`", path.display()))?;
    let size = file
        .metadata()
        .with_context(|| format!("reading size of `{}`", path.display()))?
        .len();

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let mut image = ImageStream { name, size, reader: &mut file };
    let outcome = bulk::transfer(session, &mut image).await?;
    report_outcome(&image.name, outcome);
    Ok(())
}

/// Walks the archive synchronously (the `tar` crate is not async) and, for
/// each flashable entry, hops onto the current Tokio runtime to drive the
/// async [`bulk::transfer`] before moving on to the next header.
fn flash_tar(session: &mut Session<SerialBackend>, path: &PathBuf) -> Result<()> {
    let file = File::open(path).with_context(|| format!("opening `{}`", path.display()))?;

    tar_stream::for_each_entry(file, |meta, reader| {
        if !tar_stream::has_flashable_suffix(&meta.name) {
            return Ok(());
        }

        let outcome = tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                let mut image = ImageStream { name: meta.name.clone(), size: meta.size, reader };
                bulk::transfer(session, &mut image).await
            })
        })?;

        report_outcome(&meta.name, outcome);
        Ok(())
    })?;

    Ok(())
}

fn report_outcome(name: &str, outcome: TransferOutcome) {
    match outcome {
        TransferOutcome::Completed => log::info!("`{name}` flashed"),
        TransferOutcome::PartialFailure => {
            log::warn!("`{name}` only partially transferred, continuing")
        }
    }
}
