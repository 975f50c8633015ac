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

//! # Tar Streamer
//!
//! Walks a ustar archive sequentially and hands each non-empty,
//! non-directory entry to the caller as a bounded reader, without
//! extracting anything to disk (spec.md §4.7). The caller must drain the
//! bounded reader before the visitor returns; the underlying `tar` crate
//! then seeks the outer archive to the next header.

use std::io::{self, Read};

use crate::error::{ExternalError, LokeError, Result};

/// Metadata for one archive entry, handed to the visitor alongside its
/// bounded reader.
#[derive(Debug, Clone)]
pub struct TarEntryMeta {
    pub name: String,
    pub size: u64,
}

/// A reader view that refuses reads past `size`, independent of the
/// underlying reader's own position (spec.md §3 `TarEntry` invariant).
/// `tar::Entry` already enforces this internally; wrapping it here keeps
/// the contract explicit and testable without a real archive.
pub struct BoundedReader<R> {
    inner: R,
    remaining: u64,
}

impl<R: Read> BoundedReader<R> {
    pub fn new(inner: R, size: u64) -> Self {
        BoundedReader { inner, remaining: size }
    }
}

impl<R: Read> Read for BoundedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Ok(0);
        }
        let cap = buf.len().min(self.remaining as usize);
        let n = self.inner.read(&mut buf[..cap])?;
        self.remaining -= n as u64;
        Ok(n)
    }
}

/// Case-insensitive suffix check for the image/PIT filenames the bulk
/// engine and PIT path care about.
pub fn has_flashable_suffix(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".pit") || lower.ends_with(".img") || lower.ends_with(".bin")
}

fn tar_err(e: impl std::fmt::Display) -> LokeError {
    ExternalError::TarCorrupt(e.to_string()).into()
}

/// Visit every non-directory, non-empty entry of `source` in archive
/// order. `visit` receives the entry's metadata and a bounded reader; it
/// must fully drain (or intentionally stop early on, which is also safe)
/// the reader before returning, per the outer walker's sequential-access
/// contract.
pub fn for_each_entry<R, F>(source: R, mut visit: F) -> Result<()>
where
    R: Read,
    F: FnMut(TarEntryMeta, &mut dyn Read) -> Result<()>,
{
    let mut archive = tar::Archive::new(source);
    let entries = archive.entries().map_err(tar_err)?;

    for entry in entries {
        let mut entry = entry.map_err(tar_err)?;
        let header = entry.header().clone();

        if header.entry_type().is_dir() {
            continue;
        }

        let size = header.size().map_err(tar_err)?;
        if size == 0 {
            continue;
        }

        let name = entry
            .path()
            .map_err(tar_err)?
            .to_string_lossy()
            .into_owned();

        let mut bounded = BoundedReader::new(&mut entry, size);
        visit(TarEntryMeta { name, size }, &mut bounded)?;
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    fn build_tar(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[test]
    fn walks_entries_in_order_and_reports_size() {
        let data = build_tar(&[("boot.img", b"hello world"), ("pit/main.pit", b"\x01\x02\x03")]);

        let mut seen = Vec::new();
        for_each_entry(Cursor::new(data), |meta, reader| {
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf).unwrap();
            seen.push((meta.name, meta.size, buf));
            Ok(())
        })
        .unwrap();

        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, "boot.img");
        assert_eq!(seen[0].1, 11);
        assert_eq!(seen[0].2, b"hello world");
        assert_eq!(seen[1].0, "pit/main.pit");
        assert_eq!(seen[1].2, vec![1, 2, 3]);
    }

    #[test]
    fn bounded_reader_refuses_reads_past_declared_size() {
        let mut reader = BoundedReader::new(Cursor::new(b"abcdefgh".to_vec()), 4);
        let mut buf = [0u8; 100];
        let n = reader.read(&mut buf).unwrap();
        assert_eq!(n, 4);
        assert_eq!(&buf[..4], b"abcd");

        let n2 = reader.read(&mut buf).unwrap();
        assert_eq!(n2, 0);
    }

    #[test]
    fn flashable_suffix_is_case_insensitive() {
        assert!(has_flashable_suffix("BOOT.IMG"));
        assert!(has_flashable_suffix("main.PIT"));
        assert!(has_flashable_suffix("modem.bin"));
        assert!(!has_flashable_suffix("readme.txt"));
    }
}
