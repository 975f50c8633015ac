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

//! # PIT Validator
//!
//! A minimal sanity check of a PIT blob (spec.md §4.8): no structural
//! parse, just a length floor and a non-all-zero prefix. Richer parsing
//! is left to a downstream collaborator. Also carries the backup path
//! convention from spec.md §6.

use time::macros::format_description;
use time::OffsetDateTime;

use crate::constants::{PIT_MIN_LEN, PIT_PREFIX_CHECK_LEN};
use crate::error::{LokeError, ProtocolError, Result};

/// Accept a candidate PIT blob if and only if it is at least
/// [`PIT_MIN_LEN`] bytes and has at least one non-zero byte among its
/// first [`PIT_PREFIX_CHECK_LEN`] bytes.
pub fn is_plausible_pit(blob: &[u8]) -> bool {
    if blob.len() < PIT_MIN_LEN {
        return false;
    }
    let prefix_len = blob.len().min(PIT_PREFIX_CHECK_LEN);
    blob[..prefix_len].iter().any(|&b| b != 0)
}

/// Validate `blob`, turning a rejection into [`ProtocolError::PitInvalid`].
pub fn validate(blob: &[u8]) -> Result<()> {
    if is_plausible_pit(blob) {
        Ok(())
    } else if blob.len() < PIT_MIN_LEN {
        Err(LokeError::Protocol(ProtocolError::PitInvalid { reason: "shorter than the minimum PIT length" }))
    } else {
        Err(LokeError::Protocol(ProtocolError::PitInvalid { reason: "prefix is all zero" }))
    }
}

/// Build the backup path for a freshly read PIT blob: `<base>/backup/
/// samsung/pit/<timestamp>.pit`, timestamp `YYYY-MM-DD_HH-mm-ss`
/// (spec.md §6). Does not create any directories or write any file; the
/// caller owns filesystem access.
pub fn backup_path(base: &std::path::Path, at: OffsetDateTime) -> std::path::PathBuf {
    let format = format_description!("[year]-[month]-[day]_[hour]-[minute]-[second]");
    let stamp = at.format(&format).unwrap_or_else(|_| "unknown-time".to_owned());
    base.join("backup").join("samsung").join("pit").join(format!("{stamp}.pit"))
}

#[cfg(test)]
mod test {
    use super::*;
    use std::path::Path;
    use time::macros::datetime;

    #[test]
    fn rejects_short_blobs() {
        assert!(!is_plausible_pit(&[0xAA; 19]));
    }

    #[test]
    fn rejects_all_zero_prefix() {
        let blob = vec![0u8; 200];
        assert!(!is_plausible_pit(&blob));
    }

    #[test]
    fn accepts_minimum_length_with_one_nonzero_byte() {
        let mut blob = vec![0u8; 20];
        blob[19] = 1;
        assert!(is_plausible_pit(&blob));
    }

    #[test]
    fn accepts_nonzero_byte_past_prefix_window_is_still_rejected() {
        // byte 150 is outside the first 100 bytes the validator inspects.
        let mut blob = vec![0u8; 200];
        blob[150] = 1;
        assert!(!is_plausible_pit(&blob));
    }

    #[test]
    fn validate_reports_reason() {
        let err = validate(&[0u8; 5]).unwrap_err();
        assert!(matches!(err, LokeError::Protocol(ProtocolError::PitInvalid { .. })));
    }

    #[test]
    fn backup_path_uses_expected_layout() {
        let at = datetime!(2026 - 07 - 26 13:05:09 UTC);
        let path = backup_path(Path::new("/data/loke"), at);
        assert_eq!(path, Path::new("/data/loke/backup/samsung/pit/2026-07-26_13-05-09.pit"));
    }
}
