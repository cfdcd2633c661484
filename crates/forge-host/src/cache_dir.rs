// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! On-disk result-cache layout.
//!
//! Entries are addressed by `(configuration id, target name)` under a
//! caller-provided temp root. The root may contain braces and other
//! glyphs that string formatters treat as placeholders; composition here
//! is pure path-segment joining, so nothing is ever interpreted.

use std::path::{Path, PathBuf};

use forge_core::{result_file_name, ConfigurationId};

/// Directory holding every result-cache entry under `temp_root`.
#[must_use]
pub fn result_cache_root(temp_root: &Path) -> PathBuf {
    temp_root.join("forge-results")
}

/// Full path of the entry for `(configuration, target)`.
#[must_use]
pub fn result_cache_path(temp_root: &Path, id: ConfigurationId, target: &str) -> PathBuf {
    result_cache_root(temp_root).join(result_file_name(id, target))
}
