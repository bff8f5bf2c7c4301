// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Turn a config reference from the command line or tests into an absolute,
/// canonical path.
///
/// Relative references are resolved against the working directory, so
/// `tests/config.yaml` keeps working wherever the hub client is launched
/// from; canonicalization also verifies the file actually exists.
pub fn resolve_config_path(rel: &str) -> Result<PathBuf> {
    let raw = Path::new(rel);
    let absolute = if raw.is_relative() {
        std::env::current_dir()
            .context("working directory is unavailable")?
            .join(raw)
    } else {
        raw.to_path_buf()
    };

    absolute
        .canonicalize()
        .with_context(|| format!("cannot resolve config path {}", absolute.display()))
}
