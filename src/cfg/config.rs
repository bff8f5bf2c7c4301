// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// Where and how the duplex channel is opened.
    pub transport: TransportConfig,
}

/// Settings for the underlying duplex carrier.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TransportConfig {
    #[serde(rename = "Endpoint")]
    /// Hub endpoint as `host:port`.
    pub endpoint: String,

    #[serde(rename = "TimeoutConnection", with = "serde_secs")]
    /// Timeout for establishing the TCP connection.
    pub timeout_connection: Duration,

    #[serde(rename = "TimeoutIo", with = "serde_secs")]
    /// Bound on every transport write and on inbound frame-body reads.
    /// Waiting for the *next* frame is never bounded; idle channels are
    /// normal.
    pub timeout_io: Duration,

    #[serde(rename = "MaxFrameLength", default = "default_max_frame_length")]
    /// Upper bound on a single frame, both directions.
    pub max_frame_length: u32,
}

fn default_max_frame_length() -> u32 {
    4 * 1024 * 1024
}

impl Config {
    /// Loads the configuration from YAML, validates it, and returns the
    /// ready-to-use value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let cfg: Config = serde_yaml::from_str(&s).context("failed to parse config YAML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validates invariants.
    pub fn validate(&self) -> Result<()> {
        let t = &self.transport;
        ensure!(!t.endpoint.is_empty(), "Endpoint must not be empty");
        ensure!(
            t.timeout_connection >= Duration::from_secs(1),
            "TimeoutConnection must be >= 1s"
        );
        ensure!(
            t.timeout_io >= Duration::from_secs(1),
            "TimeoutIo must be >= 1s"
        );
        // Room for the envelope header in front of any payload.
        ensure!(
            t.max_frame_length >= 16,
            "MaxFrameLength must be >= 16 bytes"
        );
        Ok(())
    }
}

mod serde_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}
