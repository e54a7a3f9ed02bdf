// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::feed::FeedSettings;
use crate::lifecycle::LifecycleOptions;
use crate::worker::WorkerSettings;

/// Everything the binary needs to run, as read from a JSON config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Address the HTTP server listens on
    pub bind: SocketAddr,
    /// Root of the file-backed record store
    pub data_dir: PathBuf,
    pub feed: FeedSettings,
    pub lifecycle: LifecycleOptions,
    pub worker: WorkerSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from((Ipv4Addr::LOCALHOST, 8090)),
            data_dir: PathBuf::from("./showfeed_data"),
            feed: FeedSettings::default(),
            lifecycle: LifecycleOptions::default(),
            worker: WorkerSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from a JSON file; missing keys keep their defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        let settings: Settings =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseFailed {
                path: path.to_path_buf(),
                source: e,
            })?;

        settings.validate()?;
        Ok(settings)
    }

    /// Reject combinations the server cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.feed.server_base.cannot_be_a_base() {
            return Err(ConfigError::UnroutableBase(
                self.feed.server_base.to_string(),
            ));
        }

        // Renewal runs every third of the lease, at least once a second
        if self.lifecycle.lease_seconds < 3 {
            return Err(ConfigError::Invalid {
                key: "lifecycle.lease_seconds",
                reason: format!("{} is shorter than 3 seconds", self.lifecycle.lease_seconds),
            });
        }

        if self.lifecycle.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "lifecycle.max_attempts",
                reason: "at least one attempt is needed".to_string(),
            });
        }

        Ok(())
    }

    /// Load from `path` when given, otherwise start from defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn set_worker_endpoint(&mut self, endpoint: &str) -> Result<(), ConfigError> {
        self.worker.endpoint = Some(url::Url::parse(endpoint)?);
        Ok(())
    }
}
