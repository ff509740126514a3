//! Path resolution for Parlance data files.
//!
//! Resolved once at startup from: `--data-dir` > `PARLANCE_DATA_DIR` env > `~/.parlance`.

use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;

pub const DATA_DIR_ENV: &str = "PARLANCE_DATA_DIR";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Priority: `explicit` arg > `env_value` > `~/.parlance`.
    pub fn resolve(explicit: Option<&Path>, env_value: Option<String>) -> anyhow::Result<Self> {
        let root = if let Some(p) = explicit {
            p.to_path_buf()
        } else if let Some(env_val) = env_value.filter(|v| !v.trim().is_empty()) {
            PathBuf::from(env_val)
        } else {
            dirs::home_dir()
                .context("HOME directory not found; pass --data-dir")?
                .join(".parlance")
        };
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    pub fn token_file_path(&self) -> PathBuf {
        self.root.join("auth-token")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Create all required subdirectories under the data dir.
    pub fn ensure_dirs(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.log_dir())?;
        Ok(())
    }
}
