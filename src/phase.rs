//! Pre-boot / post-boot dispatch.
//!
//! The sentinel file in the user's home is the only persisted state of the
//! installer across the reboot.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::ui::prelude::*;

pub const DEFAULT_SENTINEL: &str = ".run_postinstall";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    /// Running from the live medium: partition, bootstrap, configure boot
    PreBoot,
    /// First login on the installed system: locale, time, hostname, packages
    PostBoot,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::PreBoot => write!(f, "pre-boot"),
            Phase::PostBoot => write!(f, "post-boot"),
        }
    }
}

/// `PostBoot` iff `home_dir/sentinel_name` is a regular file.
///
/// Errors other than "not found" are reported as a warning and read as
/// `PreBoot`.
pub fn decide_phase(home_dir: &Path, sentinel_name: &str) -> Phase {
    let path = home_dir.join(sentinel_name);
    match fs::metadata(&path) {
        Ok(meta) if meta.is_file() => Phase::PostBoot,
        Ok(_) => {
            emit(
                Level::Warn,
                "phase.sentinel.not_file",
                &format!(
                    "Warning: {} exists but is not a regular file, assuming pre-boot",
                    path.display()
                ),
                None,
            );
            Phase::PreBoot
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Phase::PreBoot,
        Err(e) => {
            emit(
                Level::Warn,
                "phase.sentinel.unreadable",
                &format!(
                    "Warning: cannot inspect {} ({}), assuming pre-boot",
                    path.display(),
                    e
                ),
                None,
            );
            Phase::PreBoot
        }
    }
}

/// Explicit transitions of the sentinel marker.
#[derive(Debug, Clone)]
pub struct PhaseMarker {
    path: PathBuf,
}

impl PhaseMarker {
    pub fn new(home_dir: &Path, sentinel_name: &str) -> Self {
        Self {
            path: home_dir.join(sentinel_name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn phase(&self) -> Phase {
        match (self.path.parent(), self.path.file_name()) {
            (Some(dir), Some(name)) => decide_phase(dir, &name.to_string_lossy()),
            _ => Phase::PreBoot,
        }
    }

    /// Pre-boot work is done; the next run finishes the install.
    pub fn mark_complete(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        fs::write(&self.path, b"")
            .with_context(|| format!("Failed to create {}", self.path.display()))?;
        Ok(())
    }

    /// Post-boot work is done; later runs start over from pre-boot.
    pub fn mark_reset(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to remove {}", self.path.display()))
            }
        }
    }
}
