//! Installer configuration.
//!
//! Every section carries `#[serde(default)]`, so a file only needs the values
//! that differ from the defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::phase::DEFAULT_SENTINEL;
use crate::ui::prelude::*;

pub const SYSTEM_CONFIG_FILE: &str = "/etc/archlvm/install.toml";
pub const CONFIG_DIR_NAME: &str = "archlvm";
pub const CONFIG_FILE_NAME: &str = "install.toml";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct InstallConfig {
    pub disk: DiskConfig,
    pub volumes: VolumeConfig,
    pub system: SystemConfig,
    pub user: UserConfig,
    pub packages: PackageConfig,
    pub resume: ResumeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiskConfig {
    /// Whole disk that gets repartitioned
    pub device: String,
    /// Size of the EFI system partition, in sfdisk notation
    pub efi_size: String,
    pub efi_label: String,
    /// Where the new root is assembled
    pub mount_point: PathBuf,
    /// Mount point of the ESP inside the new root
    pub efi_directory: String,
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            device: "/dev/sda".to_string(),
            efi_size: "512M".to_string(),
            efi_label: "EFI".to_string(),
            mount_point: PathBuf::from("/mnt"),
            efi_directory: "/boot".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VolumeConfig {
    pub group: String,
    pub swap_size: String,
    pub root_size: String,
    pub swap_label: String,
    pub root_label: String,
    pub home_label: String,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            group: "vg0".to_string(),
            swap_size: "4G".to_string(),
            root_size: "32G".to_string(),
            swap_label: "swap".to_string(),
            root_label: "root".to_string(),
            home_label: "home".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SystemConfig {
    pub hostname: String,
    /// Locale name as listed in /etc/locale.gen, e.g. `en_US.UTF-8`
    pub locale: String,
    pub timezone: String,
    pub keymap: String,
    pub mkinitcpio_conf: String,
    pub bootloader_id: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            hostname: "archlinux".to_string(),
            locale: "en_US.UTF-8".to_string(),
            timezone: "UTC".to_string(),
            keymap: "us".to_string(),
            mkinitcpio_conf: crate::mkinitcpio::DEFAULT_FILE.to_string(),
            bootloader_id: "GRUB".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UserConfig {
    pub name: String,
    pub groups: Vec<String>,
    pub shell: String,
    /// Line placed in the sudoers fragment
    pub sudoers_rule: String,
    pub sudoers_fragment: String,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            name: "user".to_string(),
            groups: vec!["wheel".to_string()],
            shell: "/bin/bash".to_string(),
            sudoers_rule: "%wheel ALL=(ALL:ALL) ALL".to_string(),
            sudoers_fragment: "/etc/sudoers.d/10-wheel".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PackageConfig {
    /// Installed with pacstrap
    pub base: Vec<String>,
    /// Installed on first login
    pub extra: Vec<String>,
    /// Units enabled in the new system
    pub services: Vec<String>,
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            base: [
                "base",
                "linux",
                "linux-firmware",
                "lvm2",
                "grub",
                "efibootmgr",
                "sudo",
                "networkmanager",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            extra: ["git", "vim", "man-db"].iter().map(|s| s.to_string()).collect(),
            services: vec!["NetworkManager".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResumeConfig {
    pub sentinel: String,
    /// Login profile, relative to the user's home, that re-invokes the installer
    pub profile: String,
    /// Name of the relocated binary in the user's home
    pub binary_name: String,
}

impl Default for ResumeConfig {
    fn default() -> Self {
        Self {
            sentinel: DEFAULT_SENTINEL.to_string(),
            profile: ".bash_profile".to_string(),
            binary_name: "archlvm".to_string(),
        }
    }
}

impl InstallConfig {
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: InstallConfig = toml::from_str(content).context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Failed to load {}", path.display()))
    }

    /// Load the first configuration found: explicit path, user config dir,
    /// system file, built-in defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            if !path.exists() {
                anyhow::bail!("Configuration file not found: {}", path.display());
            }
            return Ok((Self::load_from(path)?, Some(path.to_path_buf())));
        }

        for candidate in default_locations() {
            if candidate.is_file() {
                emit(
                    Level::Debug,
                    "config.found",
                    &format!("Using configuration {}", candidate.display()),
                    None,
                );
                return Ok((Self::load_from(&candidate)?, Some(candidate)));
            }
        }

        emit(
            Level::Debug,
            "config.defaults",
            "No configuration file found, using built-in defaults",
            None,
        );
        Ok((Self::default(), None))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }

    pub fn validate(&self) -> Result<()> {
        let required = [
            ("disk.device", &self.disk.device),
            ("volumes.group", &self.volumes.group),
            ("system.hostname", &self.system.hostname),
            ("system.locale", &self.system.locale),
            ("system.timezone", &self.system.timezone),
            ("user.name", &self.user.name),
            ("resume.sentinel", &self.resume.sentinel),
            ("resume.binary_name", &self.resume.binary_name),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                anyhow::bail!("Configuration value '{}' must not be empty", key);
            }
        }

        if !self.disk.device.starts_with("/dev/") {
            anyhow::bail!("disk.device must be a /dev path, got '{}'", self.disk.device);
        }
        if !self.disk.mount_point.is_absolute() {
            anyhow::bail!(
                "disk.mount_point must be absolute, got '{}'",
                self.disk.mount_point.display()
            );
        }
        for (key, value) in [
            ("disk.efi_directory", &self.disk.efi_directory),
            ("system.mkinitcpio_conf", &self.system.mkinitcpio_conf),
            ("user.sudoers_fragment", &self.user.sudoers_fragment),
        ] {
            if !value.starts_with('/') {
                anyhow::bail!("{} must be an absolute path, got '{}'", key, value);
            }
        }
        for (key, value) in [
            ("resume.sentinel", &self.resume.sentinel),
            ("resume.binary_name", &self.resume.binary_name),
        ] {
            if !is_plain_file_name(value) {
                anyhow::bail!(
                    "{} must be a plain file name (letters, digits, '.', '_', '-'), got '{}'",
                    key,
                    value
                );
            }
        }
        if self.packages.base.is_empty() {
            anyhow::bail!("packages.base must list at least one package");
        }
        Ok(())
    }

    /// Path inside the new root for an absolute path of the installed system.
    pub fn target_path(&self, path: &str) -> PathBuf {
        self.disk.mount_point.join(path.trim_start_matches('/'))
    }

    /// Home directory of the new user, as seen from the installed system.
    pub fn user_home(&self) -> PathBuf {
        PathBuf::from("/home").join(&self.user.name)
    }

    pub fn mapper_path(&self, volume: &str) -> String {
        format!("/dev/{}/{}", self.volumes.group, volume)
    }
}

/// Config file written for the installed user so the resumed run finds it.
pub fn user_config_relative_path() -> PathBuf {
    PathBuf::from(".config")
        .join(CONFIG_DIR_NAME)
        .join(CONFIG_FILE_NAME)
}

fn default_locations() -> Vec<PathBuf> {
    let mut locations = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        locations.push(dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME));
    }
    locations.push(PathBuf::from(SYSTEM_CONFIG_FILE));
    locations
}

/// Names that end up in the login profile must not need shell quoting.
fn is_plain_file_name(name: &str) -> bool {
    name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}
