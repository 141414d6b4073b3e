//! Resume registration.
//!
//! The installer copies itself into the new user's home, leaves its effective
//! configuration next to it and hooks the login profile. On the first login
//! after reboot the profile runs the copy without arguments; the sentinel then
//! selects the post-boot phase.

use anyhow::Result;
use std::path::Path;

use super::paths::{CHROOT, PROFILE_MARKER};
use super::runbook::{Action, Runbook};
use super::step::Stage;
use crate::common::shell::shell_quote;
use crate::config::{InstallConfig, user_config_relative_path};

/// Profile lines that re-run the relocated installer while the sentinel exists.
pub fn resume_snippet(config: &InstallConfig) -> String {
    format!(
        "{marker}\nif [ -f \"$HOME\"/{sentinel} ] && [ -x \"$HOME\"/{binary} ]; then\n    \"$HOME\"/{binary}\nfi\n",
        marker = PROFILE_MARKER,
        sentinel = shell_quote(&config.resume.sentinel),
        binary = shell_quote(&config.resume.binary_name),
    )
}

pub fn runbook(config: &InstallConfig, current_exe: &Path) -> Result<Runbook> {
    let root = config.disk.mount_point.to_string_lossy().to_string();
    let home = config.user_home();
    let target_home = config.target_path(&home.to_string_lossy());
    let owner = format!("{0}:{0}", config.user.name);
    let home_str = home.to_string_lossy().to_string();

    let mut book = Runbook::new(Stage::Handoff);
    book.push(
        "Copy installer",
        Action::CopyFile {
            from: current_exe.to_path_buf(),
            to: target_home.join(&config.resume.binary_name),
            mode: Some(0o755),
        },
    )
    .write_file(
        "Save configuration",
        target_home.join(user_config_relative_path()),
        config.to_toml()?,
        None,
    )
    .push(
        "Register resume in login profile",
        Action::AppendOnce {
            path: target_home.join(&config.resume.profile),
            contents: resume_snippet(config),
            marker: PROFILE_MARKER.to_string(),
        },
    )
    .push(
        "Create sentinel",
        Action::MarkComplete {
            sentinel: target_home.join(&config.resume.sentinel),
        },
    )
    .command(
        "Fix home ownership",
        CHROOT,
        &[root.as_str(), "chown", "-R", owner.as_str(), home_str.as_str()],
    );
    Ok(book)
}
