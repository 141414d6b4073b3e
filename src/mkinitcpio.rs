//! Editing of the `HOOKS=(...)` array in mkinitcpio.conf.
//!
//! The file is never sourced. The first uncommented line of the form
//! `HOOKS=(tok1 tok2 ...)` is located, its tokens are split on whitespace and the
//! line is written back in the same syntax. Every other byte of the file is kept.

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::InstallError;
use crate::ui::prelude::*;

pub const DEFAULT_FILE: &str = "/etc/mkinitcpio.conf";
pub const BLOCK_HOOK: &str = "block";
pub const LVM_BOOT_HOOK: &str = "lvm2";
pub const ENCRYPT_BOOT_HOOK: &str = "encrypt";

/// Return `hooks` with `new_item` spliced in right after the last `anchor`.
///
/// Repeated calls insert `new_item` again; callers that need idempotence check
/// [`MkinitcpioConfig::contains_hook`] first.
pub fn insert_after(
    hooks: &[String],
    anchor: &str,
    new_item: &str,
) -> Result<Vec<String>, InstallError> {
    let idx = hooks
        .iter()
        .rposition(|h| h == anchor)
        .ok_or_else(|| InstallError::MissingAnchor {
            anchor: anchor.to_string(),
        })?;

    let mut result = Vec::with_capacity(hooks.len() + 1);
    result.extend_from_slice(&hooks[..=idx]);
    result.push(new_item.to_string());
    result.extend_from_slice(&hooks[idx + 1..]);
    Ok(result)
}

#[derive(Debug, Clone)]
pub struct MkinitcpioConfig {
    head: String,
    tail: String,
    hooks: Vec<String>,
}

impl MkinitcpioConfig {
    /// Parse `content`; `source` is only used for error reporting.
    pub fn parse(content: &str, source: &Path) -> Result<Self, InstallError> {
        let caps = HOOKS_LINE
            .captures(content)
            .ok_or_else(|| InstallError::MissingHooksLine {
                path: source.to_path_buf(),
            })?;
        let whole = caps.get(0).expect("group 0 is always present");

        Ok(Self {
            head: content[..whole.start()].to_string(),
            tail: content[whole.end()..].to_string(),
            hooks: caps[1].split_whitespace().map(String::from).collect(),
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(Self::parse(&content, path)?)
    }

    pub fn hooks(&self) -> &[String] {
        &self.hooks
    }

    pub fn contains_hook(&self, hook: &str) -> bool {
        self.hooks.iter().any(|h| h == hook)
    }

    pub fn insert_after(&mut self, anchor: &str, hook: &str) -> Result<(), InstallError> {
        self.hooks = insert_after(&self.hooks, anchor, hook)?;
        Ok(())
    }

    pub fn hooks_line(&self) -> String {
        format!("HOOKS=({})", self.hooks.join(" "))
    }

    pub fn render(&self) -> String {
        format!("{}{}{}", self.head, self.hooks_line(), self.tail)
    }
}

lazy_static! {
    static ref HOOKS_LINE: Regex = Regex::new(r"(?m)^HOOKS=\((.*?)\)$").expect("valid HOOKS regex");
}

/// Insert `hook` after the last `anchor` in the HOOKS line of `path`.
///
/// No duplicate check is made: running this twice on the same file lists the
/// hook twice.
pub fn splice_hook_in_file(path: &Path, anchor: &str, hook: &str) -> Result<Vec<String>> {
    let mut config = MkinitcpioConfig::load(path)?;
    config
        .insert_after(anchor, hook)
        .with_context(|| format!("Failed to edit {}", path.display()))?;
    fs::write(path, config.render())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(config.hooks().to_vec())
}

/// Options of the standalone hook editor.
#[derive(Debug, Clone)]
pub struct BootHookRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub lvm: bool,
    pub encrypt: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootHookOutcome {
    NothingRequested,
    Written { hooks: Vec<String>, backup: Option<PathBuf> },
}

/// Add the requested boot hooks after `block`, skipping hooks that are already
/// listed. An existing output file is copied to `<output>.bak` first.
pub fn add_boot_hooks(request: &BootHookRequest) -> Result<BootHookOutcome> {
    if !request.lvm && !request.encrypt {
        emit(Level::Warn, "hooks.none", "No hooks to add", None);
        return Ok(BootHookOutcome::NothingRequested);
    }

    emit(
        Level::Info,
        "hooks.read",
        &format!("Reading input file: {}", request.input.display()),
        None,
    );
    let content = fs::read_to_string(&request.input)
        .with_context(|| format!("Failed to read {}", request.input.display()))?;
    if !content.is_ascii() {
        return Err(InstallError::NonAscii {
            path: request.input.clone(),
        }
        .into());
    }

    let mut config = MkinitcpioConfig::parse(&content, &request.input)?;
    // Even a request whose hooks are all present needs the anchor.
    if !config.contains_hook(BLOCK_HOOK) {
        return Err(InstallError::MissingAnchor {
            anchor: BLOCK_HOOK.to_string(),
        }
        .into());
    }
    if request.lvm && !config.contains_hook(LVM_BOOT_HOOK) {
        config.insert_after(BLOCK_HOOK, LVM_BOOT_HOOK)?;
    }
    if request.encrypt && !config.contains_hook(ENCRYPT_BOOT_HOOK) {
        config.insert_after(BLOCK_HOOK, ENCRYPT_BOOT_HOOK)?;
    }

    let backup = if request.output.is_file() {
        let backup = backup_path(&request.output);
        emit(
            Level::Info,
            "hooks.backup",
            &format!("Backing up: {}", request.output.display()),
            None,
        );
        fs::copy(&request.output, &backup)
            .with_context(|| format!("Failed to back up {}", request.output.display()))?;
        Some(backup)
    } else {
        None
    };

    emit(
        Level::Info,
        "hooks.write",
        &format!("Writing output file: {}", request.output.display()),
        None,
    );
    fs::write(&request.output, config.render())
        .with_context(|| format!("Failed to write {}", request.output.display()))?;

    Ok(BootHookOutcome::Written {
        hooks: config.hooks().to_vec(),
        backup,
    })
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"# vim:set ft=sh
MODULES=()
BINARIES=()
FILES=()
#HOOKS=(base udev autodetect modconf block filesystems fsck)
HOOKS=(base udev autodetect modconf kms keyboard keymap consolefont block filesystems fsck)
COMPRESSION="zstd"
"#;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn test_insert_after_single_anchor() {
        let hooks = strings(&["base", "udev", "block", "filesystems"]);
        let result = insert_after(&hooks, "block", "lvm2").unwrap();
        assert_eq!(result, strings(&["base", "udev", "block", "lvm2", "filesystems"]));
        assert_eq!(result.len(), hooks.len() + 1);
    }

    #[test]
    fn test_insert_after_last_anchor_wins() {
        let hooks = strings(&["base", "block", "keyboard", "block"]);
        let result = insert_after(&hooks, "block", "lvm2").unwrap();
        assert_eq!(result, strings(&["base", "block", "keyboard", "block", "lvm2"]));
    }

    #[test]
    fn test_insert_after_missing_anchor() {
        let hooks = strings(&["base", "udev", "filesystems"]);
        let err = insert_after(&hooks, "block", "lvm2").unwrap_err();
        assert!(matches!(err, InstallError::MissingAnchor { ref anchor } if anchor == "block"));
        assert_eq!(hooks, strings(&["base", "udev", "filesystems"]));
    }

    #[test]
    fn test_insert_after_is_not_idempotent() {
        let hooks = strings(&["base", "block", "fsck"]);
        let once = insert_after(&hooks, "block", "lvm2").unwrap();
        let twice = insert_after(&once, "block", "lvm2").unwrap();
        assert_eq!(twice, strings(&["base", "block", "lvm2", "lvm2", "fsck"]));
    }

    #[test]
    fn test_parse_skips_commented_line() {
        let config = MkinitcpioConfig::parse(SAMPLE, Path::new("mkinitcpio.conf")).unwrap();
        assert_eq!(config.hooks().len(), 11);
        assert_eq!(config.hooks()[0], "base");
        assert!(config.contains_hook("consolefont"));
    }

    #[test]
    fn test_render_preserves_rest_of_file() {
        let mut config = MkinitcpioConfig::parse(SAMPLE, Path::new("mkinitcpio.conf")).unwrap();
        config.insert_after(BLOCK_HOOK, LVM_BOOT_HOOK).unwrap();
        let rendered = config.render();

        let expected = SAMPLE.replace(
            "consolefont block filesystems fsck)\n",
            "consolefont block lvm2 filesystems fsck)\n",
        );
        assert_eq!(rendered, expected);
        assert!(rendered.contains("#HOOKS=(base udev autodetect modconf block filesystems fsck)"));
        assert!(rendered.ends_with("COMPRESSION=\"zstd\"\n"));
    }

    #[test]
    fn test_parse_without_hooks_line() {
        let err = MkinitcpioConfig::parse("MODULES=()\n", Path::new("/tmp/x.conf")).unwrap_err();
        assert!(matches!(err, InstallError::MissingHooksLine { .. }));
    }

    #[test]
    fn test_empty_hooks_has_no_anchor() {
        let mut config = MkinitcpioConfig::parse("HOOKS=()", Path::new("x")).unwrap();
        assert!(config.hooks().is_empty());
        assert!(config.insert_after(BLOCK_HOOK, LVM_BOOT_HOOK).is_err());
        assert_eq!(config.render(), "HOOKS=()");
    }

    #[test]
    fn test_splice_hook_in_file_missing_anchor_leaves_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mkinitcpio.conf");
        let content = "HOOKS=(base udev filesystems)\n";
        fs::write(&path, content).unwrap();

        let err = splice_hook_in_file(&path, BLOCK_HOOK, LVM_BOOT_HOOK).unwrap_err();
        assert!(
            err.chain()
                .any(|c| matches!(c.downcast_ref::<InstallError>(), Some(InstallError::MissingAnchor { .. })))
        );
        assert_eq!(fs::read_to_string(&path).unwrap(), content);
    }

    #[test]
    fn test_add_boot_hooks_both_and_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mkinitcpio.conf");
        fs::write(&path, "HOOKS=(base udev block filesystems)\n").unwrap();

        let request = BootHookRequest {
            input: path.clone(),
            output: path.clone(),
            lvm: true,
            encrypt: true,
        };
        let outcome = add_boot_hooks(&request).unwrap();

        let backup = dir.path().join("mkinitcpio.conf.bak");
        assert_eq!(
            outcome,
            BootHookOutcome::Written {
                hooks: strings(&["base", "udev", "block", "encrypt", "lvm2", "filesystems"]),
                backup: Some(backup.clone()),
            }
        );
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "HOOKS=(base udev block encrypt lvm2 filesystems)\n"
        );
        assert_eq!(
            fs::read_to_string(&backup).unwrap(),
            "HOOKS=(base udev block filesystems)\n"
        );
    }

    #[test]
    fn test_add_boot_hooks_skips_present_hooks() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.conf");
        let output = dir.path().join("out.conf");
        fs::write(&input, "HOOKS=(base block lvm2 filesystems)\n").unwrap();

        let request = BootHookRequest {
            input,
            output: output.clone(),
            lvm: true,
            encrypt: false,
        };
        let outcome = add_boot_hooks(&request).unwrap();

        assert!(matches!(outcome, BootHookOutcome::Written { backup: None, .. }));
        assert_eq!(
            fs::read_to_string(&output).unwrap(),
            "HOOKS=(base block lvm2 filesystems)\n"
        );
    }

    #[test]
    fn test_add_boot_hooks_requires_block_when_hooks_present() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mkinitcpio.conf");
        let content = "HOOKS=(base udev lvm2 filesystems)\n";
        fs::write(&path, content).unwrap();

        let request = BootHookRequest {
            input: path.clone(),
            output: path.clone(),
            lvm: true,
            encrypt: false,
        };
        let err = add_boot_hooks(&request).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<InstallError>(),
            Some(InstallError::MissingAnchor { .. })
        ));
        assert_eq!(fs::read_to_string(&path).unwrap(), content);
        assert!(!dir.path().join("mkinitcpio.conf.bak").exists());
    }

    #[test]
    fn test_add_boot_hooks_nothing_requested() {
        let request = BootHookRequest {
            input: PathBuf::from("/nonexistent/mkinitcpio.conf"),
            output: PathBuf::from("/nonexistent/mkinitcpio.conf"),
            lvm: false,
            encrypt: false,
        };
        assert_eq!(add_boot_hooks(&request).unwrap(), BootHookOutcome::NothingRequested);
    }

    #[test]
    fn test_add_boot_hooks_rejects_non_ascii() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mkinitcpio.conf");
        let content = "# café\nHOOKS=(base block)\n";
        fs::write(&path, content).unwrap();

        let request = BootHookRequest {
            input: path.clone(),
            output: path.clone(),
            lvm: true,
            encrypt: false,
        };
        assert!(add_boot_hooks(&request).is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), content);
    }
}
