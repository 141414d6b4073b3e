use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

pub mod base;
pub mod boot;
pub mod disk;
pub mod finalize;
pub mod handoff;
pub mod locale;
pub mod paths;
pub mod preflight;
pub mod runbook;
pub mod step;
pub mod user;

use self::runbook::{Action, CommandSpec, OnFailure, Runbook, Step};
use self::step::Stage;
use crate::config::InstallConfig;
use crate::error::InstallError;
use crate::phase::{Phase, PhaseMarker};
use crate::ui::prelude::*;

/// Everything a stage builder may look at besides the configuration.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub config: InstallConfig,
    /// Prefix privileged post-boot commands with sudo
    pub use_sudo: bool,
    /// Binary relocated into the new user's home
    pub current_exe: PathBuf,
    /// Available locales, read before anything is changed
    pub locale_gen: PathBuf,
    /// Home of the invoking user, where the sentinel lives after reboot
    pub home_dir: PathBuf,
}

impl StageContext {
    pub fn new(config: InstallConfig) -> Result<Self> {
        let current_exe = std::env::current_exe().context("Cannot determine installer binary")?;
        let home_dir = dirs::home_dir().context("Unable to determine home directory")?;
        Ok(Self {
            config,
            use_sudo: matches!(sudo::check(), sudo::RunningAs::User),
            current_exe,
            locale_gen: PathBuf::from(paths::LOCALE_GEN),
            home_dir,
        })
    }

    pub fn marker(&self) -> PhaseMarker {
        PhaseMarker::new(&self.home_dir, &self.config.resume.sentinel)
    }
}

pub fn build_runbook(stage: Stage, ctx: &StageContext) -> Result<Runbook> {
    match stage {
        Stage::Disk => Ok(disk::runbook(&ctx.config)),
        Stage::Bootstrap => Ok(base::runbook(&ctx.config)),
        Stage::Boot => Ok(boot::runbook(&ctx.config)),
        Stage::User => Ok(user::runbook(&ctx.config)),
        Stage::Handoff => handoff::runbook(&ctx.config, &ctx.current_exe),
        Stage::Finalize => finalize::runbook(ctx),
    }
}

pub struct CommandExecutor {
    pub dry_run: bool,
}

impl CommandExecutor {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    /// Run every step in order, stopping at the first failure that has no
    /// recovery policy.
    pub fn run_runbook(&self, runbook: &Runbook) -> Result<()> {
        emit(
            Level::Info,
            "stage.start",
            &format!("==> {} ({} steps)", runbook.stage.title(), runbook.len()),
            Some(serde_json::json!({ "stage": runbook.stage, "steps": runbook.len() })),
        );

        for (idx, step) in runbook.steps.iter().enumerate() {
            emit(
                Level::Info,
                "step.start",
                &format!("  [{}/{}] {}", idx + 1, runbook.len(), step.name),
                Some(serde_json::json!({ "stage": runbook.stage, "step": step.name })),
            );
            emit(Level::Debug, "step.action", &format!("      {}", step.action), None);

            if let Err(err) = self.run_step(step) {
                match &step.on_failure {
                    OnFailure::Abort => {
                        return Err(err).with_context(|| {
                            format!("{} aborted at step '{}'", runbook.stage.title(), step.name)
                        });
                    }
                    OnFailure::Recover { remove, reason } => {
                        self.recover(remove, reason, &err)?;
                    }
                }
            }
        }

        emit(
            Level::Success,
            "stage.done",
            &format!("{} complete", runbook.stage.title()),
            Some(serde_json::json!({ "stage": runbook.stage })),
        );
        Ok(())
    }

    fn recover(&self, remove: &Path, reason: &str, err: &anyhow::Error) -> Result<()> {
        emit(
            Level::Warn,
            "step.recovered",
            &format!("Warning: {} ({:#}); removing {}", reason, err, remove.display()),
            None,
        );
        if self.dry_run {
            return Ok(());
        }
        match fs::remove_file(remove) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", remove.display())),
        }
    }

    fn run_step(&self, step: &Step) -> Result<()> {
        if self.dry_run {
            emit(
                Level::Info,
                "step.dry_run",
                &format!("      [DRY RUN] {}", step.action),
                None,
            );
            return Ok(());
        }

        match &step.action {
            Action::Command(spec) => self.run_command(&step.name, spec),
            Action::WriteFile {
                path,
                contents,
                mode,
            } => write_file(path, contents, *mode),
            Action::AppendOnce {
                path,
                contents,
                marker,
            } => append_once(path, contents, marker).map(|_| ()),
            Action::CopyFile { from, to, mode } => {
                ensure_parent(to)?;
                fs::copy(from, to).with_context(|| {
                    format!("Failed to copy {} to {}", from.display(), to.display())
                })?;
                if let Some(mode) = mode {
                    set_mode(to, *mode)?;
                }
                Ok(())
            }
            Action::SpliceHook { path, anchor, hook } => {
                let hooks = crate::mkinitcpio::splice_hook_in_file(path, anchor, hook)?;
                emit(
                    Level::Debug,
                    "hooks.updated",
                    &format!("      HOOKS=({})", hooks.join(" ")),
                    None,
                );
                Ok(())
            }
            Action::MarkComplete { sentinel } => marker_for(sentinel)?.mark_complete(),
            Action::MarkReset { sentinel } => marker_for(sentinel)?.mark_reset(),
        }
    }

    fn run_command(&self, step_name: &str, spec: &CommandSpec) -> Result<()> {
        let mut command = Command::new(&spec.program);
        command.args(&spec.args);

        if let Some(path) = &spec.append_stdout_to {
            ensure_parent(path)?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            command.stdout(Stdio::from(file));
        } else if spec.input.is_some() {
            command.stdout(Stdio::null());
        }
        if spec.input.is_some() {
            command.stdin(Stdio::piped());
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(InstallError::CommandFailed {
                    step: step_name.to_string(),
                    command: spec.command_line(),
                    code: Some(127),
                }
                .into());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to start {}", spec.program));
            }
        };

        // A child that exits early closes the pipe; its status still decides.
        let mut write_result = Ok(());
        if let Some(input) = &spec.input
            && let Some(mut stdin) = child.stdin.take()
        {
            write_result = stdin.write_all(input.as_bytes());
        }

        let status = child
            .wait()
            .with_context(|| format!("Failed to wait for {}", spec.program))?;
        if !status.success() {
            return Err(InstallError::CommandFailed {
                step: step_name.to_string(),
                command: spec.command_line(),
                code: status.code(),
            }
            .into());
        }
        write_result.with_context(|| format!("Failed to write to {}", spec.program))
    }
}

fn marker_for(sentinel: &Path) -> Result<PhaseMarker> {
    let home = sentinel
        .parent()
        .with_context(|| format!("Invalid sentinel path {}", sentinel.display()))?;
    let name = sentinel
        .file_name()
        .with_context(|| format!("Invalid sentinel path {}", sentinel.display()))?;
    Ok(PhaseMarker::new(home, &name.to_string_lossy()))
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    Ok(())
}

fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .with_context(|| format!("Failed to set mode of {}", path.display()))
}

fn write_file(path: &Path, contents: &str, mode: Option<u32>) -> Result<()> {
    ensure_parent(path)?;
    fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
    if let Some(mode) = mode {
        set_mode(path, mode)?;
    }
    Ok(())
}

/// Returns whether anything was appended.
fn append_once(path: &Path, contents: &str, marker: &str) -> Result<bool> {
    let existing = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    };
    if existing.contains(marker) {
        emit(
            Level::Info,
            "file.append.skip",
            &format!("      {} already set up, skipping", path.display()),
            None,
        );
        return Ok(false);
    }

    ensure_parent(path)?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    if !existing.is_empty() && !existing.ends_with('\n') {
        file.write_all(b"\n")?;
    }
    file.write_all(contents.as_bytes())
        .with_context(|| format!("Failed to append to {}", path.display()))?;
    Ok(true)
}

/// Run the given stages in order; the first failing stage aborts the rest.
pub fn execute_stages(stages: &[Stage], ctx: &StageContext, executor: &CommandExecutor) -> Result<()> {
    let runbooks = stages
        .iter()
        .map(|stage| build_runbook(*stage, ctx))
        .collect::<Result<Vec<_>>>()?;

    if executor.dry_run {
        emit(
            Level::Warn,
            "preflight.skipped",
            "Dry run: not checking for required tools",
            None,
        );
    } else {
        preflight::check_tools(&runbooks)?;
    }

    for runbook in &runbooks {
        executor.run_runbook(runbook)?;
    }
    Ok(())
}

pub fn execute_phase(phase: Phase, ctx: &StageContext, executor: &CommandExecutor) -> Result<()> {
    if executor.dry_run {
        emit(
            Level::Warn,
            "dry_run.enabled",
            "*** DRY RUN MODE ENABLED - No changes will be made ***",
            None,
        );
    }
    emit(
        Level::Info,
        "phase.start",
        &format!("Running {} phase", phase),
        Some(serde_json::json!({ "phase": phase })),
    );
    separator(false);

    execute_stages(Stage::for_phase(phase), ctx, executor)?;

    separator(false);
    match phase {
        Phase::PreBoot => emit(
            Level::Success,
            "phase.pre_boot.done",
            &format!(
                "Pre-boot installation finished. Reboot and log in as '{}' to finish the setup.",
                ctx.config.user.name
            ),
            None,
        ),
        Phase::PostBoot => emit(
            Level::Success,
            "phase.post_boot.done",
            "Installation finished.",
            None,
        ),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell(script: &str) -> CommandSpec {
        CommandSpec::new("sh", &["-c", script])
    }

    #[test]
    fn test_runbook_stops_at_first_failure() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first");
        let third = dir.path().join("third");

        let mut book = Runbook::new(Stage::Disk);
        book.write_file("first", &first, "1", None)
            .spec("fail", shell("exit 3"))
            .write_file("third", &third, "3", None);

        let err = CommandExecutor::new(false).run_runbook(&book).unwrap_err();
        let install_err = err
            .chain()
            .find_map(|c| c.downcast_ref::<InstallError>())
            .unwrap();
        assert!(matches!(
            install_err,
            InstallError::CommandFailed { step, code: Some(3), .. } if step == "fail"
        ));
        assert!(first.exists());
        assert!(!third.exists());
    }

    #[test]
    fn test_missing_program_reports_127() {
        let mut book = Runbook::new(Stage::Bootstrap);
        book.command("nope", "archlvm-definitely-missing-tool", &["--help"]);
        let err = CommandExecutor::new(false).run_runbook(&book).unwrap_err();
        assert_eq!(crate::error::exit_code_for(&err), 127);
    }

    #[test]
    fn test_early_exit_keeps_command_status() {
        let mut book = Runbook::new(Stage::Disk);
        book.spec(
            "early exit",
            shell("exit 7").with_input("x".repeat(1 << 20)),
        );
        let err = CommandExecutor::new(false).run_runbook(&book).unwrap_err();
        assert_eq!(crate::error::exit_code_for(&err), 7);
    }

    #[test]
    fn test_recover_policy_removes_file_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let fragment = dir.path().join("10-wheel");
        let after = dir.path().join("after");

        let mut book = Runbook::new(Stage::User);
        book.write_file("fragment", &fragment, "broken rule\n", Some(0o440))
            .spec("validate", shell("exit 1"))
            .recover_by_removing(&fragment, "sudoers fragment failed validation")
            .write_file("after", &after, "ok", None);

        CommandExecutor::new(false).run_runbook(&book).unwrap();
        assert!(!fragment.exists());
        assert!(after.exists());
    }

    #[test]
    fn test_dry_run_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("file");
        let sentinel = dir.path().join(".run_postinstall");

        let mut book = Runbook::new(Stage::Handoff);
        book.write_file("write", &target, "data", None)
            .spec("fail", shell("exit 1"))
            .push(
                "mark",
                Action::MarkComplete {
                    sentinel: sentinel.clone(),
                },
            );

        CommandExecutor::new(true).run_runbook(&book).unwrap();
        assert!(!target.exists());
        assert!(!sentinel.exists());
    }

    #[test]
    fn test_command_input_and_stdout_append() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("etc/fstab");
        fs::create_dir_all(out.parent().unwrap()).unwrap();
        fs::write(&out, "# existing\n").unwrap();

        let mut book = Runbook::new(Stage::Bootstrap);
        book.spec(
            "cat",
            CommandSpec::new("cat", &[] as &[&str])
                .with_input("UUID=1234 / ext4 rw 0 1\n")
                .append_stdout_to(&out),
        );
        CommandExecutor::new(false).run_runbook(&book).unwrap();

        assert_eq!(
            fs::read_to_string(&out).unwrap(),
            "# existing\nUUID=1234 / ext4 rw 0 1\n"
        );
    }

    #[test]
    fn test_append_once_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let profile = dir.path().join(".bash_profile");
        fs::write(&profile, "[[ -f ~/.bashrc ]] && . ~/.bashrc").unwrap();

        let snippet = "# marker\nrun\n";
        assert!(append_once(&profile, snippet, "# marker").unwrap());
        assert!(!append_once(&profile, snippet, "# marker").unwrap());

        assert_eq!(
            fs::read_to_string(&profile).unwrap(),
            "[[ -f ~/.bashrc ]] && . ~/.bashrc\n# marker\nrun\n"
        );
    }

    #[test]
    fn test_splice_hook_and_markers() {
        let dir = tempfile::tempdir().unwrap();
        let conf = dir.path().join("mkinitcpio.conf");
        fs::write(&conf, "MODULES=()\nHOOKS=(base udev block filesystems)\n").unwrap();
        let sentinel = dir.path().join(".run_postinstall");

        let mut book = Runbook::new(Stage::Boot);
        book.push(
            "hooks",
            Action::SpliceHook {
                path: conf.clone(),
                anchor: "block".into(),
                hook: "lvm2".into(),
            },
        )
        .push(
            "mark",
            Action::MarkComplete {
                sentinel: sentinel.clone(),
            },
        );
        CommandExecutor::new(false).run_runbook(&book).unwrap();

        assert_eq!(
            fs::read_to_string(&conf).unwrap(),
            "MODULES=()\nHOOKS=(base udev block lvm2 filesystems)\n"
        );
        assert!(sentinel.is_file());

        let mut reset = Runbook::new(Stage::Finalize);
        reset.push("reset", Action::MarkReset { sentinel: sentinel.clone() });
        CommandExecutor::new(false).run_runbook(&reset).unwrap();
        assert!(!sentinel.exists());
    }
}
