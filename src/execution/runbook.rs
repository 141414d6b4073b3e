//! Ordered, named actions for one stage of the install.
//!
//! Builders only describe work; [`super::CommandExecutor`] performs it. This keeps
//! every stage printable (`archlvm plan`) and dry-runnable.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use super::step::Stage;
use crate::common::shell::{command_line, shell_quote};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Fed to stdin; stdout is discarded when set
    pub input: Option<String>,
    /// Append stdout to this file instead of the terminal
    pub append_stdout_to: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new<S: AsRef<str>>(program: &str, args: &[S]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.as_ref().to_string()).collect(),
            input: None,
            append_stdout_to: None,
        }
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    pub fn append_stdout_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.append_stdout_to = Some(path.into());
        self
    }

    pub fn command_line(&self) -> String {
        command_line(&self.program, &self.args)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    Command(CommandSpec),
    WriteFile {
        path: PathBuf,
        contents: String,
        mode: Option<u32>,
    },
    /// Append `contents` unless the file already contains `marker`
    AppendOnce {
        path: PathBuf,
        contents: String,
        marker: String,
    },
    CopyFile {
        from: PathBuf,
        to: PathBuf,
        mode: Option<u32>,
    },
    /// Insert `hook` after the last `anchor` in a mkinitcpio HOOKS line
    SpliceHook {
        path: PathBuf,
        anchor: String,
        hook: String,
    },
    MarkComplete {
        sentinel: PathBuf,
    },
    MarkReset {
        sentinel: PathBuf,
    },
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Command(spec) => {
                if let Some(input) = &spec.input {
                    if input.contains('\n') {
                        write!(f, "{} <<EOF\n{}\nEOF", spec.command_line(), input.trim_end())?;
                    } else {
                        write!(f, "echo {} | {}", shell_quote(input), spec.command_line())?;
                    }
                } else {
                    write!(f, "{}", spec.command_line())?;
                }
                if let Some(path) = &spec.append_stdout_to {
                    write!(f, " >> {}", shell_quote(&path.to_string_lossy()))?;
                }
                Ok(())
            }
            Action::WriteFile { path, mode, .. } => {
                write!(f, "write {}", path.display())?;
                if let Some(mode) = mode {
                    write!(f, " (mode {:o})", mode)?;
                }
                Ok(())
            }
            Action::AppendOnce { path, marker, .. } => {
                write!(f, "append to {} unless it contains '{}'", path.display(), marker)
            }
            Action::CopyFile { from, to, .. } => {
                write!(f, "cp {} {}", from.display(), to.display())
            }
            Action::SpliceHook { path, anchor, hook } => {
                write!(f, "insert '{}' after '{}' in HOOKS of {}", hook, anchor, path.display())
            }
            Action::MarkComplete { sentinel } => write!(f, "touch {}", sentinel.display()),
            Action::MarkReset { sentinel } => write!(f, "rm -f {}", sentinel.display()),
        }
    }
}

/// What the executor does when a step fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum OnFailure {
    Abort,
    /// Delete `remove`, warn with `reason` and carry on with the next step
    Recover { remove: PathBuf, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Step {
    pub name: String,
    pub action: Action,
    pub on_failure: OnFailure,
}

#[derive(Debug, Clone, Serialize)]
pub struct Runbook {
    pub stage: Stage,
    pub steps: Vec<Step>,
}

impl Runbook {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            steps: Vec::new(),
        }
    }

    pub fn push(&mut self, name: impl Into<String>, action: Action) -> &mut Self {
        self.steps.push(Step {
            name: name.into(),
            action,
            on_failure: OnFailure::Abort,
        });
        self
    }

    pub fn command<S: AsRef<str>>(&mut self, name: &str, program: &str, args: &[S]) -> &mut Self {
        self.push(name, Action::Command(CommandSpec::new(program, args)))
    }

    pub fn spec(&mut self, name: &str, spec: CommandSpec) -> &mut Self {
        self.push(name, Action::Command(spec))
    }

    pub fn write_file(
        &mut self,
        name: &str,
        path: impl Into<PathBuf>,
        contents: impl Into<String>,
        mode: Option<u32>,
    ) -> &mut Self {
        self.push(
            name,
            Action::WriteFile {
                path: path.into(),
                contents: contents.into(),
                mode,
            },
        )
    }

    /// Attach a recovery policy to the most recently added step.
    pub fn recover_by_removing(&mut self, remove: &Path, reason: impl Into<String>) -> &mut Self {
        if let Some(step) = self.steps.last_mut() {
            step.on_failure = OnFailure::Recover {
                remove: remove.to_path_buf(),
                reason: reason.into(),
            };
        }
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Host programs this runbook needs on `PATH`, in first-use order.
    pub fn programs(&self) -> Vec<&str> {
        let mut programs: Vec<&str> = Vec::new();
        for step in &self.steps {
            if let Action::Command(spec) = &step.action
                && !programs.contains(&spec.program.as_str())
            {
                programs.push(&spec.program);
            }
        }
        programs
    }
}

#[cfg(test)]
impl Runbook {
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn find(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name == name)
    }
}
