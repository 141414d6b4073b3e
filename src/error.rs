use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("Hook '{anchor}' not found in HOOKS, cannot insert after it")]
    MissingAnchor { anchor: String },

    #[error("No HOOKS line found in {}, did you point at the right file?", .path.display())]
    MissingHooksLine { path: PathBuf },

    #[error("Locale '{locale}' is not listed in the available locales")]
    InvalidLocale { locale: String },

    #[error("Sudoers fragment {} failed validation", .path.display())]
    SudoersValidation { path: PathBuf },

    #[error("Step '{step}' failed: {command} ({})", describe_code(.code))]
    CommandFailed {
        step: String,
        command: String,
        code: Option<i32>,
    },

    #[error("{} contains non-ASCII text", .path.display())]
    NonAscii { path: PathBuf },
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}

impl InstallError {
    /// Process exit status to use when this error aborts the installer.
    pub fn exit_code(&self) -> i32 {
        match self {
            InstallError::CommandFailed {
                code: Some(code), ..
            } if *code != 0 => *code,
            _ => 1,
        }
    }
}

/// Exit status for an error that reached `main`.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<InstallError>())
        .map(InstallError::exit_code)
        .unwrap_or(1)
}
