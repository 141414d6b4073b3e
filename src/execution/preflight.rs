use anyhow::Result;

use super::runbook::Runbook;
use crate::ui::prelude::*;

/// Host programs the runbooks call that are not on `PATH`.
pub fn missing_tools(runbooks: &[Runbook]) -> Vec<String> {
    let mut missing: Vec<String> = Vec::new();
    for program in runbooks.iter().flat_map(|book| book.programs()) {
        if which::which(program).is_err() && !missing.iter().any(|m| m == program) {
            missing.push(program.to_string());
        }
    }
    missing
}

/// Refuse to start when a required tool is missing, so the install does not
/// stop halfway through.
pub fn check_tools(runbooks: &[Runbook]) -> Result<()> {
    let missing = missing_tools(runbooks);
    if missing.is_empty() {
        emit(
            Level::Debug,
            "preflight.ok",
            "All required tools are available",
            None,
        );
        return Ok(());
    }

    emit(
        Level::Error,
        "preflight.missing",
        &format!("Missing required tools: {}", missing.join(", ")),
        Some(serde_json::json!({ "missing": missing })),
    );
    anyhow::bail!(
        "Required tools not found in PATH: {}. Run the installer from the Arch Linux live medium.",
        missing.join(", ")
    )
}
