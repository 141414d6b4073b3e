mod utils;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::cli::{Cli, Commands};
use crate::config::InstallConfig;
use crate::execution::step::Stage;
use crate::execution::{
    CommandExecutor, StageContext, build_runbook, execute_phase, execute_stages,
};
use crate::mkinitcpio::{BootHookOutcome, BootHookRequest, add_boot_hooks};
use crate::phase::Phase;
use crate::ui::{self, prelude::*};

use self::utils::{ensure_root, log_file_for, running_as_root};

/// Flags shared by every command that changes the system.
struct RunOptions {
    config: Option<PathBuf>,
    dry_run: bool,
    log_file: Option<PathBuf>,
}

pub fn dispatch(cli: Cli) -> Result<()> {
    let options = RunOptions {
        config: cli.config,
        dry_run: cli.dry_run,
        log_file: cli.log_file,
    };

    match cli.command {
        None => handle_resume(&options),
        Some(Commands::Install { stage }) => match stage {
            Some(stage) => handle_stage(&options, stage),
            None => handle_phase_run(&options, Phase::PreBoot),
        },
        Some(Commands::Finish) => handle_phase_run(&options, Phase::PostBoot),
        Some(Commands::Phase) => handle_phase_query(options.config.as_deref()),
        Some(Commands::Plan { phase }) => handle_plan(options.config.as_deref(), phase),
        Some(Commands::Hooks {
            lvm2,
            encrypt,
            input,
            output,
        }) => handle_hooks(input, output, lvm2, encrypt),
        Some(Commands::Config) => handle_config(options.config.as_deref()),
    }
}

fn load_context(config_path: Option<&Path>) -> Result<StageContext> {
    let (config, source) = InstallConfig::resolve(config_path)?;
    match &source {
        Some(path) => emit(
            Level::Debug,
            "config.source",
            &format!("Configuration: {}", path.display()),
            None,
        ),
        None => emit(
            Level::Debug,
            "config.source",
            "Configuration: built-in defaults",
            None,
        ),
    }
    StageContext::new(config)
}

/// Escalate when pre-boot work is about to run, then attach the install log.
fn prepare_run(options: &RunOptions, phase: Phase) -> Result<()> {
    if phase == Phase::PreBoot && !options.dry_run {
        ensure_root()?;
    }
    let log_file = log_file_for(options.log_file.clone(), options.dry_run, running_as_root());
    if let Some(path) = &log_file {
        emit(
            Level::Debug,
            "log.file",
            &format!("Logging to {}", path.display()),
            None,
        );
    }
    ui::set_log_file(log_file);
    Ok(())
}

fn handle_resume(options: &RunOptions) -> Result<()> {
    let ctx = load_context(options.config.as_deref())?;
    let phase = ctx.marker().phase();
    emit(
        Level::Debug,
        "phase.detected",
        &format!("Sentinel {} selects {}", ctx.marker().path().display(), phase),
        None,
    );
    prepare_run(options, phase)?;
    execute_phase(phase, &ctx, &CommandExecutor::new(options.dry_run))
}

fn handle_phase_run(options: &RunOptions, phase: Phase) -> Result<()> {
    let ctx = load_context(options.config.as_deref())?;
    prepare_run(options, phase)?;
    execute_phase(phase, &ctx, &CommandExecutor::new(options.dry_run))
}

fn handle_stage(options: &RunOptions, stage: Stage) -> Result<()> {
    let ctx = load_context(options.config.as_deref())?;
    prepare_run(options, stage.phase())?;
    execute_stages(&[stage], &ctx, &CommandExecutor::new(options.dry_run))
}

fn handle_phase_query(config_path: Option<&Path>) -> Result<()> {
    let ctx = load_context(config_path)?;
    let marker = ctx.marker();
    let phase = marker.phase();
    emit(
        Level::Info,
        "phase.detected",
        &phase.to_string(),
        Some(serde_json::json!({
            "phase": phase,
            "sentinel": marker.path(),
        })),
    );
    Ok(())
}

fn handle_plan(config_path: Option<&Path>, phase: Option<Phase>) -> Result<()> {
    let ctx = load_context(config_path)?;
    let phase = phase.unwrap_or_else(|| ctx.marker().phase());

    for stage in Stage::for_phase(phase) {
        let runbook = build_runbook(*stage, &ctx)?;
        if matches!(get_output_format(), OutputFormat::Json) {
            let data = serde_json::to_value(&runbook).context("Failed to serialize runbook")?;
            emit(Level::Info, "plan.stage", stage.title(), Some(data));
            continue;
        }

        emit(
            Level::Success,
            "plan.stage",
            &format!("==> {} [{}]", stage.title(), stage),
            None,
        );
        for (idx, step) in runbook.steps.iter().enumerate() {
            emit(
                Level::Info,
                "plan.step",
                &format!("  {:>2}. {}", idx + 1, step.name),
                None,
            );
            for line in step.action.to_string().lines() {
                emit(Level::Info, "plan.action", &format!("      {}", line), None);
            }
        }
    }
    Ok(())
}

fn handle_hooks(input: PathBuf, output: Option<PathBuf>, lvm2: bool, encrypt: bool) -> Result<()> {
    let request = BootHookRequest {
        output: output.unwrap_or_else(|| input.clone()),
        input,
        lvm: lvm2,
        encrypt,
    };

    if let BootHookOutcome::Written { hooks, backup } = add_boot_hooks(&request)? {
        emit(
            Level::Success,
            "hooks.done",
            &format!("HOOKS=({})", hooks.join(" ")),
            Some(serde_json::json!({
                "hooks": hooks,
                "output": request.output,
                "backup": backup,
            })),
        );
    }
    Ok(())
}

fn handle_config(config_path: Option<&Path>) -> Result<()> {
    let (config, source) = InstallConfig::resolve(config_path)?;
    match get_output_format() {
        OutputFormat::Json => {
            let data = serde_json::to_value(&config).context("Failed to serialize configuration")?;
            emit(
                Level::Info,
                "config.effective",
                "Effective configuration",
                Some(serde_json::json!({ "source": source, "config": data })),
            );
        }
        OutputFormat::Text => {
            if let Some(path) = source {
                println!("# Loaded from {}", path.display());
            }
            print!("{}", config.to_toml()?);
        }
    }
    Ok(())
}
