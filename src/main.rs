mod cli;
mod commands;
mod common;
mod config;
mod error;
mod execution;
mod mkinitcpio;
mod phase;
mod ui;

use clap::Parser;

use crate::cli::Cli;
use crate::ui::prelude::*;

fn main() {
    let cli = Cli::parse();

    ui::init(cli.output, !cli.no_color);
    ui::set_debug_mode(cli.debug);

    if let Err(e) = commands::dispatch(cli) {
        emit(
            Level::Error,
            "archlvm.error",
            &format!("Error: {:#}", e),
            None,
        );
        std::process::exit(error::exit_code_for(&e));
    }
}
