use super::runbook::{CommandSpec, Runbook};
use super::step::Stage;
use crate::config::InstallConfig;

pub fn runbook(config: &InstallConfig) -> Runbook {
    let mount_point = config.disk.mount_point.to_string_lossy().to_string();

    let mut pacstrap_args = vec!["-K".to_string(), mount_point.clone()];
    pacstrap_args.extend(config.packages.base.iter().cloned());

    let mut book = Runbook::new(Stage::Bootstrap);
    book.command("Sync clock", "timedatectl", &["set-ntp", "true"])
        .command("Install base system", "pacstrap", &pacstrap_args)
        .spec(
            "Generate fstab",
            CommandSpec::new("genfstab", &["-U", mount_point.as_str()])
                .append_stdout_to(config.target_path("/etc/fstab")),
        )
        .write_file(
            "Set console keymap",
            config.target_path("/etc/vconsole.conf"),
            format!("KEYMAP={}\n", config.system.keymap),
            None,
        );
    book
}
