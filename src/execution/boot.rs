use super::paths::CHROOT;
use super::runbook::{Action, Runbook};
use super::step::Stage;
use crate::config::InstallConfig;
use crate::mkinitcpio::{BLOCK_HOOK, LVM_BOOT_HOOK};

pub fn runbook(config: &InstallConfig) -> Runbook {
    let root = config.disk.mount_point.to_string_lossy().to_string();
    let efi_directory = format!("--efi-directory={}", config.disk.efi_directory);
    let bootloader_id = format!("--bootloader-id={}", config.system.bootloader_id);
    let grub_cfg = format!(
        "{}/grub/grub.cfg",
        config.disk.efi_directory.trim_end_matches('/')
    );

    let mut book = Runbook::new(Stage::Boot);
    book.push(
        "Add lvm2 boot hook",
        Action::SpliceHook {
            path: config.target_path(&config.system.mkinitcpio_conf),
            anchor: BLOCK_HOOK.to_string(),
            hook: LVM_BOOT_HOOK.to_string(),
        },
    )
    .command("Build initramfs", CHROOT, &[root.as_str(), "mkinitcpio", "-P"])
    .command(
        "Install GRUB",
        CHROOT,
        &[
            root.as_str(),
            "grub-install",
            "--target=x86_64-efi",
            efi_directory.as_str(),
            bootloader_id.as_str(),
        ],
    )
    .command(
        "Generate GRUB configuration",
        CHROOT,
        &[root.as_str(), "grub-mkconfig", "-o", grub_cfg.as_str()],
    );

    for service in &config.packages.services {
        book.command(
            &format!("Enable {}", service),
            CHROOT,
            &[root.as_str(), "systemctl", "enable", service.as_str()],
        );
    }
    book
}
