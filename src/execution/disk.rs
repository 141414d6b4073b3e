use super::runbook::{CommandSpec, Runbook};
use super::step::Stage;
use crate::config::InstallConfig;

pub fn get_part_path(disk: &str, part_num: u32) -> String {
    // nvme0n1 -> nvme0n1p1, sda -> sda1
    if disk.chars().last().is_some_and(|c| c.is_ascii_digit()) {
        format!("{}p{}", disk, part_num)
    } else {
        format!("{}{}", disk, part_num)
    }
}

/// GPT with an EFI system partition followed by one partition for LVM.
fn partition_script(efi_size: &str) -> String {
    format!("label: gpt\nsize={}, type=U\ntype=V\n", efi_size)
}

pub fn runbook(config: &InstallConfig) -> Runbook {
    let disk = &config.disk.device;
    let efi = get_part_path(disk, 1);
    let lvm = get_part_path(disk, 2);
    let vg = &config.volumes.group;
    let mount_point = config.disk.mount_point.to_string_lossy().to_string();
    let boot_mount = config
        .target_path(&config.disk.efi_directory)
        .to_string_lossy()
        .to_string();
    let home_mount = config.target_path("/home").to_string_lossy().to_string();

    let swap = config.mapper_path("swap");
    let root = config.mapper_path("root");
    let home = config.mapper_path("home");

    let mut book = Runbook::new(Stage::Disk);
    book.spec(
        "Partition disk",
        CommandSpec::new("sfdisk", &[disk.as_str()])
            .with_input(partition_script(&config.disk.efi_size)),
    )
    .command("Wait for partitions", "udevadm", &["settle"])
    .command("Create physical volume", "pvcreate", &["-ff", "-y", lvm.as_str()])
    .command("Create volume group", "vgcreate", &[vg.as_str(), lvm.as_str()])
    .command(
        "Create swap volume",
        "lvcreate",
        &["-y", "-L", config.volumes.swap_size.as_str(), vg.as_str(), "-n", "swap"],
    )
    .command(
        "Create root volume",
        "lvcreate",
        &["-y", "-L", config.volumes.root_size.as_str(), vg.as_str(), "-n", "root"],
    )
    .command(
        "Create home volume",
        "lvcreate",
        &["-y", "-l", "100%FREE", vg.as_str(), "-n", "home"],
    )
    .command(
        "Format EFI partition",
        "mkfs.fat",
        &["-F32", "-n", config.disk.efi_label.as_str(), efi.as_str()],
    )
    .command(
        "Format swap",
        "mkswap",
        &["-L", config.volumes.swap_label.as_str(), swap.as_str()],
    )
    .command(
        "Format root",
        "mkfs.ext4",
        &["-F", "-L", config.volumes.root_label.as_str(), root.as_str()],
    )
    .command(
        "Format home",
        "mkfs.ext4",
        &["-F", "-L", config.volumes.home_label.as_str(), home.as_str()],
    )
    .command("Mount root", "mount", &[root.as_str(), mount_point.as_str()])
    .command("Mount EFI partition", "mount", &["--mkdir", efi.as_str(), boot_mount.as_str()])
    .command("Mount home", "mount", &["--mkdir", home.as_str(), home_mount.as_str()])
    // genfstab picks up active swap
    .command("Enable swap", "swapon", &[swap.as_str()]);
    book
}
