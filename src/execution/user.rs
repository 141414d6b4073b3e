use super::paths::CHROOT;
use super::runbook::Runbook;
use super::step::Stage;
use crate::config::InstallConfig;
use crate::error::InstallError;

pub fn runbook(config: &InstallConfig) -> Runbook {
    let root = config.disk.mount_point.to_string_lossy().to_string();
    let user = &config.user;
    let groups = user.groups.join(",");
    let fragment = config.target_path(&user.sudoers_fragment);

    let mut useradd = vec![root.clone(), "useradd".to_string(), "-m".to_string()];
    if !groups.is_empty() {
        useradd.push("-G".to_string());
        useradd.push(groups);
    }
    useradd.extend([
        "-s".to_string(),
        user.shell.clone(),
        user.name.clone(),
    ]);

    let mut book = Runbook::new(Stage::User);
    book.command("Create user", CHROOT, &useradd)
        .command(
            "Set user password",
            CHROOT,
            &[root.as_str(), "passwd", user.name.as_str()],
        )
        .write_file(
            "Write sudoers fragment",
            &fragment,
            format!("{}\n", user.sudoers_rule),
            Some(0o440),
        )
        .command(
            "Validate sudoers fragment",
            CHROOT,
            &[
                root.as_str(),
                "visudo",
                "-c",
                "-f",
                user.sudoers_fragment.as_str(),
            ],
        )
        .recover_by_removing(
            &fragment,
            InstallError::SudoersValidation {
                path: fragment.clone(),
            }
            .to_string(),
        );
    book
}
