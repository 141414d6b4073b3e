pub const LOG_FILE: &str = "/var/log/archlvm.log";
pub const LOCALE_GEN: &str = "/etc/locale.gen";
pub const HOSTS_FILE: &str = "/etc/hosts";
pub const CHROOT: &str = "arch-chroot";
/// Marks the resume snippet so it is appended only once
pub const PROFILE_MARKER: &str = "# archlvm: resume installation after reboot";
