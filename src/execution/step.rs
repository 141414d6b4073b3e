use serde::{Deserialize, Serialize};
use std::fmt;

use crate::phase::Phase;

#[derive(Debug, Deserialize, Serialize, clap::ValueEnum, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Partition the disk, build the LVM volume group, format and mount
    Disk,
    /// Install the base system (pacstrap) and generate fstab
    Bootstrap,
    /// Add the lvm2 initramfs hook, build initramfs, install GRUB
    Boot,
    /// Create the user and the sudoers fragment
    User,
    /// Relocate the installer and register the post-reboot resume
    Handoff,
    /// Locale, timezone, hostname and packages on first login
    Finalize,
}

const PRE_BOOT_STAGES: &[Stage] = &[
    Stage::Disk,
    Stage::Bootstrap,
    Stage::Boot,
    Stage::User,
    Stage::Handoff,
];

const POST_BOOT_STAGES: &[Stage] = &[Stage::Finalize];

impl Stage {
    pub fn phase(&self) -> Phase {
        match self {
            Stage::Finalize => Phase::PostBoot,
            _ => Phase::PreBoot,
        }
    }

    /// Stages of `phase` in execution order.
    pub fn for_phase(phase: Phase) -> &'static [Stage] {
        match phase {
            Phase::PreBoot => PRE_BOOT_STAGES,
            Phase::PostBoot => POST_BOOT_STAGES,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Stage::Disk => "Disk setup",
            Stage::Bootstrap => "Distribution bootstrap",
            Stage::Boot => "Boot setup",
            Stage::User => "User setup",
            Stage::Handoff => "Resume registration",
            Stage::Finalize => "Post-boot finalization",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Disk => "disk",
            Stage::Bootstrap => "bootstrap",
            Stage::Boot => "boot",
            Stage::User => "user",
            Stage::Handoff => "handoff",
            Stage::Finalize => "finalize",
        };
        write!(f, "{}", name)
    }
}
