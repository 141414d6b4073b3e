use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use super::StageContext;
use super::locale::{available_locales, enable_locale, validate_locale};
use super::paths::HOSTS_FILE;
use super::runbook::{Action, CommandSpec, Runbook};
use super::step::Stage;

fn hosts_file(hostname: &str) -> String {
    format!(
        "127.0.0.1\tlocalhost\n::1\t\tlocalhost\n127.0.1.1\t{0}.localdomain\t{0}\n",
        hostname
    )
}

/// Runs on the installed system, usually as the new user, so privileged
/// commands go through sudo.
struct Privileged<'a> {
    book: &'a mut Runbook,
    sudo: bool,
}

impl Privileged<'_> {
    fn command(&mut self, name: &str, program: &str, args: &[&str]) -> &mut Self {
        let spec = if self.sudo {
            let mut full = vec![program];
            full.extend_from_slice(args);
            CommandSpec::new("sudo", &full)
        } else {
            CommandSpec::new(program, args)
        };
        self.book.spec(name, spec);
        self
    }

    fn write_file(&mut self, name: &str, path: &Path, contents: String) -> &mut Self {
        if self.sudo {
            let path = path.to_string_lossy().to_string();
            self.book.spec(
                name,
                CommandSpec::new("sudo", &["tee", path.as_str()]).with_input(contents),
            );
        } else {
            self.book.write_file(name, path, contents, None);
        }
        self
    }
}

pub fn runbook(ctx: &StageContext) -> Result<Runbook> {
    let system = &ctx.config.system;

    // Nothing may change before the locale is known to be valid.
    let available = available_locales(&ctx.locale_gen)?;
    validate_locale(&system.locale, &available)?;
    let locale_gen = fs::read_to_string(&ctx.locale_gen)
        .with_context(|| format!("Failed to read {}", ctx.locale_gen.display()))?;

    let lang = format!("LANG={}", system.locale);
    let mut pacman = vec!["-Syu", "--needed", "--noconfirm"];
    pacman.extend(ctx.config.packages.extra.iter().map(String::as_str));

    let mut book = Runbook::new(Stage::Finalize);
    Privileged {
        book: &mut book,
        sudo: ctx.use_sudo,
    }
    .write_file(
        "Enable locale",
        &ctx.locale_gen,
        enable_locale(&locale_gen, &system.locale),
    )
    .command("Generate locales", "locale-gen", &[])
    .command("Set system locale", "localectl", &["set-locale", lang.as_str()])
    .command(
        "Set timezone",
        "timedatectl",
        &["set-timezone", system.timezone.as_str()],
    )
    .command("Enable NTP", "timedatectl", &["set-ntp", "true"])
    .command(
        "Set hostname",
        "hostnamectl",
        &["set-hostname", system.hostname.as_str()],
    )
    .write_file("Write hosts file", Path::new(HOSTS_FILE), hosts_file(&system.hostname))
    .command("Update system and install packages", "pacman", &pacman);

    book.push(
        "Remove sentinel",
        Action::MarkReset {
            sentinel: ctx.marker().path().to_path_buf(),
        },
    );
    Ok(book)
}
