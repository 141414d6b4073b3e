//! `/etc/locale.gen` handling.
//!
//! Entries look like `#en_US.UTF-8 UTF-8`: a locale name and a charset,
//! commented out with a single `#` when disabled. Header lines such as
//! `#  en_US.UTF-8 UTF-8` (note the space) are examples, not entries.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::error::InstallError;

/// Locale name of an entry line, whether enabled or not.
fn entry_locale(line: &str) -> Option<&str> {
    let line = line.trim_end();
    let body = match line.strip_prefix('#') {
        Some(rest) if rest.starts_with(char::is_whitespace) => return None,
        Some(rest) => rest,
        None => line.trim_start(),
    };
    if body.is_empty() || body.starts_with('#') {
        return None;
    }

    let mut fields = body.split_whitespace();
    let locale = fields.next()?;
    fields.next()?;
    Some(locale)
}

pub fn parse_locale_gen(contents: &str) -> Vec<String> {
    let mut locales: Vec<String> = contents
        .lines()
        .filter_map(entry_locale)
        .map(String::from)
        .collect();
    locales.sort();
    locales.dedup();
    locales
}

pub fn available_locales(locale_gen: &Path) -> Result<Vec<String>> {
    let contents = fs::read_to_string(locale_gen)
        .with_context(|| format!("Failed to read {}", locale_gen.display()))?;
    Ok(parse_locale_gen(&contents))
}

/// Fail with [`InstallError::InvalidLocale`] unless `locale` has an entry.
pub fn validate_locale(locale: &str, available: &[String]) -> Result<(), InstallError> {
    if available.iter().any(|l| l == locale) {
        Ok(())
    } else {
        Err(InstallError::InvalidLocale {
            locale: locale.to_string(),
        })
    }
}

/// Uncomment every entry for `locale`, leaving the rest of the file alone.
pub fn enable_locale(contents: &str, locale: &str) -> String {
    let mut out = String::with_capacity(contents.len());
    for line in contents.split_inclusive('\n') {
        if entry_locale(line) == Some(locale)
            && let Some(rest) = line.strip_prefix('#')
        {
            out.push_str(rest);
        } else {
            out.push_str(line);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCALE_GEN: &str = "\
# Configuration file for locale-gen
#
#  Examples:
#  en_US ISO-8859-1
#  en_US.UTF-8 UTF-8
#
#de_DE.UTF-8 UTF-8
#de_DE ISO-8859-1
#en_US.UTF-8 UTF-8
nl_NL.UTF-8 UTF-8
";

    #[test]
    fn test_parse_locale_gen_skips_header() {
        assert_eq!(
            parse_locale_gen(LOCALE_GEN),
            vec!["de_DE", "de_DE.UTF-8", "en_US.UTF-8", "nl_NL.UTF-8"]
        );
    }

    #[test]
    fn test_validate_locale() {
        let available = parse_locale_gen(LOCALE_GEN);
        assert!(validate_locale("en_US.UTF-8", &available).is_ok());
        let err = validate_locale("xx_XX.UTF-8", &available).unwrap_err();
        assert!(matches!(err, InstallError::InvalidLocale { locale } if locale == "xx_XX.UTF-8"));
        // header examples do not count
        assert!(validate_locale("en_US", &available).is_err());
    }

    #[test]
    fn test_enable_locale_only_touches_entry() {
        let updated = enable_locale(LOCALE_GEN, "en_US.UTF-8");
        assert!(updated.contains("\nen_US.UTF-8 UTF-8\n"));
        assert!(updated.contains("#  en_US.UTF-8 UTF-8\n"));
        assert!(updated.contains("#de_DE.UTF-8 UTF-8\n"));
        assert_eq!(updated.len(), LOCALE_GEN.len() - 1);
    }

    #[test]
    fn test_enable_locale_already_enabled() {
        assert_eq!(enable_locale(LOCALE_GEN, "nl_NL.UTF-8"), LOCALE_GEN);
    }
}
