use crate::guard::locale::LocaleSet;
use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};

pub const ARG_LOCALES: &str = "locales";
pub const ARG_DEFAULT_LOCALE: &str = "default-locale";

/// Build the supported locale set.
///
/// # Errors
/// Returns an error if the list is empty or does not contain the default.
pub fn parse(matches: &ArgMatches) -> Result<LocaleSet> {
    let locales: Vec<String> = matches
        .get_many::<String>(ARG_LOCALES)
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    let default = matches
        .get_one::<String>(ARG_DEFAULT_LOCALE)
        .map_or("", String::as_str);

    LocaleSet::new(&locales, default).with_context(|| {
        format!(
            "invalid --{ARG_LOCALES} [{}] / --{ARG_DEFAULT_LOCALE} {default}",
            locales.join(",")
        )
    })
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_LOCALES)
                .long(ARG_LOCALES)
                .help("Comma separated list of supported locales")
                .env("PORTICO_LOCALES")
                .default_value("en,pt,es")
                .value_delimiter(','),
        )
        .arg(
            Arg::new(ARG_DEFAULT_LOCALE)
                .long(ARG_DEFAULT_LOCALE)
                .help("Locale used when negotiation finds no match")
                .env("PORTICO_DEFAULT_LOCALE")
                .default_value("en"),
        )
}
