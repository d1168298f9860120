use log::LevelFilter;

/// Formats a record as `<rfc3339 local time>  <LEVEL> [<target>] <message>`.
fn format_line(
    out: fern::FormatCallback<'_>,
    message: &std::fmt::Arguments<'_>,
    record: &log::Record<'_>,
) {
    out.finish(format_args!(
        "{}  {} [{}] {}",
        chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        record.level(),
        record.target(),
        message
    ))
}

/// Initializes logging to stderr.
/// Should be called once at the start of main().
///
/// # Errors
///
/// Fails if a global logger has already been installed.
pub fn init_logging(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    fern::Dispatch::new()
        .format(format_line)
        .level(level)
        .chain(std::io::stderr())
        .apply()
}

/// Log level helper to determine if debug logging is enabled
pub fn is_debug_enabled() -> bool {
    log::log_enabled!(log::Level::Debug)
}
