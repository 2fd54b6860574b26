pub mod cmd;
pub mod config;

use tracing::debug;
#[cfg(not(target_os = "android"))]
use tracing::Level;

/// Set up logging once per process. Safe to call from every entry point.
#[cfg(not(target_os = "android"))]
pub fn init_logging() {
    // Use DEBUG level for debug builds, INFO for release builds

    #[cfg(not(debug_assertions))]
    let result = tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_ansi(!cfg!(windows))
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .try_init();

    #[cfg(debug_assertions)]
    let result = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_ansi(!cfg!(windows))
        .with_target(false)
        // Debug builds: show thread info, file, and line number
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .compact()
        .try_init();

    if result.is_ok() {
        debug!("Logging initialized");
    }
}

/// Android has no stdout; route `tracing` events (via their `log` records)
/// to logcat under the `IIA_NATIVE` tag.
#[cfg(target_os = "android")]
pub fn init_logging() {
    let level = if cfg!(debug_assertions) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    android_logger::init_once(
        android_logger::Config::default()
            .with_max_level(level)
            .with_tag("IIA_NATIVE"),
    );
    debug!("Logging initialized");
}
