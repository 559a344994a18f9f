// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Logging setup.
//!
//! Everything in the crate logs through the `log` facade. By default the
//! facade is backed by `env_logger`; with `structured = true` it is bridged
//! into a global `slog` logger (terminal or JSON).

pub mod config;
pub mod structured;
#[macro_use]
pub mod wrapper;

#[cfg(test)]
pub mod test_logger;

use std::sync::Once;
use std::sync::atomic::{AtomicBool, Ordering};

use log::LevelFilter;
use once_cell::sync::OnceCell;

pub use config::LoggingConfig;
pub use structured::{LoggerGuard, RequestInfo};

static INIT: Once = Once::new();
static USING_STRUCTURED: AtomicBool = AtomicBool::new(false);
static GLOBAL_GUARD: OnceCell<LoggerGuard> = OnceCell::new();

/// Initialize `env_logger` at `level` (default `info`); `RUST_LOG` wins.
/// Only the first call in a process has an effect.
pub fn init(level: Option<LevelFilter>) {
    INIT.call_once(|| init_env_logger(level.unwrap_or(LevelFilter::Info)));
}

/// Initialize logging from a [`LoggingConfig`]. Only the first call in a
/// process has an effect.
pub fn init_with_config(level: LevelFilter, config: &LoggingConfig) {
    INIT.call_once(|| {
        if !config.structured {
            init_env_logger(level);
            return;
        }

        let guard = structured::init_global_logger(&config.to_logger_config());
        let _ = GLOBAL_GUARD.set(guard);

        let bridged = level.to_level().unwrap_or(log::Level::Error);
        match slog_stdlog::init_with_level(bridged) {
            Ok(()) => {
                log::set_max_level(level);
                USING_STRUCTURED.store(true, Ordering::SeqCst);
                log::info!("Structured logging initialized at level: {level}");
            }
            Err(err) => eprintln!("failed to bridge log records into slog: {err}"),
        }
    });
}

fn init_env_logger(level: LevelFilter) {
    let env = env_logger::Env::default().filter_or("RUST_LOG", level.as_str().to_lowercase());
    let result = env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .format_target(true)
        .try_init();
    if result.is_ok() {
        log::info!("Logging initialized at level: {}", log::max_level());
    }
}

/// Whether [`init_with_config`] installed the structured backend.
pub fn is_structured_logging() -> bool {
    USING_STRUCTURED.load(Ordering::SeqCst)
}

/// Parse a level name, falling back to `info`.
pub fn level_filter(name: &str) -> LevelFilter {
    name.parse().unwrap_or(LevelFilter::Info)
}
