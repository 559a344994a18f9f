// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! slog backend and per-request logging context.

use std::io;
use std::time::Instant;

use slog::{Drain, Logger, o};
use slog_async::Async;
use slog_json::Json;
use slog_term::{FullFormat, TermDecorator};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Terminal,
    Json,
}

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub format: LogFormat,
    pub level: slog::Level,
    pub include_location: bool,
    pub static_fields: Vec<(String, String)>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Terminal,
            level: slog::Level::Info,
            include_location: true,
            static_fields: Vec::new(),
        }
    }
}

/// Build a root logger for `config`.
pub fn create_logger(config: &LoggerConfig) -> Logger {
    let logger = match config.format {
        LogFormat::Terminal => {
            let decorator = TermDecorator::new().build();
            let format = FullFormat::new(decorator);
            let format = if config.include_location {
                format.use_file_location()
            } else {
                format
            };
            let drain = format.build().fuse().filter_level(config.level).fuse();
            Logger::root(Async::new(drain).build().fuse(), o!())
        }
        LogFormat::Json => {
            let drain = Json::new(io::stdout())
                .add_default_keys()
                .build()
                .fuse()
                .filter_level(config.level)
                .fuse();
            Logger::root(Async::new(drain).build().fuse(), o!())
        }
    };

    config
        .static_fields
        .iter()
        .fold(logger, |logger, (key, value)| {
            // slog keys are &'static str; static fields live for the process.
            let key: &'static str = Box::leak(key.clone().into_boxed_str());
            logger.new(o!(key => value.clone()))
        })
}

pub fn generate_trace_id() -> String {
    Uuid::new_v4().to_string()
}

/// Context of one proxied request.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub trace_id: String,
    pub method: String,
    pub path: String,
    pub remote_addr: String,
    start: Instant,
}

impl RequestInfo {
    /// New context with a fresh trace id unless `trace_id` is given.
    pub fn new(method: &str, path: &str, remote_addr: &str, trace_id: Option<String>) -> Self {
        Self {
            trace_id: trace_id.unwrap_or_else(generate_trace_id),
            method: method.to_string(),
            path: path.to_string(),
            remote_addr: remote_addr.to_string(),
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.start.elapsed().as_millis()
    }

    /// Short label used as the `[context]` of log lines.
    pub fn context(&self) -> String {
        format!("{} {} {}", self.trace_id, self.method, self.path)
    }
}

/// Keeps the global slog logger installed.
pub struct LoggerGuard {
    _guard: slog_scope::GlobalLoggerGuard,
}

impl std::fmt::Debug for LoggerGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("LoggerGuard")
    }
}

pub fn init_global_logger(config: &LoggerConfig) -> LoggerGuard {
    let guard = slog_scope::set_global_logger(create_logger(config));
    LoggerGuard { _guard: guard }
}
