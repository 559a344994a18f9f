// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Runs the caching secret-store proxy as a stand-alone process.
//!
//!  Build it with `cargo build --release --bin sema`
//!  The binary honours SEMA_CONFIG_FILE or falls back to /etc/sema/config.toml
//!  when that file exists; otherwise only `SEMA_` environment variables apply.

use std::env;
use std::error::Error;
use std::path::Path;

use sema::{Sema, error_fmt, info_fmt};

const FALLBACK_CONFIG: &str = "/etc/sema/config.toml";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let mut loader = Sema::loader();
    match env::var("SEMA_CONFIG_FILE").ok() {
        Some(path) => {
            println!("Using configuration from {path}");
            loader = loader.with_config_file(&path);
        }
        None if Path::new(FALLBACK_CONFIG).exists() => {
            println!("No SEMA_CONFIG_FILE env var found; using {FALLBACK_CONFIG}");
            loader = loader.with_config_file(FALLBACK_CONFIG);
        }
        None => println!("No configuration file found; using SEMA_ environment variables only"),
    }

    let sema = match loader.build().await {
        Ok(sema) => sema,
        Err(e) => {
            eprintln!("Failed to build sema: {e}");
            return Err(e.into());
        }
    };

    match sema.start().await {
        Ok(()) => info_fmt!("Sema", "Proxy server stopped gracefully"),
        Err(e) => {
            error_fmt!("Sema", "Proxy server failed: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}
