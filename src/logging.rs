// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT
//! Tracing subscriber setup: `RUST_LOG` drives the filter, `--debug` raises
//! the default level, and `RUST_LOG_FORMAT=json` switches the stderr writer
//! from human-readable to structured JSON.

use tracing_subscriber::{fmt, EnvFilter};

pub fn init(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let json = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let subscriber = fmt::Subscriber::builder().with_env_filter(filter).with_writer(std::io::stderr);

    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
