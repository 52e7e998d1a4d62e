// Copyright 2024 ledgerfs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use snafu::{ResultExt, Whatever};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Initialize logging to stderr. Meant for the host process that mounts
/// ledgerfs, called once at startup; tests use [init_test_logging].
///
/// The filter comes from `RUST_LOG` when set, `default_log_level` otherwise.
/// Panics are routed through tracing once this returns.
pub fn init_logging(default_log_level: &str) -> Result<(), Whatever> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_log_level));

    let fmt_layer = fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .whatever_context("failed to install the tracing subscriber")?;
    tracing::info!("logging started");

    std::panic::set_hook(Box::new(tracing_panic_hook));
    Ok(())
}

/// Idempotent logging setup for tests; output goes through the test writer so
/// it is captured per test.
pub fn init_test_logging() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with(fmt::layer().with_test_writer())
        .try_init();
}

fn tracing_panic_hook(info: &std::panic::PanicInfo) {
    let msg = match info.payload().downcast_ref::<&'static str>() {
        Some(s) => *s,
        None => match info.payload().downcast_ref::<String>() {
            Some(s) => &s[..],
            None => "Box<dyn Any>",
        },
    };
    let thread = std::thread::current();
    let thread = thread.name().unwrap_or("<unnamed>");

    match info.location() {
        Some(location) => tracing::error!(
            %thread,
            location = %format_args!("{}:{}:{}", location.file(), location.line(), location.column()),
            "panic: {msg}"
        ),
        None => tracing::error!(%thread, "panic: {msg}"),
    }
}
