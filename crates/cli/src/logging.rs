use std::io;

use tracing_subscriber::EnvFilter;

/// `-v` picks debug and `-vv` trace for our crates; `RUST_LOG` overrides both.
fn default_filter(verbose: u8) -> String {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    format!("warn,tmoss={level},tmoss_core={level}")
}

/// Installs a stderr subscriber so stdout only carries results.
pub(crate) fn init_logging(verbose: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}
