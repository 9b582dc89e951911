//! Tracing setup for simulation runs

use tracing_subscriber::EnvFilter;

/// Install a `fmt` subscriber filtered at `level`
///
/// `RUST_LOG` overrides `level` when set. Only the first call installs a
/// subscriber; later calls are ignored.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_logging("debug");
        init_logging("warn");
        tracing::info!("logging initialised twice");
    }
}
