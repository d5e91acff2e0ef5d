/// Installs a global `tracing` subscriber printing to stderr.
///
/// The filter is read from `RUST_LOG` and defaults to `settei=info`.
/// Calling this more than once is an error.
#[cfg(feature = "logging")]
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("settei=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init()?;

    Ok(())
}
