use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LEVEL: &str = "info";

/// Install the stderr subscriber. `RUST_LOG` wins over `level`.
pub fn init(level: Option<&str>) {
    let level = level.unwrap_or(DEFAULT_LEVEL);
    let fallback = format!("warn,pharmabot={level}");

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&fallback))
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,pharmabot={DEFAULT_LEVEL}")));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .try_init();
}
