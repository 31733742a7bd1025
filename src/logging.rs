use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Library plus both binaries, which log under their own crate targets.
const TARGETS: [&str; 3] = ["devstack", "dev_up", "db_push"];

/// Filter used when `RUST_LOG` is unset.
pub fn default_filter(verbose: bool) -> String {
    let (ours, rest) = if verbose { ("debug", "info") } else { ("info", "warn") };
    let mut directives: Vec<String> = TARGETS.iter().map(|t| format!("{t}={ours}")).collect();
    directives.push(rest.to_string());
    directives.join(",")
}

/// Compact stderr logger; `RUST_LOG` wins over the verbosity default.
pub fn init_cli_logger(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();
}
