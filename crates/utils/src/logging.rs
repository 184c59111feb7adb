//! provides logging helpers

use tracing::Subscriber;
use tracing_subscriber::filter::{self};
use tracing_subscriber::fmt::layer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// Translate a user facing log level into an `EnvFilter` directive.
///
/// Accepts the usual level names, `warning` as an alias of `warn` and `none`
/// to silence everything. Anything else is passed through untouched so full
/// directives such as `smaps_exporter=debug,tonic=warn` keep working.
pub fn level_directive(level: &str) -> String {
    match level.trim().to_ascii_lowercase().as_str() {
        "none" | "off" => "off".to_string(),
        "warning" => "warn".to_string(),
        "trace" | "debug" | "info" | "warn" | "error" => level.trim().to_ascii_lowercase(),
        _ => level.trim().to_string(),
    }
}

/// Build the env filter used by the stderr layer.
///
/// `RUST_LOG` wins over `level` when set.
pub fn env_filter(level: &str) -> filter::EnvFilter {
    let directive = level_directive(level);
    match std::env::var(filter::EnvFilter::DEFAULT_ENV) {
        Ok(from_env) if !from_env.trim().is_empty() => {
            filter::EnvFilter::builder().parse_lossy(from_env)
        }
        _ => filter::EnvFilter::builder()
            .with_default_directive(filter::LevelFilter::INFO.into())
            .parse_lossy(directive),
    }
}

/// stderr formatting layer shared by every binary of the workspace
pub fn get_fmt_layer<S>() -> impl Layer<S> + Send + Sync
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    layer().with_writer(std::io::stderr).with_target(true)
}

/// initiate the global tracing subscriber
pub fn init(level: &str) {
    let fmt_layer = get_fmt_layer().with_filter(env_filter(level));

    registry().with(fmt_layer).init();
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn level_names_are_normalised() {
        assert_eq!(level_directive("INFO"), "info");
        assert_eq!(level_directive("warning"), "warn");
        assert_eq!(level_directive(" debug "), "debug");
        assert_eq!(level_directive("none"), "off");
    }

    #[test]
    fn directives_pass_through() {
        assert_eq!(
            level_directive("smaps_exporter=debug,tonic=warn"),
            "smaps_exporter=debug,tonic=warn"
        );
    }
}
