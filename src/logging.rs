use std::str::FromStr;

use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    filter::FilterFn, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt, Layer,
};

/// Install the global `tracing` subscriber.
///
/// The level comes from `LOG_LEVEL`, falling back to `TRACE` for debug
/// builds and `INFO` otherwise. Only events emitted by this crate are shown.
/// Calling this more than once is harmless.
pub fn init() {
    let default = if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };

    let level = std::env::var("LOG_LEVEL").map_or(default, |level| parse_level(&level, default));

    let _ = tracing_subscriber::Registry::default()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_ansi(true)
                .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
                .with_filter(level)
                .with_filter(FilterFn::new(|metadata| {
                    metadata.target().starts_with("mxprobe")
                })),
        )
        .try_init();
}

fn parse_level(level: &str, default: LevelFilter) -> LevelFilter {
    LevelFilter::from_str(level).unwrap_or_else(|_| {
        eprintln!("Invalid log level specified {level}, defaulting to {default}");
        default
    })
}

#[cfg(test)]
mod tests {
    use tracing::metadata::LevelFilter;

    use super::parse_level;

    #[test]
    fn level_parsing() {
        assert_eq!(parse_level("warn", LevelFilter::INFO), LevelFilter::WARN);
        assert_eq!(parse_level("DEBUG", LevelFilter::INFO), LevelFilter::DEBUG);
        assert_eq!(parse_level("loud", LevelFilter::INFO), LevelFilter::INFO);
    }
}
