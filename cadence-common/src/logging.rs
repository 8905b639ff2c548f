use std::str::FromStr;

use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    Layer, filter::FilterFn, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
};

#[macro_export]
macro_rules! log {
    ($level:expr, $span:expr, $($msg:tt)*) => {{
        let span = $crate::tracing::span!($level, $span);
        let _enter = span.enter();

        $crate::tracing::event!($level, $($msg)*)
    }};
}

#[macro_export]
macro_rules! internal {
    (level = $level:ident, $($msg:tt)*) => {
        $crate::log!($crate::tracing::Level::$level, "internal", $($msg)*)
    };

    ($($msg:tt)*) => {
        $crate::internal!(level = TRACE, $($msg)*)
    };
}

fn level_from_env() -> LevelFilter {
    let default = if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };

    std::env::var("LOG_LEVEL").map_or(default, |level| {
        LevelFilter::from_str(level.as_str()).unwrap_or_else(|_| {
            eprintln!("Invalid log level specified {level}, defaulting to {default}");
            default
        })
    })
}

fn cadence_only() -> FilterFn {
    FilterFn::new(|metadata| metadata.target().starts_with("cadence"))
}

/// Install the global subscriber.
///
/// `LOG_LEVEL` picks the level and `LOG_FORMAT=json` switches from the compact
/// human format to one JSON object per line. Only events from `cadence*`
/// targets are emitted.
pub fn init() {
    let level = level_from_env();
    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::Registry::default();

    let result = if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
                    .with_filter(level)
                    .with_filter(cadence_only()),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_file(false)
                    .with_line_number(false)
                    .compact()
                    .with_ansi(true)
                    .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
                    .with_filter(level)
                    .with_filter(cadence_only()),
            )
            .try_init()
    };

    if let Err(err) = result {
        eprintln!("Logging already initialised: {err}");
    }
}
