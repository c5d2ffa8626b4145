//! Log capture for tests.

use tracing_subscriber::EnvFilter;

/// Used when `RUST_LOG` is unset: everything from the workspace, only warnings from dependencies.
const DEFAULT_FILTER: &str = "WARN,\
    stripebench_cli=TRACE,\
    stripebench_io=TRACE,\
    stripebench_upload=TRACE";

/// Routes log output to the test runner, which shows it for failing tests only.
///
/// `RUST_LOG` replaces the default filter, for example `RUST_LOG=stripebench_io::engine=debug`.
/// Every test may call this; the first call installs the subscriber.
///
/// # Example
///
/// ```
/// stripebench_test::tracing::init();
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .with_line_number(true)
        .compact()
        .try_init()
        .ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_parses() {
        for directive in DEFAULT_FILTER.split(',') {
            assert!(
                directive.parse::<tracing_subscriber::filter::Directive>().is_ok(),
                "{directive}"
            );
        }
    }

    #[test]
    fn init_is_idempotent() {
        init();
        init();
    }
}
