//! Integration tests for logging and tracing

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[test]
fn test_tracing_subscriber_initialization() {
    let result = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("slack_exporter=debug")),
        )
        .with_test_writer()
        .try_init();

    // A subscriber installed by another test is fine too
    let _ = result;
}

#[test]
fn test_filter_directives_parse() {
    for directive in [
        "info",
        "slack_exporter=debug",
        "warn,slack_exporter::export=trace",
        "slack_exporter::fetcher::slack_http=debug,slack_exporter=info",
    ] {
        assert!(
            directive.parse::<EnvFilter>().is_ok(),
            "directive {directive} should parse"
        );
    }
}

#[test]
fn test_structured_fields_and_spans() {
    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::new("slack_exporter=debug"))
        .with_test_writer()
        .try_init();

    let span = tracing::info_span!("conversation", name = "general", id = "C1");
    let _enter = span.enter();
    info!(call = "conversations.history(C1)", pages = 2, "Fetched");
    warn!(unit = "random", error = "API error", "Conversation export failed");
}
