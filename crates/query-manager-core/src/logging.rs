//! Logging integration for the query-manager layer.
//!
//! Provides a helper for installing a [`tracing`] subscriber and a span
//! constructor used around terminal query operations.

/// Sets up the global tracing subscriber with the given filter directive
/// (e.g. `"debug"`, `"query_manager=trace"`).
///
/// Safe to call more than once; subsequent calls are no-ops.
pub fn setup_logging(filter: &str) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));

    fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .ok();
}

/// Creates a tracing span for one terminal query operation on a model.
///
/// # Examples
///
/// ```
/// use query_manager_core::logging::query_span;
///
/// let span = query_span("item", "all");
/// let _guard = span.enter();
/// tracing::debug!("compiling plan");
/// ```
pub fn query_span(model: &str, operation: &str) -> tracing::Span {
    tracing::debug_span!("query", model = model, op = operation)
}
