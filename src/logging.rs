// Structured logging setup shared by both binaries

use crate::config::Settings;

pub fn init_logging(app_name: &str) -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    // RUST_LOG wins; otherwise chatty for this crate and quiet for the HTTP stack
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            "info,shorts_uploader=debug,reqwest=info,hyper=info,axum=info".to_string()
        } else {
            "info,shorts_uploader=info,reqwest=warn,hyper=warn,axum=warn".to_string()
        }
    });

    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log_level))?;

    let fmt_layer = if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        // JSON lines for journald / log shipping on the always-on device
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    tracing::debug!("{} {} starting", app_name, env!("CARGO_PKG_VERSION"));
    tracing::debug!(
        "Build mode: {}, log level: {}",
        if cfg!(debug_assertions) { "development" } else { "production" },
        log_level
    );

    Ok(())
}

/// One line per integration so a misconfigured device is obvious from the journal.
pub fn log_configuration(settings: &Settings, authenticated: bool) {
    let openai = settings.openai_api_key().is_some();
    let anthropic = settings.anthropic_api_key().is_some();

    tracing::info!(
        "Configuration - YouTube token: {}, OpenAI: {}, Anthropic: {}, AI provider: {}, secrets in: {}",
        if authenticated { "✅" } else { "❌" },
        if openai { "✅" } else { "❌" },
        if anthropic { "✅" } else { "❌" },
        settings.ai_provider,
        if settings.use_keychain { "keychain" } else { "credentials file" }
    );
}
