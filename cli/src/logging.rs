//! Tracing / logging initialisation.

use salesindex_core::LogConfig;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the directive string: `"info,salesindex_core=debug"` etc.
fn directives(config: &LogConfig, verbose: bool) -> String {
    let mut directives = if verbose {
        "debug".to_string()
    } else {
        config.level.clone()
    };
    let mut components: Vec<_> = config.components.iter().collect();
    components.sort();
    for (component, level) in components {
        directives.push_str(&format!(",{}={}", component.replace('-', "_"), level));
    }
    directives
}

/// Initialise tracing with the given log config.
/// Should be called once at application startup.
pub fn init_tracing(config: &LogConfig, verbose: bool) {
    let filter = EnvFilter::try_new(directives(config, verbose))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if config.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}
