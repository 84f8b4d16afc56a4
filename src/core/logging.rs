use anyhow::{Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Crates that are chatty at `info` and only interesting when something breaks.
const QUIET_TARGETS: [&str; 4] = ["sqlx", "hyper", "reqwest", "warp"];

fn default_directives(log_level: &str) -> String {
    let mut directives = vec![log_level.to_string()];
    directives.extend(QUIET_TARGETS.iter().map(|t| format!("{}=warn", t)));
    directives.join(",")
}

/// `RUST_LOG` wins over the configured level when set.
pub fn init_logging(log_level: &str) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(log_level)))
        .with_context(|| format!("Invalid log level: {}", log_level))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .context("Logging already initialized")?;

    tracing::info!("Logging initialized at level: {}", log_level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noisy_crates_capped_at_warn() {
        let directives = default_directives("debug");
        assert!(directives.starts_with("debug,"));
        assert!(directives.contains("sqlx=warn"));
        assert!(EnvFilter::try_new(directives).is_ok());
    }
}
