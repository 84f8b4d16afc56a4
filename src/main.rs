use anyhow::{Context, Result};
use std::sync::Arc;

use ipo_pilot::api::{
    DepositoryClient, ReqwestTransport, RetryPolicy, RetryableFetchClient, SubmissionClient,
};
use ipo_pilot::core::{logging, Config, HealthChecker};
use ipo_pilot::monitoring::records::{NewSource, SourceKind};
use ipo_pilot::monitoring::{RecordStore, SessionContext, SessionSupervisor, SqliteRecordStore};
use ipo_pilot::operator::Operator;
use ipo_pilot::profiles::ProfileManager;
use ipo_pilot::scanner::{Aggregator, SourceRegistry};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    logging::init_logging(&config.monitoring.log_level)?;

    tracing::info!("🚀 IPO Pilot starting...");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Depository: {}", config.depository.base_url);

    let health_checker = HealthChecker::new();

    // Record store
    let store: Arc<dyn RecordStore> = Arc::new(
        SqliteRecordStore::new(&config.database.path)
            .await
            .with_context(|| format!("Failed to open database at {}", config.database.path))?,
    );
    health_checker.update_component("database", true).await;

    let stale = store.deactivate_all_sessions(chrono::Utc::now()).await?;
    if stale > 0 {
        tracing::warn!("Closed {} session rows left active by a previous run", stale);
    }

    if config.sources.seed_defaults {
        seed_default_sources(store.as_ref(), &config).await?;
    }

    // Clients
    let transport = Arc::new(
        ReqwestTransport::new(
            config.depository.request_timeout(),
            config.depository.user_agent.clone(),
        )
        .context("Failed to build HTTP client")?,
    );
    let fetcher = RetryableFetchClient::new(
        transport.clone(),
        RetryPolicy {
            max_attempts: config.retry.max_attempts,
            backoff_step: config.retry.backoff_step(),
        },
    );
    let depository = DepositoryClient::new(fetcher.clone(), config.depository.base_url.clone());
    let submissions = SubmissionClient::new(transport, config.depository.base_url.clone());

    let reachable = depository.ping().await;
    health_checker
        .update_component("depository_api", reachable)
        .await;
    if reachable {
        tracing::info!("✅ Depository API reachable");
    } else {
        tracing::warn!("⚠️  Depository API not reachable yet; sessions will retry on their own");
    }

    let aggregator = Aggregator::new(
        store.clone(),
        fetcher,
        Arc::new(SourceRegistry::with_defaults()),
    )
    .with_health(health_checker.clone());

    let context = SessionContext {
        store: store.clone(),
        profiles: ProfileManager::new(store.clone()),
        depository: depository.clone(),
        submissions,
        aggregator,
    };
    let supervisor = Arc::new(
        SessionSupervisor::new(context.clone(), config.monitoring.default_interval())
            .with_health(health_checker.clone()),
    );

    if config.monitoring.run_once {
        let operator = Operator::new(context, supervisor);
        for report in operator.run_once(None).await? {
            match report.error {
                Some(e) => tracing::error!("Profile {}: {}", report.profile_id, e),
                None => tracing::info!(
                    "Profile {}: {} submissions",
                    report.profile_id,
                    report.started
                ),
            }
        }
        tracing::info!("👋 IPO Pilot finished single pass");
        return Ok(());
    }

    if config.monitoring.autostart {
        for profile in store.list_profiles().await? {
            if !profile.is_active {
                continue;
            }
            if let Err(e) = supervisor.start(profile.id, None).await {
                tracing::error!("❌ Could not start session for {}: {}", profile.name, e);
            }
        }
    }

    // Start health check endpoint
    let health_clone = health_checker.clone();
    let health_port = config.monitoring.health_port;
    tokio::spawn(async move { start_health_server(health_clone, health_port).await });

    tracing::info!(
        "✅ Health endpoint running on port {}",
        config.monitoring.health_port
    );

    // Keep running until interrupted
    let mut ticker = tokio::time::interval(tokio::time::Duration::from_secs(60));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                health_checker
                    .update_component("depository_api", depository.ping().await)
                    .await;
                let status = health_checker.get_status().await;
                tracing::info!(
                    "Pilot status: {} (uptime: {}s, sessions: {})",
                    status.status,
                    status.uptime_seconds,
                    status.running_sessions
                );
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupt received");
                break;
            }
        }
    }

    supervisor.shutdown().await?;
    tracing::info!("👋 IPO Pilot stopped");

    Ok(())
}

async fn seed_default_sources(store: &dyn RecordStore, config: &Config) -> Result<()> {
    if !store.list_sources().await?.is_empty() {
        return Ok(());
    }

    let defaults = [
        NewSource {
            name: "MeroShare".to_string(),
            kind: SourceKind::NativeDepository,
            base_url: config.depository.base_url.clone(),
            api_key: None,
            is_active: true,
            priority: 10,
            description: Some("Depository applicable-issue list".to_string()),
        },
        NewSource {
            name: "IPO Result".to_string(),
            kind: SourceKind::PublicResultFeed,
            base_url: config.depository.result_feed_url.clone(),
            api_key: None,
            is_active: true,
            priority: 5,
            description: Some("Public open-issue feed".to_string()),
        },
    ];

    for source in defaults {
        let created = store.insert_source(source).await?;
        tracing::info!("➕ Seeded source {} ({})", created.name, created.kind);
    }

    Ok(())
}

async fn start_health_server(health_checker: HealthChecker, port: u16) {
    use warp::Filter;

    let health = warp::path("health")
        .and(warp::any().map(move || health_checker.clone()))
        .and_then(|checker: HealthChecker| async move {
            let status = checker.get_status().await;
            Ok::<_, warp::Rejection>(warp::reply::json(&status))
        });

    warp::serve(health).run(([0, 0, 0, 0], port)).await;
}
