//! Warden Daemon - AI-assisted resource monitoring and healing.
//!
//! `check` diagnoses and alerts without touching resources; `heal` also
//! restarts stopped resources with bounded retries. Both support
//! `--continuous` for interval monitoring until interrupted.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;
use warden_common::{
    Alert, AlertPolicy, DecisionEngine, OllamaEngine, Severity, WardenConfig, CONFIG_PATH,
};
use wardend::adapter::{HttpResourceAdapter, ResourceAdapter};
use wardend::diagnosis::DiagnosisAgent;
use wardend::escalation::{CycleMode, EscalationEngine};
use wardend::healer::Healer;
use wardend::health::HealthAggregator;
use wardend::incident::{IncidentAction, IncidentResponder};
use wardend::notifier::{EmailNotifier, Notifier};
use wardend::orchestrator::Orchestrator;

#[derive(Parser)]
#[command(name = "wardend")]
#[command(about = "Warden - AI-assisted resource monitoring and healing", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value = CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Health check with AI diagnosis; alerts only, no healing
    Check {
        /// Repeat on the configured interval until interrupted
        #[arg(long)]
        continuous: bool,
    },

    /// Diagnose and auto-heal stopped resources
    Heal {
        /// Repeat on the configured interval until interrupted
        #[arg(long)]
        continuous: bool,
    },

    /// Describe an incident and let the engine choose a healing action
    Respond {
        /// Natural-language incident description, e.g. "prod-db-01 is down"
        description: String,
    },

    /// Send one test alert to verify SMTP settings
    TestAlert {
        /// Send to this address instead of the configured recipient
        #[arg(long)]
        to: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    info!("wardend v{} starting", env!("CARGO_PKG_VERSION"));

    let config = WardenConfig::load(&cli.config)?;

    match cli.command {
        Commands::Check { continuous } => run(config, CycleMode::Check, continuous).await,
        Commands::Heal { continuous } => run(config, CycleMode::Heal, continuous).await,
        Commands::Respond { description } => respond(config, &description).await,
        Commands::TestAlert { to } => test_alert(config, to.as_deref()).await,
    }
}

async fn run(config: WardenConfig, mode: CycleMode, continuous: bool) -> Result<()> {
    let adapter: Arc<dyn ResourceAdapter> =
        Arc::new(HttpResourceAdapter::new(&config.inventory.endpoint)?);

    let diagnosis = if config.llm.enabled {
        let engine: Arc<dyn DecisionEngine> = Arc::new(OllamaEngine::new(config.llm.clone())?);
        Some(Arc::new(DiagnosisAgent::new(
            engine,
            adapter.clone(),
            &config.monitor.managed_label,
            config.llm.max_iterations,
        )))
    } else {
        info!("decision engine disabled, running without diagnosis");
        None
    };

    let healer = Arc::new(Healer::new(adapter.clone(), &config.monitor));
    let aggregator = Arc::new(HealthAggregator::new(
        adapter,
        &config.monitor.managed_label,
    ));
    let notifier = Arc::new(EmailNotifier::new(config.email.clone()));

    // ctrl-c finishes the current cycle, then stops the loop.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested, finishing current cycle");
            let _ = shutdown_tx.send(true);
        }
    });

    let escalation = EscalationEngine::new(
        healer,
        notifier,
        diagnosis.clone(),
        config.alerts.clone(),
        config.monitor.clone(),
    )
    .with_cancel(shutdown_rx.clone());

    let orchestrator = Orchestrator::new(
        aggregator,
        escalation,
        diagnosis,
        Duration::from_secs(config.monitor.interval_secs),
        shutdown_rx,
    );

    if continuous {
        orchestrator.run_continuous(mode).await;
    } else {
        let outcome = orchestrator.run_once(mode).await?;
        info!(
            stopped = outcome.snapshot.stopped,
            healed = outcome.healed(),
            "run complete"
        );
    }
    Ok(())
}

async fn respond(config: WardenConfig, description: &str) -> Result<()> {
    anyhow::ensure!(
        config.llm.enabled,
        "the decision engine is disabled in configuration"
    );

    let adapter: Arc<dyn ResourceAdapter> =
        Arc::new(HttpResourceAdapter::new(&config.inventory.endpoint)?);
    let engine: Arc<dyn DecisionEngine> = Arc::new(OllamaEngine::new(config.llm.clone())?);
    let healer = Arc::new(Healer::new(adapter.clone(), &config.monitor));
    let aggregator = Arc::new(HealthAggregator::new(
        adapter,
        &config.monitor.managed_label,
    ));

    let responder = IncidentResponder::new(engine, healer, aggregator);
    match responder.respond(description).await? {
        IncidentAction::Executed { tool, result } => {
            info!(%tool, %result, "engine-chosen action executed");
        }
        IncidentAction::NoAction { reasoning } => {
            info!(%reasoning, "engine took no action");
        }
    }
    Ok(())
}

async fn test_alert(config: WardenConfig, to: Option<&str>) -> Result<()> {
    // Info alerts are record-only by default; a test alert exists to prove
    // delivery, so force transmission.
    let policy = AlertPolicy {
        notify_info: true,
        ..config.alerts.clone()
    };
    let alert = Alert::new(
        &policy,
        Severity::Info,
        "Warden test alert",
        "This is a test alert from warden.\n\n\
         If you received this email, your alert configuration is working correctly.\n\
         Resource monitoring and auto-healing is active.\n",
        "test-alert",
    );

    let notifier = EmailNotifier::new(config.email);
    notifier.send_to(&alert, to).await?;
    info!("test alert sent");
    Ok(())
}
