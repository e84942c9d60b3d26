//! Beruang Server
//!
//! Serves the transaction categorizer and the intent router over HTTP, and
//! evaluates the intent model against labelled cases offline.

use anyhow::Result;
use beruang_classifiers::{evaluate, EvaluationCase, EvaluationReport, IntentRouter};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::signal;
use tracing::{info, warn};

use beruang_server::cli::{Cli, Command, EvaluateArgs, ServeArgs};
use beruang_server::config::ServerConfig;
use beruang_server::{create_router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Evaluate(args) => {
            let passed = run_evaluation(args).await?;
            if !passed {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    info!("Starting Beruang server");

    let config = ServerConfig::load(&args.config, &args)?;
    info!("Configuration loaded successfully");
    info!("Transaction model: {:?}", config.transaction_model);
    info!("Intent model: {:?}", config.intent_model);
    info!("Device: {:?}", config.device);

    let metrics_handle = init_metrics()?;

    let addr = config.socket_addr()?;
    let state = AppState::new(config, metrics_handle);
    let app = create_router(state.clone());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);

    // Models load after the listener is up; requests get 503 until ready
    state.spawn_loading();

    let shutdown = async {
        shutdown_signal().await;
        warn!("Shutdown signal received, stopping server...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Run labelled cases through the intent router; true when every case passed
async fn run_evaluation(args: EvaluateArgs) -> Result<bool> {
    let mut config = ServerConfig::from_file_or_default(&args.config)?;
    if let Some(path) = &args.intent_model {
        config.intent_model = beruang_classifiers::ArtifactSource::local(path);
    }

    let cases = EvaluationCase::from_file(&args.cases)?;
    info!("Loaded {} evaluation cases", cases.len());

    let source = config.intent_model.clone();
    let routing = config.routing.clone();
    let device = config.device.to_device_type();
    let router =
        tokio::task::spawn_blocking(move || IntentRouter::load(&source, &routing, device)).await??;

    let report = evaluate(&router, &cases).await;
    print_report(&report);

    if let Some(path) = &args.output {
        std::fs::write(path, report.to_json_pretty()?)?;
        info!("Report written to {}", path.display());
    }

    Ok(report.all_passed())
}

fn print_report(report: &EvaluationReport) {
    println!(
        "{:<6} {:<45} {:<20} {:<20} {:>8}",
        "RESULT", "TEXT", "EXPECTED", "PREDICTED", "CONF"
    );
    for outcome in &report.outcomes {
        println!(
            "{:<6} {:<45} {:<20} {:<20} {:>8}",
            if outcome.passed { "PASS" } else { "FAIL" },
            truncate(&outcome.text, 45),
            outcome.expected,
            outcome.predicted,
            beruang_core::format_percent(outcome.confidence),
        );
    }

    println!();
    println!(
        "Total: {}  Passed: {}  Failed: {}  Pass rate: {:.1}%",
        report.total,
        report.passed,
        report.failed,
        report.pass_rate() * 100.0
    );

    println!();
    println!("By group:");
    for (group, stats) in &report.by_group {
        println!(
            "  {:<24} {}/{} ({:.1}%)",
            group,
            stats.passed,
            stats.total,
            stats.pass_rate() * 100.0
        );
    }

    if !report.all_passed() {
        println!();
        println!("Failures:");
        for outcome in report.failures() {
            println!(
                "  \"{}\": expected {}, got {} (original {}, {})",
                outcome.text,
                outcome.expected,
                outcome.predicted,
                outcome.original,
                if outcome.reasons.is_empty() {
                    "no escalation reasons".to_string()
                } else {
                    outcome.reasons.join("; ")
                }
            );
        }
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(width - 3).collect();
        cut.push_str("...");
        cut
    }
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("beruang=debug,tower_http=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("beruang=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Initialize metrics exporter and return handle for rendering
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    metrics::describe_counter!(
        "beruang_requests_total",
        "Total number of classification requests by route"
    );
    metrics::describe_counter!(
        "beruang_escalations_total",
        "Intent requests escalated to the external advice system"
    );
    metrics::describe_counter!(
        "beruang_fallbacks_total",
        "Transactions assigned the default category pair"
    );
    metrics::describe_histogram!(
        "beruang_routing_latency_us",
        metrics::Unit::Microseconds,
        "Routing latency in microseconds by route"
    );

    info!("Metrics exporter initialized");
    Ok(handle)
}
