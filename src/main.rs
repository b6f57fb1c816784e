use anyhow::Context;
use clap::Parser;
use mediastack_setup::config::cli::{CliArgs, Command};
use mediastack_setup::utils::{logger, validation::Validate};
use mediastack_setup::{HealthGate, LedgerSummary, LocalStorage, SetupOrchestrator, StackConfig};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    // 初始化日誌
    if args.json_logs {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(args.verbose);
    }

    tracing::info!("📁 Loading stack configuration from: {}", args.config);
    let config = StackConfig::from_file(&args.config)
        .with_context(|| format!("failed to load stack config '{}'", args.config))?;

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        eprintln!("❌ {}", e);
        eprintln!("💡 {}", e.recovery_suggestion());
        std::process::exit(2);
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("🛑 Interrupt received, stopping at the next wait boundary");
            on_signal.cancel();
        }
    });

    match args.command() {
        Command::Run {
            allow_partial,
            json,
        } => {
            let orchestrator = SetupOrchestrator::new(config, LocalStorage::new(&args.root));
            let outcomes = orchestrator.run(&cancel).await;
            let summary = LedgerSummary::from_outcomes(&outcomes);

            if json {
                println!("{}", serde_json::to_string_pretty(&outcomes)?);
            } else {
                for outcome in &outcomes {
                    println!("{}", outcome);
                }
                println!("📊 {}", summary);
            }

            let passed = if allow_partial {
                summary.succeeded > 0
            } else {
                summary.failed == 0
            };
            if !passed || cancel.is_cancelled() {
                std::process::exit(1);
            }
        }
        Command::Probe { services } => {
            let services = if services.is_empty() {
                config.enabled_services()
            } else {
                services
            };
            let gate = HealthGate::with_timeout(
                &config.stack.host,
                config.probe_endpoints(),
                config.health.probe_timeout(),
            )
            .context("failed to build health probe client")?;

            let results = gate.probe_all(&services).await;
            for health in &results {
                let marker = if health.healthy { "💚" } else { "💔" };
                match &health.error {
                    None => println!(
                        "{} {:<14} HTTP {} ({:?})",
                        marker, health.name, health.status_code, health.latency
                    ),
                    Some(error) => println!("{} {:<14} {}", marker, health.name, error),
                }
            }

            if results.iter().any(|h| !h.healthy) {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
