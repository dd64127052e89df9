use clap::{Parser, Subcommand};
use tracing::info;

use billforge_core::Config;

#[derive(Parser)]
#[command(name = "billforge")]
#[command(about = "Subscription billing and lifecycle engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a TOML config file; falls back to environment variables.
    #[arg(short, long, global = true, env = "BILLFORGE_CONFIG")]
    config: Option<String>,

    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server and the scheduled billing jobs.
    Serve {
        #[arg(short = 'H', long)]
        host: Option<String>,

        #[arg(short = 'P', long)]
        port: Option<u16>,
    },

    /// Print the resolved configuration and exit.
    Config,

    /// Run a single pass of each scheduled job against a fresh in-memory
    /// store, seeded with one demo plan/user/subscription, and print the
    /// results. Useful for exercising the billing engine without standing
    /// up the HTTP server.
    Demo,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_env_filter(cli.log_level.clone()).init();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::from_env()?,
    };

    match cli.command {
        Commands::Serve { host, port } => {
            let mut config = config;
            if let Some(host) = host {
                config.server_host = host;
            }
            if let Some(port) = port {
                config.server_port = port;
            }
            info!(host = %config.server_host, port = config.server_port, "starting billforge-api");
            billforge_api::run(config).await?;
        }
        Commands::Config => {
            println!(
                "Configuration loaded from: {}",
                cli.config.unwrap_or_else(|| "environment".to_string())
            );
            println!("{:#?}", config);
        }
        Commands::Demo => {
            demo::run(config).await?;
        }
    }

    Ok(())
}

mod demo {
    use std::sync::Arc;

    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use billforge_core::models::{PaymentMethod, Plan, User, UserRole};
    use billforge_core::{
        build_gateway, BillingEngine, Clock, Config, Currency, HtmlInvoiceRenderer,
        InMemoryRepository, InvoiceRenderer, LifecycleManager, LoggingNotifier, Money, Notifier,
        PaymentProcessor, PlanCalculator, Repository, SubscriptionLocks, SystemClock,
    };

    pub async fn run(config: Config) -> anyhow::Result<()> {
        let repository: Arc<dyn Repository> = Arc::new(InMemoryRepository::new());
        let clock = Arc::new(SystemClock) as Arc<dyn Clock>;
        let gateway = build_gateway(&config)?;
        let processor = Arc::new(PaymentProcessor::new(repository.clone(), gateway, clock.clone()));
        let plan_calculator = Arc::new(PlanCalculator::new(repository.clone()));
        let locks = Arc::new(SubscriptionLocks::new());
        let notifier: Arc<dyn Notifier> = Arc::new(LoggingNotifier);
        let invoice_renderer: Arc<dyn InvoiceRenderer> = Arc::new(HtmlInvoiceRenderer);

        let lifecycle = LifecycleManager::new(
            repository.clone(),
            plan_calculator.clone(),
            processor.clone(),
            clock.clone(),
            locks.clone(),
            notifier.clone(),
            config.retry_delay_days.clone(),
        );
        let billing = Arc::new(BillingEngine::new(
            repository.clone(),
            plan_calculator,
            processor,
            clock,
            locks,
            notifier,
            invoice_renderer,
            config.scheduler_max_workers,
            config.retry_delay_days.clone(),
        ));

        let user_id = Uuid::new_v4();
        repository
            .put_user(User {
                id: user_id,
                email: "demo@example.com".into(),
                role: UserRole::User,
                balance: dec!(0),
                balance_currency: Currency::Usd,
                active: true,
                created_at: Utc::now(),
            })
            .await?;

        let payment_method_id = Uuid::new_v4();
        repository
            .put_payment_method(PaymentMethod {
                id: payment_method_id,
                user_id,
                gateway: "mock".into(),
                external_id: "demo_pm".into(),
                valid: true,
                expires_at: None,
                created_at: Utc::now(),
            })
            .await?;

        let plan_id = Uuid::new_v4();
        repository
            .put_plan(Plan {
                id: plan_id,
                name: "demo-monthly".into(),
                price: Money::new(dec!(999), Currency::Usd),
                billing_cycle_days: 30,
                trial_period_days: 0,
                max_retries: config.max_payment_retries,
                active: true,
            })
            .await?;

        let outcome = lifecycle.create(user_id, plan_id, payment_method_id, None).await?;
        println!("created subscription {} (status active)", outcome.subscription_id);

        let results = billing.process_recurring_payments().await?;
        println!("ran one billing pass: {} subscription(s) due, {} succeeded", results.len(), results.iter().filter(|r| r.success).count());

        Ok(())
    }
}
