//! Wires the domain core into a runnable process: builds the dependency
//! graph, registers the scheduled jobs named in §6, and serves the axum
//! router.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use chrono::Duration;
use tower_http::trace::TraceLayer;
use tracing::info;

use billforge_core::{
    build_gateway, BillingEngine, Clock, Config, Error, HtmlInvoiceRenderer, InMemoryRepository,
    InvoiceRenderer, LifecycleManager, LoggingNotifier, Notifier, PaymentProcessor, PlanCalculator,
    Repository, SubscriptionLocks, SystemClock, TaskScheduler,
};

use crate::state::AppState;

pub async fn run(config: Config) -> Result<(), Error> {
    let app_state = build_app_state(&config)?;

    let scheduler = Arc::new(TaskScheduler::new(Arc::new(SystemClock) as Arc<dyn Clock>));
    register_jobs(&scheduler, app_state.billing.clone(), &config).await?;
    tokio::spawn(scheduler.clone().driver());

    let app = build_router(app_state);

    let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port)
        .parse()
        .map_err(|e| Error::config(format!("invalid SERVER_HOST/SERVER_PORT: {}", e)))?;

    info!("billforge-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Network(e.to_string()))?;

    axum::serve(listener, app).await.map_err(|e| Error::Network(e.to_string()))?;
    Ok(())
}

fn build_app_state(config: &Config) -> Result<AppState, Error> {
    let repository: Arc<dyn Repository> = Arc::new(InMemoryRepository::new());
    let clock = Arc::new(SystemClock) as Arc<dyn Clock>;
    let gateway = build_gateway(config)?;
    let processor = Arc::new(PaymentProcessor::new(repository.clone(), gateway, clock.clone()));
    let plan_calculator = Arc::new(PlanCalculator::new(repository.clone()));
    let locks = Arc::new(SubscriptionLocks::new());
    let notifier: Arc<dyn Notifier> = Arc::new(LoggingNotifier);
    let invoice_renderer: Arc<dyn InvoiceRenderer> = Arc::new(HtmlInvoiceRenderer);

    let lifecycle = Arc::new(LifecycleManager::new(
        repository.clone(),
        plan_calculator.clone(),
        processor.clone(),
        clock.clone(),
        locks.clone(),
        notifier.clone(),
        config.retry_delay_days.clone(),
    ));
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

    Ok(AppState::new(lifecycle, billing, repository))
}

/// Registers the jobs enumerated in §6: the fixed daily billing tick, an
/// hourly retry sweep, an hourly trial-conversion sweep (trial boundaries
/// fall at arbitrary times of day, unlike the daily billing tick), and the
/// two notify-only daily scans.
async fn register_jobs(scheduler: &Arc<TaskScheduler>, billing: Arc<BillingEngine>, config: &Config) -> Result<(), Error> {
    let max_retries = config.max_payment_retries;

    {
        let billing = billing.clone();
        scheduler
            .schedule_daily(
                Arc::new(move || {
                    let billing = billing.clone();
                    Box::pin(async move {
                        let results = billing.process_recurring_payments().await?;
                        info!(count = results.len(), "daily billing scan complete");
                        Ok(())
                    })
                }),
                config.billing_hour,
                config.billing_minute,
            )
            .await?;
    }

    {
        let billing = billing.clone();
        scheduler
            .schedule_interval(
                Arc::new(move || {
                    let billing = billing.clone();
                    Box::pin(async move {
                        let results = billing.retry_failed_payments(max_retries).await?;
                        info!(count = results.len(), "retry sweep complete");
                        Ok(())
                    })
                }),
                Duration::hours(1),
            )
            .await?;
    }

    {
        let billing = billing.clone();
        scheduler
            .schedule_interval(
                Arc::new(move || {
                    let billing = billing.clone();
                    Box::pin(async move {
                        let results = billing.process_trial_conversions().await?;
                        info!(count = results.len(), "trial conversion sweep complete");
                        Ok(())
                    })
                }),
                Duration::hours(1),
            )
            .await?;
    }

    {
        let billing = billing.clone();
        scheduler
            .schedule_daily(
                Arc::new(move || {
                    let billing = billing.clone();
                    Box::pin(async move {
                        let count = billing.notify_expiring_subscriptions(Duration::days(3)).await?;
                        info!(count, "expiring-subscription notify scan complete");
                        Ok(())
                    })
                }),
                9,
                0,
            )
            .await?;
    }

    {
        scheduler
            .schedule_daily(
                Arc::new(move || {
                    let billing = billing.clone();
                    Box::pin(async move {
                        let count = billing.notify_trials_ending(Duration::days(2)).await?;
                        info!(count, "trial-ending notify scan complete");
                        Ok(())
                    })
                }),
                10,
                0,
            )
            .await?;
    }

    Ok(())
}

fn build_router(app_state: AppState) -> Router {
    crate::routes::router().layer(TraceLayer::new_for_http()).with_state(app_state)
}
