//! billforge-core: subscription billing and lifecycle engine.
//!
//! This crate is the domain core — value objects, persistence contract,
//! payment gateway abstraction, lifecycle state machine, billing engine, and
//! task scheduler. The HTTP surface lives in `billforge-api`; this crate has
//! no transport or framework dependency of its own.

pub mod billing;
pub mod clock;
pub mod config;
pub mod error;
pub mod invoice;
pub mod lifecycle;
pub mod lock;
pub mod models;
pub mod money;
pub mod notification;
pub mod payment;
pub mod plan_calculator;
pub mod processor;
pub mod repository;
pub mod retry;
pub mod scheduler;

pub use billing::{BillingEngine, BillingResult};
pub use clock::{Clock, FakeClock, SystemClock};
pub use config::Config;
pub use error::{Error, Result};
pub use invoice::{HtmlInvoiceRenderer, InvoiceRenderer};
pub use lifecycle::{CreateOutcome, LifecycleManager};
pub use lock::SubscriptionLocks;
pub use money::{Currency, Money, TimePeriod, TimeUnit};
pub use notification::{LoggingNotifier, NotificationEvent, Notifier};
pub use payment::{build_gateway, MockGateway, PaymentGateway, RealGateway};
pub use plan_calculator::PlanCalculator;
pub use processor::PaymentProcessor;
pub use repository::{InMemoryRepository, Repository};
pub use scheduler::{TaskScheduler, TaskStatus};
