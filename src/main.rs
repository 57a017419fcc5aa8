//! cmt-sim - runs one intercepted invocation against the in-process transaction manager

use anyhow::{Context, Result};
use clap::{Parser as ClapParser, ValueEnum};
use cmt_interceptor::component::{ComponentKind, InterfaceKind, SimpleComponent, TransactionAttribute};
use cmt_interceptor::config::InterceptorConfig;
use cmt_interceptor::error::{Fault, InvocationError};
use cmt_interceptor::interceptor::{CmtInterceptor, TimerInterceptor};
use cmt_interceptor::invocation::{Interceptor, InterceptorChain, Invocation, InvocationContext};
use cmt_interceptor::transaction::{LocalTransactionManager, TransactionManager};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// What the simulated business method does.
#[derive(ValueEnum, Clone, Copy, Debug)]
enum Outcome {
    /// Return normally
    Ok,
    /// Raise an application exception that keeps the transaction
    App,
    /// Raise an application exception that dooms the transaction
    AppRollback,
    /// Raise an undeclared checked fault
    Checked,
    /// Raise an unchecked fault
    Runtime,
    /// Raise a fatal fault
    Fatal,
    /// Report a retryable deadlock
    Deadlock,
    /// Report that the target instance is gone
    NoSuchInstance,
}

/// cmt-sim - container-managed transaction interceptor simulator
#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Transaction attribute of the invoked method
    #[arg(short, long, default_value = "required", value_parser = parse_attribute)]
    attribute: TransactionAttribute,

    /// Begin a caller transaction before invoking
    #[arg(long)]
    ambient: bool,

    /// Behaviour of the business method
    #[arg(short, long, value_enum, default_value = "ok")]
    outcome: Outcome,

    /// Invoke as a timer callback (always REQUIRES_NEW)
    #[arg(short, long)]
    timer: bool,

    /// Interceptor configuration file (JSON); flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bound on begin/invoke/end cycles when deadlocks are retried
    #[arg(short, long)]
    max_attempts: Option<u32>,

    /// Seed for the retry backoff
    #[arg(short, long)]
    seed: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn parse_attribute(s: &str) -> std::result::Result<TransactionAttribute, String> {
    s.parse()
}

fn business(outcome: Outcome) -> std::result::Result<u32, InvocationError> {
    match outcome {
        Outcome::Ok => Ok(42),
        Outcome::App => Err(Fault::checked("InsufficientFunds", "balance too low").into()),
        Outcome::AppRollback => Err(Fault::unchecked("OptimisticConflict", "stale version").into()),
        Outcome::Checked => Err(Fault::checked("ValidationFailed", "bad input").into()),
        Outcome::Runtime => Err(Fault::unchecked("IllegalState", "ledger closed").into()),
        Outcome::Fatal => Err(Fault::fatal("OutOfMemory", "heap exhausted").into()),
        Outcome::Deadlock => Err(InvocationError::deadlock("row lock cycle on accounts")),
        Outcome::NoSuchInstance => Err(InvocationError::NoSuchInstance("account-1".to_string())),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            InterceptorConfig::from_json(&text)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        }
        None => InterceptorConfig::default(),
    };
    if let Some(attempts) = args.max_attempts {
        config = config.with_max_attempts(attempts);
    }
    if let Some(seed) = args.seed {
        config = config.with_backoff_seed(seed);
    }

    let tm = Arc::new(LocalTransactionManager::new());
    let component = Arc::new(
        SimpleComponent::builder("AccountBean", ComponentKind::Stateless, tm.clone())
            .default_attribute(args.attribute)
            .application_exception("InsufficientFunds", false)
            .application_exception("OptimisticConflict", true)
            .build(),
    );

    let interceptor: Arc<dyn Interceptor<u32>> = if args.timer {
        Arc::new(TimerInterceptor::new(config))
    } else {
        Arc::new(CmtInterceptor::new(config))
    };
    let chain = InterceptorChain::<u32>::new().with(interceptor);

    if args.ambient {
        tm.begin().context("Failed to begin caller transaction")?;
        let caller = tm
            .transaction()
            .context("Failed to read caller transaction")?
            .map(|tx| tx.id());
        println!("caller transaction: {:?}", caller);
    }

    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let outcome = args.outcome;
    let interface = if args.timer {
        InterfaceKind::Timer
    } else {
        InterfaceKind::Remote
    };
    let result = chain.invoke(
        InvocationContext::new("withdraw", interface).with_component(component),
        &move |_: &Invocation<'_, u32>| {
            counter.fetch_add(1, Ordering::SeqCst);
            business(outcome)
        },
    );

    println!("attribute: {}", args.attribute);
    println!("business method calls: {}", calls.load(Ordering::SeqCst));
    match &result {
        Ok(value) => println!("result: ok ({})", value),
        Err(e) => {
            println!("result: error: {}", e);
            let mut cause = e.cause();
            while let Some(inner) = cause {
                println!("  caused by: {}", inner);
                cause = inner.cause();
            }
        }
    }

    if args.ambient {
        println!("caller transaction status: {}", tm.status().context("Failed to read status")?);
        tm.rollback().context("Failed to end caller transaction")?;
    }

    println!("transactions: {}", tm.stats());
    Ok(())
}
