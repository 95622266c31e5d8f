use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use serde_json::{Value, json};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cadence_core::{
    DefinitionId, EventKind, HandlerError, HandlerRef, Priority, Schedule, SchedulerConfig,
    SchedulerEvent, TaskContext, TaskDefinition, TaskHandler, TaskScheduler, handler_fn,
};

#[derive(Debug, Parser)]
#[command(name = "cadence", about = "Run a demo task scheduler")]
struct Args {
    /// TOML scheduler config; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seconds to run before stopping (Ctrl-C stops early).
    #[arg(long, default_value_t = 10)]
    run_for: u64,

    #[arg(long)]
    json_logs: bool,
}

/// Greets whoever the metadata names, after failing a few times on purpose.
struct HelloHandler {
    remaining_failures: AtomicU32,
}

impl HelloHandler {
    fn new(n: u32) -> Self {
        Self {
            remaining_failures: AtomicU32::new(n),
        }
    }
}

#[async_trait]
impl TaskHandler for HelloHandler {
    async fn handle(&self, ctx: TaskContext) -> Result<Value, HandlerError> {
        let name = ctx
            .metadata
            .as_ref()
            .and_then(|metadata| metadata.get("name"))
            .and_then(Value::as_str)
            .ok_or_else(|| HandlerError::new("metadata.name missing"))?;

        let left = self.remaining_failures.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(HandlerError::new(format!("intentional failure (left={left})")));
        }

        info!(attempt = ctx.attempt, "Hello, {name}!");
        Ok(json!({ "greeted": name }))
    }
}

struct ReportHandler {
    runs: AtomicU64,
}

#[async_trait]
impl TaskHandler for ReportHandler {
    async fn handle(&self, ctx: TaskContext) -> Result<Value, HandlerError> {
        let run = self.runs.fetch_add(1, Ordering::Relaxed) + 1;
        info!(instance = %ctx.instance_id, run, "report generated");
        Ok(json!({ "run": run }))
    }
}

fn init_tracing(json_logs: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    // (A) config and scheduler; "report" must be registered before build
    let config = match &args.config {
        Some(path) => SchedulerConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => SchedulerConfig::default(),
    };
    let scheduler = TaskScheduler::builder()
        .config(config)
        .handler(
            "report",
            ReportHandler {
                runs: AtomicU64::new(0),
            },
        )
        .expect_handlers(&["report"])
        .build()
        .context("building scheduler")?;

    // (B) definitions: a heartbeat interval, a flaky greeting, a cron report
    let beats = Arc::new(AtomicU64::new(0));
    let heartbeat = {
        let beats = Arc::clone(&beats);
        handler_fn(move |_ctx| {
            let beats = Arc::clone(&beats);
            async move {
                let beat = beats.fetch_add(1, Ordering::Relaxed) + 1;
                Ok::<_, HandlerError>(json!({ "beat": beat }))
            }
        })
    };
    scheduler.register(
        TaskDefinition::new(
            "heartbeat",
            "Heartbeat",
            Schedule::interval(Duration::from_secs(1)),
            HandlerRef::direct(heartbeat),
        )
        .with_priority(Priority::Low),
    )?;

    let hello = DefinitionId::from("hello");
    scheduler.register(
        TaskDefinition::new(
            hello.clone(),
            "Hello",
            Schedule::once(Duration::ZERO),
            HandlerRef::direct(HelloHandler::new(2)),
        )
        .with_priority(Priority::High)
        .with_retries(3)
        .with_retry_delay(Duration::from_millis(200))
        .disabled(),
    )?;

    scheduler.register(TaskDefinition::new(
        "report",
        "Report",
        Schedule::cron("*/2 * * * * *", "UTC"),
        HandlerRef::named("report"),
    ))?;

    // (C) surface retries and failures
    scheduler.on(EventKind::Retrying, |event| {
        if let SchedulerEvent::Retrying {
            instance,
            attempt,
            delay,
            error,
        } = event
        {
            warn!(
                definition = %instance.definition_id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                %error,
                "retrying"
            );
        }
    });
    scheduler.on(EventKind::Failed, |event| {
        if let SchedulerEvent::Failed {
            instance, error, ..
        } = event
        {
            warn!(definition = %instance.definition_id, %error, "task failed");
        }
    });

    // (D) run
    let config = scheduler.config();
    info!(
        max_concurrent = config.max_concurrent,
        max_queue_size = config.max_queue_size,
        run_for_secs = args.run_for,
        "starting scheduler"
    );
    scheduler.start();
    scheduler.schedule_after(
        &hello,
        Duration::from_millis(500),
        Some(json!({ "name": "cadence" })),
    )?;

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(args.run_for)) => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("waiting for ctrl-c")?;
            info!("interrupted");
        }
    }

    // (E) stop and report
    scheduler.stop();
    let removed = scheduler.cleanup(None);
    info!(removed, beats = beats.load(Ordering::Relaxed), "shutting down");
    println!("{}", serde_json::to_string_pretty(&scheduler.stats())?);
    Ok(())
}
