//! agentrun CLI - serve a coordinator with in-process workers, or run one goal.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use agentrun_coordinator::{http, spawn_reaper, Config as CoordinatorConfig, Coordinator, MemoryTaskQueue, SubmitOptions};
use agentrun_core::{RunId, TaskResult, WorkerId};
use agentrun_worker::{
    AgentEngine, CapabilityRegistry, Config as WorkerConfig, EchoCapability, HumanInput,
    HumanInputError, MemoryEventStore, PhasePlanner, Worker, WorkerError,
};

/// agentrun - agent run orchestrator
#[derive(Parser)]
#[command(name = "agentrun")]
#[command(about = "Coordinate workers that drive agent runs to completion", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the coordinator, its HTTP API and in-process workers
    Serve(ServeArgs),

    /// Execute a single goal and print its result as JSON
    Run(RunArgs),
}

#[derive(Args)]
struct ServeArgs {
    /// HTTP bind address
    #[arg(long, default_value = "127.0.0.1:50052")]
    http_addr: String,

    /// Number of in-process workers
    #[arg(long, default_value_t = 1)]
    workers: usize,

    /// Processing loops per worker
    #[arg(long, default_value_t = 4)]
    concurrency: usize,

    /// Seconds without a heartbeat before a worker is considered dead
    #[arg(long, default_value_t = 45)]
    worker_timeout_secs: u64,

    /// Seconds between liveness checks
    #[arg(long, default_value_t = 15)]
    reap_interval_secs: u64,

    /// Default task timeout in seconds
    #[arg(long, default_value_t = 300)]
    task_timeout_secs: u64,

    /// Default retry budget per task
    #[arg(long, default_value_t = 3)]
    max_retry: u32,

    /// Planning steps allowed per run
    #[arg(long, default_value_t = 32)]
    max_steps: u32,
}

#[derive(Args)]
struct RunArgs {
    /// Goal to execute
    goal: String,

    /// Task timeout in seconds
    #[arg(long, default_value_t = 300)]
    timeout_secs: u64,

    /// Retry budget
    #[arg(long, default_value_t = 0)]
    max_retry: u32,

    /// Planning steps allowed for the run
    #[arg(long, default_value_t = 32)]
    max_steps: u32,

    /// Confirm each capability call on stdin before it runs
    #[arg(short, long)]
    interactive: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("agentrun=info,tower_http=info")),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => serve(args).await,
        Commands::Run(args) => run(args).await,
    }
}

async fn serve(args: ServeArgs) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let config = CoordinatorConfig {
        http_bind_addr: args.http_addr,
        default_max_retry: args.max_retry,
        default_timeout: Duration::from_secs(args.task_timeout_secs),
        worker_timeout: Duration::from_secs(args.worker_timeout_secs),
        reap_interval: Duration::from_secs(args.reap_interval_secs),
        ..CoordinatorConfig::default()
    };
    let queue = Arc::new(MemoryTaskQueue::with_dead_letter_limit(
        config.queue_capacity,
        config.dead_letter_limit,
    ));
    let coordinator = Arc::new(Coordinator::new(config, queue.clone()));
    let reaper = spawn_reaper(coordinator.clone());
    let events = Arc::new(MemoryEventStore::default());

    let mut workers: Vec<JoinHandle<Result<(), WorkerError>>> = Vec::with_capacity(args.workers);
    for _ in 0..args.workers {
        let engine = AgentEngine::new(Arc::new(PhasePlanner::new()), default_capabilities())
            .with_event_store(events.clone())
            .with_max_steps(args.max_steps);
        let worker_config = WorkerConfig {
            concurrency: args.concurrency,
            ..WorkerConfig::default()
        };
        let worker = Worker::new(worker_config, coordinator.clone(), queue.clone(), Arc::new(engine))
            .with_cancellation(&coordinator.shutdown_token());
        workers.push(tokio::spawn(async move { worker.start().await }));
    }

    let http_listener = TcpListener::bind(&coordinator.config().http_bind_addr).await?;
    info!(
        http_addr = %coordinator.config().http_bind_addr,
        workers = args.workers,
        concurrency = args.concurrency,
        "Starting agentrun coordinator"
    );

    let shutdown = coordinator.shutdown_token();
    let http_server = axum::serve(http_listener, http::create_router(coordinator.clone()))
        .with_graceful_shutdown(async move { shutdown.cancelled().await });

    let server_handle = tokio::spawn(async move { http_server.await });

    let select_shutdown = coordinator.shutdown_token();
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown signal received");
        }
        _ = select_shutdown.cancelled() => {}
    }

    coordinator.close();

    for handle in workers {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Worker exited with error"),
            Err(e) => error!(error = %e, "Worker task panicked"),
        }
    }
    match server_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "HTTP server error"),
        Err(e) => error!(error = %e, "HTTP server task panicked"),
    }
    if let Err(e) = reaper.await {
        error!(error = %e, "Reaper task panicked");
    }

    info!("agentrun coordinator stopped");
    Ok(ExitCode::SUCCESS)
}

async fn run(args: RunArgs) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let queue = Arc::new(MemoryTaskQueue::new(1));
    let coordinator = Arc::new(Coordinator::new(CoordinatorConfig::default(), queue.clone()));

    let engine = if args.interactive {
        AgentEngine::new(Arc::new(PhasePlanner::new().with_confirmation()), default_capabilities())
            .with_human_input(Arc::new(StdinHumanInput::default()))
    } else {
        AgentEngine::new(Arc::new(PhasePlanner::new()), default_capabilities())
    }
    .with_max_steps(args.max_steps);

    let worker_config = WorkerConfig {
        worker_id: WorkerId::new("local"),
        concurrency: 1,
        ..WorkerConfig::default()
    };
    let worker = Arc::new(
        Worker::new(worker_config, coordinator.clone(), queue.clone(), Arc::new(engine))
            .with_cancellation(&coordinator.shutdown_token()),
    );
    let worker_handle = {
        let worker = worker.clone();
        tokio::spawn(async move { worker.start().await })
    };

    let mut results = coordinator.subscribe_results();
    let task = coordinator
        .submit(
            args.goal,
            SubmitOptions::new()
                .with_timeout(Duration::from_secs(args.timeout_secs))
                .with_max_retry(args.max_retry),
        )
        .await?;

    let result = tokio::select! {
        result = wait_for_result(&mut results, &task.id) => result,
        _ = tokio::signal::ctrl_c() => None,
    };

    coordinator.close();
    match worker_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Worker exited with error"),
        Err(e) => error!(error = %e, "Worker task panicked"),
    }

    let Some(result) = result else {
        warn!(task_id = %task.id, "Interrupted before the run finished");
        return Ok(ExitCode::from(130));
    };

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(if result.is_failed() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

async fn wait_for_result(
    results: &mut tokio::sync::broadcast::Receiver<TaskResult>,
    task_id: &agentrun_core::TaskId,
) -> Option<TaskResult> {
    loop {
        match results.recv().await {
            Ok(result) if &result.task_id == task_id => return Some(result),
            Ok(_) => continue,
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Result subscriber lagged");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => return None,
        }
    }
}

fn default_capabilities() -> CapabilityRegistry {
    CapabilityRegistry::new().with(Arc::new(EchoCapability))
}

/// Prompts on stderr and reads one line per question from stdin.
#[derive(Default)]
struct StdinHumanInput {
    lines: Mutex<Option<tokio::io::Lines<BufReader<tokio::io::Stdin>>>>,
}

#[async_trait]
impl HumanInput for StdinHumanInput {
    fn responder(&self) -> &str {
        "stdin"
    }

    async fn ask(
        &self,
        run_id: &RunId,
        question: &str,
        options: &[String],
    ) -> Result<String, HumanInputError> {
        let mut prompt = format!("[{}] {}", run_id, question);
        if !options.is_empty() {
            prompt.push_str(&format!(" ({})", options.join("/")));
        }
        prompt.push_str("\n> ");

        let mut stderr = tokio::io::stderr();
        stderr
            .write_all(prompt.as_bytes())
            .await
            .map_err(|e| HumanInputError::Unavailable(e.to_string()))?;
        stderr
            .flush()
            .await
            .map_err(|e| HumanInputError::Unavailable(e.to_string()))?;

        let mut guard = self.lines.lock().await;
        let lines = guard.get_or_insert_with(|| BufReader::new(tokio::io::stdin()).lines());
        match lines.next_line().await {
            Ok(Some(line)) => Ok(line.trim().to_string()),
            Ok(None) => Err(HumanInputError::Unavailable("stdin closed".into())),
            Err(e) => Err(HumanInputError::Unavailable(e.to_string())),
        }
    }
}
