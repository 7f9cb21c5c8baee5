//! agent-feed - command-line client
//!
//! Streams a chat turn or follows a research task and prints its timeline.

use std::collections::HashMap;
use std::sync::Arc;

use agent_feed::client::{ChatTransport, TaskTransport};
use agent_feed::stream::TurnState;
use agent_feed::task::Report;
use agent_feed::{
    ChatRequest, Config, FeedClient, Step, StepStatus, StreamCoordinator, TaskHistory, TaskPoller,
    TaskStatus,
};
use anyhow::{bail, Context};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

const USAGE: &str = "usage:
  agent-feed chat <message> [--doc <file>]...
  agent-feed research <topic> [--doc <file>]...
  agent-feed tasks";

enum Command {
    Chat { message: String, docs: Vec<String> },
    Research { topic: String, docs: Vec<String> },
    Tasks,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agent_feed=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let command = parse_args(std::env::args().skip(1).collect())?;

    // Load configuration
    let config = Config::from_env()?;
    info!(base_url = %config.base_url, "Loaded configuration");
    let client = Arc::new(FeedClient::new(&config).context("Failed to build HTTP client")?);

    match command {
        Command::Chat { message, docs } => chat(&config, client, message, docs).await,
        Command::Research { topic, docs } => research(&config, client, topic, docs).await,
        Command::Tasks => list_tasks(&config, client).await,
    }
}

fn parse_args(args: Vec<String>) -> anyhow::Result<Command> {
    let mut args = args.into_iter();
    let Some(sub) = args.next() else {
        bail!("{}", USAGE);
    };

    let mut words = Vec::new();
    let mut docs = Vec::new();
    while let Some(arg) = args.next() {
        if arg == "--doc" {
            match args.next() {
                Some(doc) => docs.push(doc),
                None => bail!("--doc needs a file name\n{}", USAGE),
            }
        } else {
            words.push(arg);
        }
    }
    let text = words.join(" ");

    match sub.as_str() {
        "chat" if !text.is_empty() => Ok(Command::Chat { message: text, docs }),
        "research" if !text.is_empty() => Ok(Command::Research { topic: text, docs }),
        "tasks" => Ok(Command::Tasks),
        _ => bail!("{}", USAGE),
    }
}

async fn chat(
    config: &Config,
    client: Arc<FeedClient>,
    message: String,
    docs: Vec<String>,
) -> anyhow::Result<()> {
    let transport: Arc<dyn ChatTransport> = client;
    let coordinator = StreamCoordinator::new(transport).with_fallback(config.fallback_enabled);
    let request = ChatRequest::new(message)
        .with_session(Uuid::new_v4().to_string())
        .with_documents(docs);

    let mut handle = coordinator.run(request);
    let cancel = handle.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling stream");
            cancel.cancel();
        }
    });

    let mut seen: HashMap<String, StepStatus> = HashMap::new();
    let mut state = TurnState::Idle;
    while let Some(update) = handle.next_update().await {
        if update.state != state {
            state = update.state;
            info!(state = ?state, "Turn state changed");
        }
        print_step_changes(update.timeline.steps(), &mut seen);
    }

    let outcome = handle.join().await;
    match outcome.state {
        TurnState::Completed => {
            println!("\n{}", outcome.timeline.answer());
            for source in outcome.timeline.sources() {
                match &source.page_label {
                    Some(page) => println!("  [{} p.{}]", source.file_name, page),
                    None => println!("  [{}]", source.file_name),
                }
            }
            Ok(())
        }
        TurnState::Cancelled => {
            println!("(cancelled)");
            Ok(())
        }
        _ => bail!(
            "{}",
            outcome.error.unwrap_or_else(|| "chat failed".to_string())
        ),
    }
}

async fn research(
    config: &Config,
    client: Arc<FeedClient>,
    topic: String,
    docs: Vec<String>,
) -> anyhow::Result<()> {
    let transport: Arc<dyn TaskTransport> = client;
    let poller = TaskPoller::new(transport, TaskHistory::new(), config.poll_interval);
    let (done_tx, done_rx) = tokio::sync::oneshot::channel();

    let handle = poller
        .create(&topic, docs, move |task| {
            let _ = done_tx.send(task);
        })
        .await
        .context("Failed to create research task")?;
    println!("task {}", handle.task_id());

    let mut updates = handle.updates();
    let mut seen: HashMap<String, StepStatus> = HashMap::new();
    let mut done_rx = done_rx;
    let mut last_progress = 0;
    let task = loop {
        tokio::select! {
            biased;
            finished = &mut done_rx => {
                break finished.context("poller stopped without a result")?;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    bail!("poller stopped");
                }
                let task = updates.borrow_and_update().clone();
                if task.progress != last_progress {
                    last_progress = task.progress;
                    println!("progress {:>3}%", task.progress);
                }
                print_step_changes(&task.steps, &mut seen);
            }
            _ = tokio::signal::ctrl_c() => {
                handle.cancel();
                println!("(cancelled)");
                return Ok(());
            }
        }
    };

    print_step_changes(&task.steps, &mut seen);
    match (task.status, task.report) {
        (TaskStatus::Completed, Some(report)) => {
            print_report(&report);
            Ok(())
        }
        (TaskStatus::Completed, None) => {
            println!("task completed without a report");
            Ok(())
        }
        _ => bail!(
            "research failed: {}",
            task.error.unwrap_or_else(|| "unknown error".to_string())
        ),
    }
}

async fn list_tasks(config: &Config, client: Arc<FeedClient>) -> anyhow::Result<()> {
    let transport: Arc<dyn TaskTransport> = client;
    let poller = TaskPoller::new(transport, TaskHistory::new(), config.poll_interval);
    let tasks = poller
        .refresh_history()
        .await
        .context("Failed to list tasks")?;

    if tasks.is_empty() {
        println!("no tasks");
    }
    for task in tasks {
        println!(
            "{:<28} {:<10} {:>3}%  {}",
            task.task_id,
            format!("{:?}", task.status).to_lowercase(),
            task.progress,
            task.topic
        );
    }
    Ok(())
}

fn print_step_changes(steps: &[Step], seen: &mut HashMap<String, StepStatus>) {
    for step in steps {
        if seen.get(&step.id) == Some(&step.status) {
            continue;
        }
        seen.insert(step.id.clone(), step.status);
        let marker = match step.status {
            StepStatus::Pending => "·",
            StepStatus::Running => "…",
            StepStatus::Completed => "✓",
            StepStatus::Error => "✗",
        };
        let mut line = format!("{} {}", marker, step.title);
        if !step.summary.is_empty() {
            line.push_str(&format!(": {}", step.summary));
        }
        if let Some(count) = step.results_count {
            line.push_str(&format!(" ({} results)", count));
        }
        println!("{}", line);
    }
}

fn print_report(report: &Report) {
    println!("\n{}\n", report.title);
    println!("{}", report.content);
    if !report.sources.is_empty() {
        println!("\nsources:");
        for source in &report.sources {
            println!("  {}", source.file_name);
        }
    }
}
