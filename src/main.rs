use anyhow::{Context, Result};
use futures::StreamExt;
use matist::cli::{
    Args, ChatConfig, CompileConfig, ConfigDiscovery, ExecutionMode, ProcessConfig,
    RuntimeOptions,
};
use matist::pipeline::{EventStatus, PracticalBundle};
use matist::{ChatMessage, MatistSystem};
use std::io::{self, Write};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mode = match args.mode() {
        Ok(mode) => mode,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };

    init_logging(verbose(&mode));
    info!("Starting MATist");

    match mode {
        ExecutionMode::Process(config) => run_process(config).await,
        ExecutionMode::Chat(config) => run_chat(config).await,
        ExecutionMode::History { runtime, limit } => run_history(runtime, limit).await,
        ExecutionMode::Show { runtime, id, json } => {
            let system = build_system(&runtime)?;
            let record = system
                .find(id)
                .await?
                .with_context(|| format!("No practical with id {}", id))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                println!("Created: {}", record.created_at.to_rfc3339());
                print_bundle(&record.bundle);
            }
            Ok(())
        }
        ExecutionMode::Compile(config) => run_compile(config).await,
        ExecutionMode::ShowConfig => {
            ConfigDiscovery::show_discovery_info();
            Ok(())
        }
        ExecutionMode::InitConfig => {
            let path = ConfigDiscovery::create_default_user_config()?;
            println!("Configuration file: {}", path.display());
            Ok(())
        }
    }
}

fn verbose(mode: &ExecutionMode) -> bool {
    match mode {
        ExecutionMode::Process(ProcessConfig { runtime, .. })
        | ExecutionMode::Chat(ChatConfig { runtime, .. })
        | ExecutionMode::History { runtime, .. }
        | ExecutionMode::Show { runtime, .. }
        | ExecutionMode::Compile(CompileConfig { runtime, .. }) => runtime.verbose,
        ExecutionMode::ShowConfig | ExecutionMode::InitConfig => false,
    }
}

/// `RUST_LOG` wins over `--verbose`. Logs go to stderr so stdout stays parseable.
fn init_logging(verbose: bool) {
    let default = if verbose { "matist=debug" } else { "matist=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn build_system(runtime: &RuntimeOptions) -> Result<MatistSystem> {
    let mut config = ConfigDiscovery::load(runtime.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(workspace) = &runtime.workspace {
        config.workspace_path = Some(workspace.clone());
    }
    MatistSystem::new(config).context("Failed to initialize MATist")
}

async fn run_process(config: ProcessConfig) -> Result<()> {
    let system = build_system(&config.runtime)?;

    if config.stream {
        let mut events = system.process_streaming(&config.topic);
        let mut report = None;
        let mut failed = false;

        while let Some(event) = events.next().await {
            if config.json {
                println!("{}", serde_json::to_string(&event)?);
            } else {
                match (&event.status, &event.message, &event.content) {
                    (EventStatus::Processing, Some(message), _) => println!("… {}", message),
                    (_, _, Some(content)) => {
                        println!("\n=== {} ===\n{}", event.step, content);
                    }
                    (_, Some(message), None) => println!("[{}] {}", event.step, message),
                    _ => {}
                }
            }

            if event.step == matist::pipeline::PipelineStep::LatexReport
                && event.status == EventStatus::Complete
            {
                report = event.content.clone();
            }
            failed |= event.status == EventStatus::Error;
        }

        if let (Some(path), Some(report)) = (&config.output, report) {
            tokio::fs::write(path, report)
                .await
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
        }
        if failed {
            std::process::exit(1);
        }
        return Ok(());
    }

    let bundle = system.process(&config.topic).await;

    if config.json {
        println!("{}", serde_json::to_string_pretty(&bundle)?);
    } else {
        print_bundle(&bundle);
    }

    if let (Some(path), Some(report)) = (&config.output, &bundle.latex_report) {
        tokio::fs::write(path, report)
            .await
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        info!("Report written to {}", path.display());
    }

    if !bundle.is_success() {
        error!("Practical generation failed for {:?}", config.topic);
        std::process::exit(1);
    }
    Ok(())
}

async fn run_chat(config: ChatConfig) -> Result<()> {
    let system = build_system(&config.runtime)?;
    let messages = [ChatMessage::user(config.question)];

    if config.stream {
        let mut chunks = system.chat_stream(&messages).await;
        let mut stdout = io::stdout();
        while let Some(chunk) = chunks.next().await {
            write!(stdout, "{}", chunk)?;
            stdout.flush()?;
        }
        writeln!(stdout)?;
    } else {
        let reply = system.chat(&messages).await;
        println!("{}", reply.response);
    }
    Ok(())
}

async fn run_history(runtime: RuntimeOptions, limit: usize) -> Result<()> {
    let system = build_system(&runtime)?;
    let summaries = system.recent(limit).await?;

    if summaries.is_empty() {
        println!("No stored practicals");
        return Ok(());
    }

    for summary in summaries {
        println!(
            "{}  {}  {}{}",
            summary.id,
            summary.created_at.format("%Y-%m-%d %H:%M"),
            summary.topic,
            if summary.optimization_applicable {
                "  (optimized)"
            } else {
                ""
            }
        );
    }
    Ok(())
}

async fn run_compile(config: CompileConfig) -> Result<()> {
    let system = build_system(&config.runtime)?;
    let pdf = system.compile_record(config.id).await?;
    tokio::fs::write(&config.output, &pdf)
        .await
        .with_context(|| format!("Failed to write {}", config.output.display()))?;
    println!("Wrote {} ({} bytes)", config.output.display(), pdf.len());
    Ok(())
}

fn print_bundle(bundle: &PracticalBundle) {
    println!("Topic: {}", bundle.topic);
    if let Some(message) = &bundle.error_message {
        println!("Error: {}", message);
    }

    let sections = [
        ("Theory", &bundle.theory),
        ("Brute-force code", &bundle.brute_force_code),
        ("Brute-force explanation", &bundle.brute_force_explanation),
        ("Efficient code", &bundle.efficient_code),
        ("Efficient explanation", &bundle.efficient_explanation),
        ("LaTeX report", &bundle.latex_report),
    ];
    for (title, content) in sections {
        if let Some(content) = content {
            println!("\n=== {} ===\n{}", title, content);
        }
    }

    if bundle.is_success() && !bundle.optimization_applicable {
        println!("\nNo significant optimization possible");
    }
}
