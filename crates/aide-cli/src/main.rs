//! aide - personal automation agent CLI

mod tools;

use std::path::PathBuf;
use std::sync::Arc;

use aide_agent::{
    InMemoryStore, JsonFileStore, KeyRing, LoopReport, MemoryStore, Persona, PipelineConfig,
    PipelineEvent, SecurityLevel, Session, ToolRegistry,
};
use aide_ai::ProviderRegistry;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

/// aide - turns requests into actions on your machine
#[derive(Parser, Debug)]
#[command(name = "aide")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Run a single request non-interactively
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Treat the request as a goal and run the multi-step agent loop
    #[arg(long)]
    agent: bool,

    /// Config file (default: ~/.config/aide/config.toml or $AIDE_CONFIG_PATH)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Security level override (low, medium, high)
    #[arg(long)]
    security_level: Option<SecurityLevel>,

    /// Persona override (casual, professional, witty, motivational)
    #[arg(long)]
    persona: Option<Persona>,

    /// Print the example config and exit
    #[arg(long)]
    example_config: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("aide=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if args.example_config {
        println!("{}", aide_agent::config::example_config());
        return Ok(());
    }

    let mut config = PipelineConfig::load(args.config.as_deref())?;
    if let Some(level) = args.security_level {
        config.security_level = level;
    }
    if let Some(persona) = args.persona {
        config.persona = persona;
    }

    let keys = KeyRing::from_config(&config);
    if config.provider_chain.iter().all(|p| keys.count(*p) == 0) {
        eprintln!("Error: no API key found for any provider in the chain.");
        eprintln!();
        for provider in &config.provider_chain {
            eprintln!(
                "  {}: export {}=your-key",
                provider.name(),
                provider.api_key_env_vars().join(" or ")
            );
        }
        eprintln!("Or add keys to the [api_keys] table (see --example-config).");
        std::process::exit(1);
    }

    let memory = open_memory(&config).await;
    let tools = ToolRegistry::new()
        .with(Arc::new(tools::ShellTool::new()))
        .with(Arc::new(tools::FileTool::new()))
        .with(Arc::new(tools::MemoryTool::new(memory.clone())));

    let mut session =
        Session::new(config, ProviderRegistry::with_defaults(), keys, tools).with_memory(memory);
    spawn_event_printer(&session, args.verbose);

    if let Some(command) = args.command {
        if args.agent {
            let report = run_agent(&mut session, &command).await;
            print_report(&report);
        } else {
            let out = session.handle_utterance(&command).await;
            println!("{}", out.text);
        }
        return Ok(());
    }

    run_interactive(&mut session).await
}

async fn open_memory(config: &PipelineConfig) -> Arc<dyn MemoryStore> {
    let path = config
        .memory_path
        .clone()
        .unwrap_or_else(PipelineConfig::default_memory_path);
    match JsonFileStore::open(&path).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::warn!(path = %path.display(), "memory unavailable, using a session-only store: {}", e);
            Arc::new(InMemoryStore::new())
        }
    }
}

/// Echo pipeline events worth surfacing to stderr.
fn spawn_event_printer(session: &Session, verbose: bool) {
    let mut receiver = session.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = receiver.recv().await {
            match event {
                PipelineEvent::ProviderSwitch { provider, model, .. } => {
                    eprintln!("[switched to {} ({})]", provider.name(), model);
                }
                PipelineEvent::Distilled {
                    messages_before,
                    messages_after,
                } => {
                    eprintln!("[context distilled: {} -> {} messages]", messages_before, messages_after);
                }
                PipelineEvent::ActionBlocked { kind, reason } => {
                    eprintln!("[blocked {}: {}]", kind, reason);
                }
                PipelineEvent::StepStart { step, ceiling } => {
                    eprintln!("[step {}/{}]", step, ceiling);
                }
                PipelineEvent::ActionRouted { kind, result } if verbose => {
                    let preview: String = result.chars().take(200).collect();
                    eprintln!("[{}: {}]", kind, preview);
                }
                PipelineEvent::ProviderFailure {
                    provider,
                    kind,
                    message,
                } if verbose => {
                    eprintln!("[{} failed ({}): {}]", provider.name(), kind, message);
                }
                _ => {}
            }
        }
    });
}

/// Run the agent loop; Ctrl-C stops it between steps.
async fn run_agent(session: &mut Session, goal: &str) -> LoopReport {
    let handle = session.handle();
    let stopper = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n[stopping after the current step]");
            handle.stop();
        }
    });
    let report = session.run_agent(goal).await;
    stopper.abort();
    report
}

fn print_report(report: &LoopReport) {
    println!("{}", report.final_text);
    if report.outcome != aide_agent::LoopOutcome::Completed {
        eprintln!("[agent {} after {} steps]", report.outcome, report.steps);
    }
}

async fn run_interactive(session: &mut Session) -> anyhow::Result<()> {
    println!("aide - type a request, /agent <goal>, /persona <name>, /security <level>, or 'exit'");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input, "exit" | "quit") {
            break;
        }

        if let Some(goal) = input.strip_prefix("/agent ") {
            let report = run_agent(session, goal.trim()).await;
            print_report(&report);
        } else if let Some(name) = input.strip_prefix("/persona ") {
            match name.parse::<Persona>() {
                Ok(persona) => {
                    session.switch_persona(persona);
                    println!("Persona set to {}.", persona);
                }
                Err(e) => eprintln!("Error: {}", e),
            }
        } else if let Some(level) = input.strip_prefix("/security ") {
            match level.parse::<SecurityLevel>() {
                Ok(level) => {
                    session.set_security_level(level);
                    println!("Security level set to {}.", level);
                }
                Err(e) => eprintln!("Error: {}", e),
            }
        } else {
            let out = session.handle_utterance(input).await;
            println!("{}", out.text);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse() {
        let args = Args::parse_from([
            "aide",
            "-c",
            "tidy my downloads",
            "--agent",
            "--security-level",
            "high",
            "--persona",
            "witty",
        ]);
        assert_eq!(args.command.as_deref(), Some("tidy my downloads"));
        assert!(args.agent);
        assert_eq!(args.security_level, Some(SecurityLevel::High));
        assert_eq!(args.persona, Some(Persona::Witty));
    }

    #[test]
    fn test_bad_security_level_rejected() {
        assert!(Args::try_parse_from(["aide", "--security-level", "paranoid"]).is_err());
    }
}
