//! kbs - run blackboard knowledge based systems from the command line.
//!
//! - `kbs run` - consult a knowledge base interactively or from a script
//! - `kbs dump` - print the built-in animal knowledge base as YAML
//! - `kbs check` - validate a knowledge base definition
//! - `kbs events` - show recent run events

mod terminal;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use kbs_core::client::{channel, Exchange, ScriptFile};
use kbs_core::{
    BlackboardSystem, CancelToken, EngineConfig, EventLog, KnowledgeBaseDef, NullTraceSink,
    RunReport, ScriptedClient, TraceSink,
};

use crate::terminal::TerminalClient;

#[derive(Parser)]
#[command(name = "kbs")]
#[command(about = "Blackboard knowledge based system", version)]
struct Cli {
    /// Project root directory
    #[arg(short, long, global = true)]
    project: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a consultation
    Run {
        /// Knowledge base definition (defaults to the built-in animal one)
        #[arg(long)]
        kb: Option<PathBuf>,

        /// Answer queries from a YAML script instead of the terminal
        #[arg(long)]
        script: Option<PathBuf>,

        /// Engine configuration (defaults to .kbs/config.yaml)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print the final blackboard
        #[arg(long)]
        show_blackboard: bool,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the built-in knowledge base as YAML
    Dump,

    /// Validate a knowledge base definition
    Check {
        /// Knowledge base definition (defaults to the built-in animal one)
        #[arg(long)]
        kb: Option<PathBuf>,
    },

    /// Show recent run events
    Events {
        /// Number of events to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    // Prompts go to stdout; keep logs out of their way.
    let logs = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.log_json {
        logs.json().init();
    } else {
        logs.init();
    }

    let project_root = match cli.project {
        Some(root) => root,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match cli.command {
        Commands::Run {
            kb,
            script,
            config,
            show_blackboard,
            json,
        } => {
            let options = RunOptions {
                kb,
                script,
                config,
                show_blackboard,
                json,
            };
            run_consultation(&project_root, options)
        }
        Commands::Dump => {
            print!("{}", kbs_animals::knowledge_base().to_yaml()?);
            Ok(())
        }
        Commands::Check { kb } => check_knowledge_base(kb.as_deref()),
        Commands::Events { limit } => show_events(&project_root, limit),
    }
}

struct RunOptions {
    kb: Option<PathBuf>,
    script: Option<PathBuf>,
    config: Option<PathBuf>,
    show_blackboard: bool,
    json: bool,
}

fn load_knowledge_base(path: Option<&Path>) -> Result<KnowledgeBaseDef> {
    match path {
        Some(path) => KnowledgeBaseDef::load(path),
        None => Ok(kbs_animals::knowledge_base()),
    }
}

fn load_config(project_root: &Path, path: Option<&Path>) -> Result<EngineConfig> {
    let mut config = match path {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::load_from_project(project_root)?,
    };
    config.resolve_paths(project_root);
    Ok(config)
}

fn run_consultation(project_root: &Path, options: RunOptions) -> Result<()> {
    let config = load_config(project_root, options.config.as_deref())?;
    let kb = load_knowledge_base(options.kb.as_deref())?;
    for issue in kb.check() {
        tracing::warn!(%issue, "knowledge base issue");
    }
    tracing::info!(kb = %kb.name, sources = kb.sources.len(), "Starting consultation");

    let trace: Box<dyn TraceSink + Send> = if config.events.enabled {
        Box::new(EventLog::new(&config.events.path))
    } else {
        Box::new(NullTraceSink)
    };

    let finished = match &options.script {
        Some(path) => run_scripted(&kb, path, config, trace)?,
        None => run_interactive(&kb, config, trace)?,
    };

    let report = finished.outcome?;
    if options.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        tracing::info!(summary = %report.summary(), "Consultation finished");
    }
    if options.show_blackboard {
        for (entry, attributes) in finished.blackboard {
            println!("{entry}:");
            for (attribute, value) in attributes {
                println!("  {attribute} = {value}");
            }
        }
    }
    Ok(())
}

/// What is left of a consultation once its system is gone.
struct Finished {
    outcome: kbs_core::Result<RunReport>,
    blackboard: BTreeMap<String, BTreeMap<String, String>>,
}

impl Finished {
    fn new(system: &BlackboardSystem, outcome: kbs_core::Result<RunReport>) -> Self {
        Self {
            outcome,
            blackboard: system.snapshot().render(system.symbols()),
        }
    }
}

/// Answers come from a script file; the exchange is printed afterwards.
fn run_scripted(
    kb: &KnowledgeBaseDef,
    script: &Path,
    config: EngineConfig,
    trace: Box<dyn TraceSink + Send>,
) -> Result<Finished> {
    let content = std::fs::read_to_string(script)
        .with_context(|| format!("Failed to read script from {}", script.display()))?;
    let file: ScriptFile = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse script from {}", script.display()))?;

    let client = ScriptedClient::from(file);
    let transcript = client.transcript();
    let mut system = BlackboardSystem::new(kb, client, config)?.with_trace(trace);
    let outcome = system.execute();

    for exchange in transcript.exchanges() {
        match exchange {
            Exchange::Wrote(message) => println!("{message}"),
            Exchange::Asked { prompt, answer, .. } => println!("{prompt}\n> {answer}"),
        }
    }
    Ok(Finished::new(&system, outcome))
}

/// The controller runs on its own thread and talks to the terminal through
/// the channel client.
fn run_interactive(
    kb: &KnowledgeBaseDef,
    config: EngineConfig,
    trace: Box<dyn TraceSink + Send>,
) -> Result<Finished> {
    let cancel = CancelToken::new();
    let (client, endpoint) = channel(
        config.channel_capacity,
        config.poll_interval(),
        cancel.clone(),
    );
    let handle = BlackboardSystem::new(kb, client, config)?
        .with_trace(trace)
        .with_cancel(cancel)
        .spawn();

    let host = thread::spawn(move || {
        endpoint.serve(TerminalClient::new(std::io::stdin().lock(), std::io::stdout()))
    });

    let (system, outcome) = handle.join()?;
    let finished = Finished::new(&system, outcome);

    // Dropping the system hangs up the channel; the host drains pending
    // writes and returns. After a failed run it may still be blocked on
    // input, so it is left behind.
    drop(system);
    if finished.outcome.is_ok() {
        host.join()
            .map_err(|_| anyhow!("terminal thread panicked"))??;
    }
    Ok(finished)
}

fn check_knowledge_base(path: Option<&Path>) -> Result<()> {
    let kb = load_knowledge_base(path)?;
    let issues = kb.check();
    if issues.is_empty() {
        println!(
            "{}: {} levels, {} sources, no issues",
            kb.name,
            kb.levels.len(),
            kb.sources.len()
        );
        return Ok(());
    }

    for issue in &issues {
        println!("{issue}");
    }
    bail!("{} issue(s) found in {}", issues.len(), kb.name)
}

fn show_events(project_root: &Path, limit: usize) -> Result<()> {
    let config = load_config(project_root, None)?;
    let events = EventLog::new(&config.events.path).read_recent(limit);

    println!("Recent events ({}):", config.events.path.display());
    for event in &events {
        println!(
            "  [{}] run {} cycle {}: {}",
            event.timestamp.format("%Y-%m-%d %H:%M:%S"),
            event.run_id,
            event.event.cycle,
            serde_json::to_string(&event.event.kind)?
        );
    }
    Ok(())
}
