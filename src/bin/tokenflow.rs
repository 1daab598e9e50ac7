use clap::{Parser, Subcommand};
use tokenflow::actions::HandlerRegistry;
use tokenflow::compiler::core::Compiler;
use tokenflow::compiler::loader::{load_process_from_yaml, load_state, save_state};
use tokenflow::runtime::state::ProcessState;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use anyhow::{Result, Context};
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a process definition until it finishes or waits
    Run {
        /// Path to the process YAML file
        #[arg(long, short)]
        file: PathBuf,

        /// Initial variables (key=value)
        #[arg(long, short = 'D', value_parser = parse_key_val)]
        vars: Vec<(String, serde_json::Value)>,

        /// Write the resulting state to this file
        #[arg(long)]
        state_out: Option<PathBuf>,
    },

    /// Resume a captured state against the same process definition
    Resume {
        /// Path to the process YAML file
        #[arg(long, short)]
        file: PathBuf,

        /// State file written by a previous run
        #[arg(long, short)]
        state: PathBuf,

        /// Signal a waiting task after resuming
        #[arg(long)]
        signal: Option<String>,

        /// Write the resulting state to this file
        #[arg(long)]
        state_out: Option<PathBuf>,
    },
}

fn parse_key_val(s: &str) -> Result<(String, serde_json::Value), String> {
    let pos = s.find('=').ok_or_else(|| format!("invalid KEY=value: no `=` found in `{}`", s))?;
    let key = s[..pos].to_string();
    let val_str = &s[pos + 1..];
    // Try parsing as JSON, otherwise treat as string
    let val = serde_json::from_str(val_str).unwrap_or_else(|_| serde_json::Value::String(val_str.to_string()));
    Ok((key, val))
}

fn report(state: &ProcessState, waiting: Vec<String>, state_out: Option<&Path>) -> Result<()> {
    if waiting.is_empty() {
        info!("Process {} has nothing left to wait for", state.id);
    } else {
        info!("Process {} is waiting on: {}", state.id, waiting.join(", "));
    }
    if let Some(path) = state_out {
        save_state(path, state)?;
        info!("State written to {}", path.display());
    }
    println!("{}", state.to_json()?);
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    let handlers = Arc::new(HandlerRegistry::with_builtins());
    let compiler = Compiler::new();

    match cli.command {
        Commands::Run { file, vars, state_out } => {
            let definition = load_process_from_yaml(&file)?;
            info!("Loaded process: {}", definition.id);

            let initial_vars: HashMap<_, _> = vars.into_iter().collect();
            let mut instance = compiler.instantiate(&definition, handlers, initial_vars)?;
            instance.run().context("Process run failed")?;

            report(&instance.get_state(), instance.waiting_activities(), state_out.as_deref())?;
        }

        Commands::Resume { file, state, signal, state_out } => {
            let definition = load_process_from_yaml(&file)?;
            let captured = load_state(&state)?;

            let mut instance = compiler.instantiate(&definition, handlers, HashMap::new())?;
            instance.resume(&captured).context("Could not resume process state")?;
            info!("Resumed process: {}", definition.id);

            if let Some(activity) = signal {
                instance
                    .signal(&activity)
                    .with_context(|| format!("Signal to {} failed", activity))?;
            }

            report(&instance.get_state(), instance.waiting_activities(), state_out.as_deref())?;
        }
    }

    Ok(())
}
