use clap::{Parser, Subcommand};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use termslots::config::{TermslotsConfig, load_cfg, load_scripts, save_cfg};
use termslots::control::{StopSignal, send_message};
use termslots::lifecycle::{self, LifecycleGuard};
use termslots::operator::OperatorServer;
use termslots::wm::{Role, SecondaryWindow};
use termslots::{SessionOptions, SlotAllocator, SlotError, SlotResult, logging, setup_script};

#[derive(Parser)]
#[command(name = "termslots", version, about = "Slot allocator for terminal script windows")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the operator server and place its own window
    Serve {
        /// Listen address, defaults to operator_addr from settings.json
        #[arg(long)]
        addr: Option<String>,
    },
    /// Send one instruction to the operator server, e.g. `send robeau start`
    Send {
        #[arg(required = true, num_args = 1..)]
        instruction: Vec<String>,
        #[arg(long)]
        addr: Option<String>,
    },
    /// Run a managed demo script until it is stopped
    Demo {
        #[arg(long)]
        name: String,
        /// Secondary window as NAME:WIDTHxHEIGHT, repeatable
        #[arg(long = "secondary", value_parser = parse_secondary)]
        secondary: Vec<SecondaryWindow>,
    },
    /// List owners of occupied slots
    List,
    /// Free every slot, or only the denied ones
    FreeAll {
        #[arg(long)]
        denied: bool,
    },
    /// Write settings.json with the current (default) values
    InitConfig,
}

fn parse_secondary(raw: &str) -> Result<SecondaryWindow, String> {
    SecondaryWindow::parse(raw).ok_or_else(|| format!("expected NAME:WIDTHxHEIGHT, got '{}'", raw))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("[termslots] {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> SlotResult<()> {
    let (cfg, cfg_problem) = load_cfg();
    // Logging is not up yet, and some commands never start it
    if let Some(problem) = &cfg_problem {
        eprintln!("[termslots] {}", problem);
    }

    match command {
        Commands::Serve { addr } => {
            logging::init("server", &cfg.log_level)?;
            log_cfg_problem(&cfg_problem);
            lifecycle::install("server")?;
            let addr = addr.unwrap_or_else(|| cfg.operator_addr.clone());
            let allocator = Arc::new(SlotAllocator::open(cfg, load_scripts())?);

            let placed = allocator.acquire(Role::Server, "server")?;
            println!("[termslots] Operator server on {} ({})", addr, placed.title);

            let _guard = LifecycleGuard::new();
            OperatorServer::new(allocator).serve(addr.as_str(), &StopSignal::new())
        }
        Commands::Send { instruction, addr } => {
            let addr = addr.unwrap_or_else(|| cfg.operator_addr.clone());
            let reply = send_message(addr.as_str(), &instruction.join(" "), Duration::from_secs(10))?;
            println!("{}", reply);
            Ok(())
        }
        Commands::Demo { name, secondary } => {
            logging::init(&name, &cfg.log_level)?;
            log_cfg_problem(&cfg_problem);
            run_demo(cfg, &name, secondary)
        }
        Commands::List => {
            let allocator = SlotAllocator::open(cfg, load_scripts())?;
            for name in allocator.list_owner_names()? {
                println!("{}", name);
            }
            Ok(())
        }
        Commands::FreeAll { denied } => {
            let allocator = SlotAllocator::open(cfg, load_scripts())?;
            let freed = allocator.free_all(denied)?;
            println!("[termslots] Freed {} slot(s)", freed);
            Ok(())
        }
        Commands::InitConfig => save_cfg(&cfg).map_err(|e| SlotError::Io(std::io::Error::other(e.to_string()))),
    }
}

fn log_cfg_problem(problem: &Option<String>) {
    if let Some(problem) = problem {
        tracing::warn!("{}", problem);
    }
}

fn run_demo(cfg: TermslotsConfig, name: &str, secondary: Vec<SecondaryWindow>) -> SlotResult<()> {
    let registry = load_scripts();
    let windows = if secondary.is_empty() {
        registry
            .get(name)
            .map(|entry| entry.secondary_windows.clone())
            .unwrap_or_default()
    } else {
        secondary
    };

    let allocator = Arc::new(SlotAllocator::open(cfg, registry)?);
    let _guard = LifecycleGuard::new();
    let session = setup_script(name, allocator, SessionOptions::default())?;
    println!(
        "[termslots] {} running as {} in slot {:?} at {}",
        session.name(),
        session.role(),
        session.slot(),
        session.geometry()
    );

    let readiness = session.spawn_secondary_layout(windows)?;
    if !readiness.wait() {
        println!("[termslots] Some secondary windows could not be placed");
    }

    let stop = session.stop_signal();
    let mut ticks: u64 = 0;
    while !stop.sleep(Duration::from_secs(5)) {
        ticks += 1;
        println!("[termslots] {} alive for {}s", session.name(), ticks * 5);
    }
    println!("[termslots] {} stopping", session.name());
    session.finish();
    Ok(())
}
