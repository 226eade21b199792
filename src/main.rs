use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use stockroom::{
    EventLoop, ItemId, Prompt, RecordStore, ScriptedPrompt, ServiceConfig, StockApp,
    StoreConfig, StoreService, TextSurface, UiEvent,
};
use tracing_subscriber::filter::EnvFilter;

#[derive(Parser)]
#[command(name = "stockroom", version, about = "Local inventory tracker")]
struct Cli {
    /// Store directory
    #[arg(long, default_value = "./stockroom")]
    store: PathBuf,

    /// Store worker threads
    #[arg(long, default_value_t = 1)]
    workers: usize,

    /// Sync the log to disk every N writes
    #[arg(long, default_value_t = 1)]
    sync_interval: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add an item
    Add { name: String, quantity: String },
    /// Show stock, optionally filtered by name
    List {
        #[arg(long, default_value = "")]
        search: String,
        /// Print all items as JSON instead
        #[arg(long)]
        json: bool,
    },
    /// Remove an item
    Remove {
        id: u64,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Set an item's quantity
    Update { id: u64, quantity: String },
    /// Show items at or below a quantity
    LowStock { threshold: u64 },
    /// Print store statistics as JSON
    Stats,
    /// Rewrite the log down to live items
    Compact,
    /// Interactive session
    Shell,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let store = Arc::new(RecordStore::open_or_create(StoreConfig {
        path: cli.store.clone(),
        sync_interval: cli.sync_interval,
        ..Default::default()
    })?);

    match cli.command {
        Commands::List { json: true, .. } => {
            let items = store.snapshot()?;
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
        Commands::LowStock { threshold } => {
            for item in store.low_stock(threshold)? {
                println!("[{:>4}] {} - {}", item.id.0, item.name, item.quantity);
            }
        }
        Commands::Stats => {
            println!("{}", serde_json::to_string_pretty(&store.stats())?);
        }
        Commands::Compact => {
            let summary = store.compact()?;
            println!(
                "{} -> {} entries, {} -> {} bytes",
                summary.entries_before,
                summary.entries_after,
                summary.bytes_before,
                summary.bytes_after
            );
        }
        Commands::Shell => {
            let service = start_service(store, cli.workers)?;
            run_shell(service)?;
        }
        command => {
            let service = start_service(store, cli.workers)?;
            run_once(service, command)?;
        }
    }

    Ok(())
}

fn start_service(store: Arc<RecordStore>, workers: usize) -> Result<StoreService> {
    Ok(StoreService::start(
        store,
        ServiceConfig {
            workers,
            ..Default::default()
        },
    )?)
}

/// Run a single mutation or listing through the app and print the result.
fn run_once(service: StoreService, command: Commands) -> Result<()> {
    let prompt = ScriptedPrompt::new();
    let event = match command {
        Commands::Add { name, quantity } => UiEvent::Submit { name, quantity },
        Commands::List { search, .. } => UiEvent::Search(search),
        Commands::Remove { id, yes } => {
            prompt.push_confirm(yes || TerminalPrompt.confirm(&format!("Remove item {}?", id)));
            UiEvent::Remove(ItemId(id))
        }
        Commands::Update { id, quantity } => {
            prompt.push_answer(quantity);
            UiEvent::Update(ItemId(id))
        }
        _ => unreachable!("handled without the event loop"),
    };

    let event_loop = EventLoop::new();
    let mut app = StockApp::new(
        service,
        event_loop.handle(),
        Box::new(prompt.clone()),
        Box::new(TextSurface::new(io::stdout())),
    );

    event_loop.handle().post(event);
    // Nothing here posts Quit, so the loop always drains to idle
    let _ = event_loop.run_until_idle(&mut app);

    let alerts = prompt.alerts();
    for alert in &alerts {
        eprintln!("error: {}", alert);
    }
    if !alerts.is_empty() {
        bail!("{} operation(s) failed", alerts.len());
    }
    Ok(())
}

fn run_shell(service: StoreService) -> Result<()> {
    let event_loop = EventLoop::new();
    let handle = event_loop.handle();
    let mut app = StockApp::new(
        service,
        event_loop.handle(),
        Box::new(TerminalPrompt),
        Box::new(TextSurface::new(io::stdout())),
    );

    println!("commands: add <name> <qty> | find [term] | rm <id> | set <id> | ls | quit");
    handle.post(UiEvent::Refresh);

    loop {
        if event_loop.run_until_idle(&mut app).is_break() {
            break;
        }

        let Some(line) = read_line("> ")? else {
            break;
        };

        match parse_command(&line) {
            Ok(Some(event)) => handle.post(event),
            Ok(None) => {}
            Err(message) => eprintln!("{}", message),
        }
    }

    Ok(())
}

fn parse_command(line: &str) -> std::result::Result<Option<UiEvent>, String> {
    let line = line.trim();
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();

    let event = match command {
        "" => return Ok(None),
        "add" => {
            // The name may contain spaces; the quantity is the last word
            let (name, quantity) = rest.rsplit_once(' ').unwrap_or((rest, ""));
            UiEvent::Submit {
                name: name.to_string(),
                quantity: quantity.to_string(),
            }
        }
        "find" => UiEvent::Search(rest.to_string()),
        "rm" => UiEvent::Remove(parse_id(rest)?),
        "set" => UiEvent::Update(parse_id(rest)?),
        "ls" => UiEvent::Refresh,
        "quit" | "exit" => UiEvent::Quit,
        other => return Err(format!("unknown command: {}", other)),
    };

    Ok(Some(event))
}

fn parse_id(text: &str) -> std::result::Result<ItemId, String> {
    text.parse::<u64>()
        .map(ItemId)
        .map_err(|_| format!("not an item id: {:?}", text))
}

fn read_line(message: &str) -> io::Result<Option<String>> {
    print!("{}", message);
    io::stdout().flush()?;

    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

/// Prompts on the controlling terminal.
struct TerminalPrompt;

impl Prompt for TerminalPrompt {
    fn confirm(&self, message: &str) -> bool {
        match read_line(&format!("{} [y/N] ", message)) {
            Ok(Some(answer)) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),
            _ => false,
        }
    }

    fn ask(&self, message: &str) -> Option<String> {
        read_line(&format!("{} ", message)).ok().flatten()
    }

    fn alert(&self, message: &str) {
        eprintln!("! {}", message);
    }
}
