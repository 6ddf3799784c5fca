mod debug_report;

use clap::Parser;
use parley::{Engine, LoadError, MacroCall, MacroError, Options};
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_USER: &str = "localuser";

/// Chat with a rule set from the terminal.
#[derive(Parser, Debug)]
#[command(name = "parley", version, about, long_about = None)]
struct Cli {
    /// Rule file, or directory of rule files
    path: PathBuf,

    /// TOML file with engine options
    #[arg(short, long, env = "PARLEY_CONFIG")]
    config: Option<PathBuf>,

    /// User id to chat as
    #[arg(short, long, default_value = DEFAULT_USER)]
    user: String,

    /// Reply to one message and exit
    #[arg(short, long)]
    message: Option<String>,

    /// Print the match report after every reply
    #[arg(short, long)]
    verbose: bool,

    /// Seed for reply selection
    #[arg(long)]
    seed: Option<u64>,

    /// Treat unknown commands in rule text as errors
    #[arg(long)]
    strict: bool,

    /// Force ANSI color output
    #[arg(long, conflicts_with = "no_color")]
    color: bool,

    /// Disable ANSI color output
    #[arg(long)]
    no_color: bool,
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let engine = match build_engine(&cli) {
        Ok(engine) => engine,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(2);
        }
    };

    let color = if cli.no_color { false } else { cli.color || io::stdout().is_terminal() };

    if let Some(message) = &cli.message {
        respond(&engine, &cli.user, message, cli.verbose, color);
        return;
    }

    if let Err(err) = shell(&engine, &cli, color) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("PARLEY_LOG").unwrap_or_else(|_| "parley=warn".into());
    let json = std::env::var("PARLEY_LOG_FORMAT").is_ok_and(|f| f == "json");

    if json {
        tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr)).init();
    } else {
        tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer().with_writer(io::stderr)).init();
    }
}

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error(transparent)]
    Config(#[from] parley::ConfigError),
    #[error(transparent)]
    Load(#[from] LoadError),
}

fn build_engine(cli: &Cli) -> Result<Engine, StartupError> {
    let mut options = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|source| StartupError::Read { path: path.clone(), source })?;
            Options::from_toml_str(&text)?
        }
        None => Options::default(),
    };
    if cli.seed.is_some() {
        options.seed = cli.seed;
    }
    options.strict |= cli.strict;

    let engine = Engine::with_options(options)?;
    engine.set_subroutine("reverse", reverse);
    load(&engine, &cli.path)?;
    Ok(engine)
}

fn load(engine: &Engine, path: &Path) -> Result<(), LoadError> {
    if path.is_dir() {
        let count = engine.load_directory(path)?;
        tracing::info!(path = %path.display(), files = count, "loaded directory");
    } else {
        engine.load_file(path)?;
    }
    Ok(())
}

/// `<call>reverse some words</call>` reverses the text.
fn reverse(call: &mut MacroCall<'_>) -> Result<String, MacroError> {
    Ok(call.args.join(" ").chars().rev().collect())
}

fn respond(engine: &Engine, user: &str, message: &str, verbose: bool, color: bool) {
    let out = engine.reply_verbose(user, message);
    println!("{}", out.reply);
    if verbose {
        debug_report::print_reply(&out, color);
    }
}

fn shell(engine: &Engine, cli: &Cli, color: bool) -> io::Result<()> {
    println!("parley {} - type /help for commands, /quit to exit", env!("CARGO_PKG_VERSION"));
    let mut verbose = cli.verbose;
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("You> ");
        io::stdout().flush()?;
        let Some(line) = lines.next().transpose()? else {
            println!();
            return Ok(());
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line.split_whitespace().collect::<Vec<_>>().as_slice() {
            ["/quit"] | ["/exit"] => return Ok(()),
            ["/help"] => print_help(),
            ["/last"] => match engine.last_match(&cli.user) {
                Some(pattern) => println!("last match: {pattern}"),
                None => println!("no match yet"),
            },
            ["/verbose"] => {
                verbose = !verbose;
                println!("verbose {}", if verbose { "on" } else { "off" });
            }
            ["/history"] => match engine.history(&cli.user) {
                Some((inputs, replies)) => debug_report::print_history(&inputs, &replies, color),
                None => println!("no history yet"),
            },
            ["/vars"] => debug_report::print_vars(&cli.user, engine.uservars(&cli.user).unwrap_or_default(), color),
            ["/dump", "topics"] => debug_report::print_topics(&engine.topics(), color),
            ["/dump", "sorted"] => {
                for topic in engine.topics() {
                    if let Some(sorted) = engine.sorted_triggers(&topic.name) {
                        debug_report::print_sorted(&topic.name, &sorted, color);
                    }
                }
            }
            ["/dump", "sorted", topic] => match engine.sorted_triggers(topic) {
                Some(sorted) => debug_report::print_sorted(topic, &sorted, color),
                None => println!("no topic named '{topic}'"),
            },
            ["/reload"] => match engine.reload() {
                Ok(()) => println!("reloaded {} source(s)", engine.source_names().len()),
                Err(err) => println!("reload failed: {err}"),
            },
            [cmd, ..] if cmd.starts_with('/') => println!("unknown command {cmd}; try /help"),
            _ => {
                print!("Bot> ");
                respond(engine, &cli.user, line, verbose, color);
            }
        }
    }
}

fn print_help() {
    println!(
        "Commands:
  /help                 Show this help.
  /quit                 Leave the shell.
  /last                 Show the trigger that answered your last message.
  /vars                 Show your user variables.
  /history              Show your last nine messages and replies.
  /verbose              Toggle the match report.
  /dump topics          List topics with their includes, inherits and triggers.
  /dump sorted [TOPIC]  Show triggers in the order they are tried.
  /reload               Re-read rule files from disk."
    );
}
