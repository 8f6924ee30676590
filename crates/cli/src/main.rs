mod config;
mod error;
mod logging;

use std::future::Future;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::Parser;
use mcp::Server;
use runtime::{OllamaBackend, Session, ToolOutcome, ToolRecord};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tracing::{error, info};

use config::Config;
use error::{Error, Result};

const CONFIG_FILE: &str = "tiller.toml";

#[derive(Parser)]
#[command(name = "tiller")]
#[command(about = "Chat with a local model that can call MCP tools", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the MCP tool-server executable
    server: String,

    /// Ollama model to use
    #[arg(short, long)]
    model: Option<String>,

    /// Config file (defaults to ./tiller.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "mcp=debug" (overrides RUST_LOG)
    #[arg(long)]
    log: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.log.as_deref());

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?
        .with_overrides(cli.model, std::env::var("OLLAMA_URL").ok());
    let backend = config.backend()?;
    let server_config = config.server(&cli.server);

    println!("tiller v{}", env!("CARGO_PKG_VERSION"));
    println!("Tool server: {}", server_config.command);
    println!("Model: {}", config.backend.model);

    let mut server = Server::start(server_config).await.map_err(Error::Startup)?;

    // The server is stopped on every path out of the session.
    let outcome = cmd_chat(&mut server, backend).await;
    let stopped = server.stop().await.map_err(Error::Shutdown);

    outcome.and(stopped)
}

async fn cmd_chat(server: &mut Server, backend: OllamaBackend) -> Result<()> {
    let tools = server.discover_tools().await.map_err(Error::Startup)?;
    println!("Connected to MCP server with {} tools available", tools.len());
    for tool in tools {
        println!("  - {}", tool.name);
    }

    let mut session = Session::new(backend, server).with_observer(print_tool_record);
    info!(session = %session.id, "chat started");
    println!("Type 'quit' or Ctrl+D to exit.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = io::stdout();

    loop {
        print!("User: ");
        stdout.flush()?;

        let Some(line) = read_input(&mut lines, tokio::signal::ctrl_c()).await? else {
            break;
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        let result = tokio::select! {
            result = session.chat(input) => result,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted during turn");
                break;
            }
        };

        match result {
            Ok(response) => {
                println!("\nAssistant: {response}\n");
            }
            Err(e) => {
                error!("turn failed: {e}");
                eprintln!("Error: {e}\n");
            }
        }
    }

    println!("\nGoodbye!");
    Ok(())
}

/// Read the next line of user input.
///
/// `None` means the session should end: EOF, a quit command, or `interrupt`
/// completing first.
async fn read_input<R>(lines: &mut Lines<R>, interrupt: impl Future) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    tokio::select! {
        line = lines.next_line() => Ok(line?.filter(|l| !is_quit(l.trim()))),
        _ = interrupt => {
            info!("interrupted");
            Ok(None)
        }
    }
}

fn is_quit(input: &str) -> bool {
    input.eq_ignore_ascii_case("quit") || input.eq_ignore_ascii_case("exit")
}

fn print_tool_record(record: &ToolRecord) {
    let name = &record.invocation.name;
    match &record.outcome {
        ToolOutcome::Output(output) => println!("  ✓ {name} → {output}"),
        _ => println!("  ✗ {}", record.result_line()),
    }
}

/// Load the explicit config file, or `tiller.toml` if it exists, or defaults.
fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Ok(Config::load(path)?),
        None if Path::new(CONFIG_FILE).exists() => Ok(Config::load(CONFIG_FILE)?),
        None => Ok(Config::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use mcp::ServerConfig;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_server_and_model() {
        let cli = Cli::try_parse_from(["tiller", "./mcp-random-server", "--model", "llama3"]).unwrap();
        assert_eq!(cli.server, "./mcp-random-server");
        assert_eq!(cli.model.as_deref(), Some("llama3"));
        assert!(cli.config.is_none());
    }

    #[test]
    fn server_path_is_required() {
        assert!(Cli::try_parse_from(["tiller"]).is_err());
    }

    #[tokio::test]
    async fn read_input_returns_lines_until_quit() {
        let mut lines = BufReader::new(&b"hello\n\nEXIT\nafter\n"[..]).lines();

        let first = read_input(&mut lines, std::future::pending::<()>()).await.unwrap();
        assert_eq!(first.as_deref(), Some("hello"));
        let blank = read_input(&mut lines, std::future::pending::<()>()).await.unwrap();
        assert_eq!(blank.as_deref(), Some(""));
        let quit = read_input(&mut lines, std::future::pending::<()>()).await.unwrap();
        assert!(quit.is_none());
    }

    #[tokio::test]
    async fn read_input_ends_on_eof() {
        let mut lines = BufReader::new(&b""[..]).lines();
        let input = read_input(&mut lines, std::future::pending::<()>()).await.unwrap();
        assert!(input.is_none());
    }

    #[tokio::test]
    async fn read_input_ends_on_interrupt() {
        // The writer stays open, so the read never completes.
        let (_writer, reader) = tokio::io::duplex(64);
        let mut lines = BufReader::new(reader).lines();

        let input = read_input(&mut lines, std::future::ready(())).await.unwrap();
        assert!(input.is_none());
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        let err = load_config(Some(Path::new("/nonexistent/tiller.toml"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn server_config_uses_positional_path() {
        let server: ServerConfig = Config::default().server("./bin/mcp-random-server");
        assert_eq!(server.command, "./bin/mcp-random-server");
        assert_eq!(server.timeout, Some(mcp::DEFAULT_TIMEOUT));
    }
}
