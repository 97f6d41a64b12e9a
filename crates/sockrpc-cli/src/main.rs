//! # sockrpc CLI Entry Point
//!
//! Main binary for sockrpc. Serves the demo backend and makes calls against
//! any sockrpc server.
//!
//! ## Usage
//!
//! ```bash
//! # Serve the demo backend over WebSocket
//! sockrpc serve -b 127.0.0.1:8000
//!
//! # Serve it over length-prefixed TCP
//! sockrpc serve -b 127.0.0.1:9000 --transport tcp
//!
//! # Print a server's description
//! sockrpc describe ws://127.0.0.1:8000/ws
//!
//! # Make an RPC call (outputs raw JSON)
//! sockrpc call ws://127.0.0.1:8000/ws math.add -a '[1, 2]'
//!
//! # Drive a generator, one JSON value per line
//! sockrpc stream tcp://127.0.0.1:9000 countTo -a '[5]'
//! ```
//!
//! ## URL Format
//!
//! - `ws://host:port/path` connects over WebSocket
//! - `tcp://host:port` connects over length-prefixed TCP

use std::time::Duration;

use anyhow::Result;
use argh::FromArgs;
use sockrpc_cli::{demo, parse_args, validate_url, ServeTransport};
use sockrpc_client::{Client, ClientConfig};
use sockrpc_server::{TcpServer, WebSocketServer};

/// Main CLI structure parsed from command-line arguments.
#[derive(FromArgs)]
/// sockrpc - remote functions and generators over one socket
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

/// Available CLI subcommands.
///
/// - **Serve**: Serve the demo backend
/// - **Describe**: Print a server's schema descriptor
/// - **Call**: Make a single RPC call (unix-friendly JSON output)
/// - **Stream**: Drive a remote generator to completion
#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Serve(ServeArgs),
    Describe(DescribeArgs),
    Call(CallArgs),
    Stream(StreamArgs),
}

/// Arguments for serving the demo backend.
///
/// # Example
///
/// ```bash
/// sockrpc serve -b 0.0.0.0:8000 --step-delay-ms 250
/// ```
#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
/// serve the demo backend
struct ServeArgs {
    /// address to bind to
    ///
    /// Defaults to "127.0.0.1:8000". Port 0 picks a free port; the bound
    /// address is logged at startup.
    #[argh(option, short = 'b', default = "\"127.0.0.1:8000\".into()")]
    bind: String,

    /// transport to listen on: ws or tcp
    #[argh(option, short = 't', default = "ServeTransport::WebSocket")]
    transport: ServeTransport,

    /// pause between countTo steps in milliseconds
    #[argh(option, long = "step-delay-ms", default = "1000")]
    step_delay_ms: u64,
}

/// Arguments for printing a server's description.
#[derive(FromArgs)]
#[argh(subcommand, name = "describe")]
/// print the description of a server
struct DescribeArgs {
    /// address of the server (ws:// or tcp://)
    #[argh(positional)]
    server_address: String,

    /// how long to wait for the description in milliseconds
    #[argh(option, long = "timeout-ms", default = "10000")]
    timeout_ms: u64,
}

/// Arguments for making a single RPC call.
///
/// Outputs raw JSON (no pretty-printing) to stdout. Errors are reported
/// to stderr with non-zero exit code.
///
/// # Examples
///
/// ```bash
/// sockrpc call ws://127.0.0.1:8000/ws greet -a '["world"]'
/// sockrpc call ws://127.0.0.1:8000/ws math.add -a '[1, 2]' | jq .
/// ```
#[derive(FromArgs)]
#[argh(subcommand, name = "call")]
/// call a remote function
struct CallArgs {
    /// address of the server (ws:// or tcp://)
    #[argh(positional)]
    server_address: String,

    /// dot-joined name of the function to call
    #[argh(positional)]
    method: String,

    /// JSON array of arguments
    ///
    /// A single non-array value is passed as the only argument.
    /// Defaults to `[]`.
    #[argh(option, short = 'a', long = "args", default = "\"[]\".into()")]
    args: String,

    /// how long to wait for the description in milliseconds
    #[argh(option, long = "timeout-ms", default = "10000")]
    timeout_ms: u64,
}

/// Arguments for driving a remote generator.
///
/// Each yielded value is printed as one line of JSON, followed by the
/// generator's return value.
#[derive(FromArgs)]
#[argh(subcommand, name = "stream")]
/// stream the values of a remote generator
struct StreamArgs {
    /// address of the server (ws:// or tcp://)
    #[argh(positional)]
    server_address: String,

    /// dot-joined name of the generator
    #[argh(positional)]
    method: String,

    /// JSON array of arguments
    #[argh(option, short = 'a', long = "args", default = "\"[]\".into()")]
    args: String,

    /// how long to wait for the description in milliseconds
    #[argh(option, long = "timeout-ms", default = "10000")]
    timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Only the server logs; client subcommands keep stdout clean for piping
    if matches!(cli.command, Commands::Serve(_)) {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    match cli.command {
        Commands::Serve(args) => run_serve(args).await,
        Commands::Describe(args) => run_describe(args).await,
        Commands::Call(args) => run_call(args).await,
        Commands::Stream(args) => run_stream(args).await,
    }
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let module = demo::backend(Duration::from_millis(args.step_delay_ms));
    tracing::info!("Serving demo backend on {} ({:?})", args.bind, args.transport);

    match args.transport {
        ServeTransport::WebSocket => WebSocketServer::bind(&args.bind, module).await?.run().await?,
        ServeTransport::Tcp => TcpServer::bind(&args.bind, module).await?.run().await?,
    }
    Ok(())
}

/// Connects with the description timeout and the environment overrides
/// applied.
async fn connect(server_address: &str, timeout_ms: u64) -> Result<Client> {
    validate_url(server_address)?;

    let config = ClientConfig::new()
        .with_description_timeout(Duration::from_millis(timeout_ms))
        .with_env_overrides()
        .map_err(anyhow::Error::msg)?;
    Ok(Client::connect_url(server_address, config).await?)
}

async fn run_describe(args: DescribeArgs) -> Result<()> {
    let client = connect(&args.server_address, args.timeout_ms).await?;
    println!("{}", serde_json::to_string_pretty(client.schema())?);
    client.close();
    Ok(())
}

/// Executes the `call` subcommand.
///
/// No tracing is initialized for this command so its stdout can be piped
/// straight into other tools.
async fn run_call(args: CallArgs) -> Result<()> {
    let call_args = parse_args(&args.args)?;
    let client = connect(&args.server_address, args.timeout_ms).await?;

    let result = client.call(&args.method, call_args).await;
    client.close();

    println!("{}", serde_json::to_string(&result?)?);
    Ok(())
}

async fn run_stream(args: StreamArgs) -> Result<()> {
    let call_args = parse_args(&args.args)?;
    let client = connect(&args.server_address, args.timeout_ms).await?;

    let mut call = client.stream(&args.method, call_args)?;
    while let Some(value) = call.next().await {
        println!("{}", serde_json::to_string(&value?)?);
    }
    if let Some(value) = call.return_value() {
        println!("{}", serde_json::to_string(value)?);
    }

    client.close();
    Ok(())
}
