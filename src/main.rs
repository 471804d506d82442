//! mcrelay - Backend Probe Tool
//!
//! A small diagnostic client over the backend handler: dials one memcached
//! node the way the proxy's pool would, issues a single command, and prints
//! the raw reply. Useful for checking a backend (and this crate's wire
//! handling) from the shell.

use anyhow::{bail, Context};
use mcrelay::pool::{BackendConfig, Dialer};
use mcrelay::protocol::{McRequest, Request};
use mcrelay::stats::NoopStats;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

/// Probe configuration
struct Config {
    /// Backend address to dial
    addr: String,
    /// Cluster identity for stats tagging
    cluster: String,
    /// Deadline applied to dial, read, and write, in milliseconds
    timeout_ms: u64,
    /// Command tokens left after option parsing
    command: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: format!("127.0.0.1:{}", mcrelay::DEFAULT_BACKEND_PORT),
            cluster: "probe".to_string(),
            timeout_ms: 1000,
            command: Vec::new(),
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--addr" | "-a" => {
                    if i + 1 < args.len() {
                        config.addr = args[i + 1].clone();
                        i += 2;
                    } else {
                        eprintln!("Error: --addr requires a value");
                        std::process::exit(1);
                    }
                }
                "--cluster" | "-c" => {
                    if i + 1 < args.len() {
                        config.cluster = args[i + 1].clone();
                        i += 2;
                    } else {
                        eprintln!("Error: --cluster requires a value");
                        std::process::exit(1);
                    }
                }
                "--timeout" | "-t" => {
                    if i + 1 < args.len() {
                        config.timeout_ms = args[i + 1].parse().unwrap_or_else(|_| {
                            eprintln!("Error: invalid timeout");
                            std::process::exit(1);
                        });
                        i += 2;
                    } else {
                        eprintln!("Error: --timeout requires a value");
                        std::process::exit(1);
                    }
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("mcrelay version {}", mcrelay::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    // first non-option token starts the command
                    config.command = args[i..].to_vec();
                    break;
                }
            }
        }

        config
    }
}

fn print_help() {
    println!(
        r#"
mcrelay - Backend Probe Tool for a Memcached Proxy

USAGE:
    mcrelay [OPTIONS] <COMMAND>

OPTIONS:
    -a, --addr <ADDR>        Backend address (default: 127.0.0.1:11211)
    -c, --cluster <NAME>     Cluster tag for stats (default: probe)
    -t, --timeout <MS>       Dial/read/write deadline in ms (default: 1000)
    -v, --version            Print version information
        --help               Print this help message

COMMANDS:
    get <key>                    Retrieve a value
    gets <key>                   Retrieve a value with its cas token
    gat <key> <exptime>          Retrieve and touch
    gats <key> <exptime>         Retrieve and touch, with cas token
    set <key> <value>            Store a value
    add <key> <value>            Store only if absent
    replace <key> <value>        Store only if present
    append <key> <value>         Append to an existing value
    prepend <key> <value>        Prepend to an existing value
    cas <key> <token> <value>    Compare-and-swap store
    delete <key>                 Remove a key
    incr <key> <delta>           Increment a counter
    decr <key> <delta>           Decrement a counter
    touch <key> <exptime>        Update a key's expiry

EXAMPLES:
    mcrelay set greeting hello
    mcrelay get greeting
    mcrelay -a 10.0.0.7:11211 incr pageviews 1
"#
    );
}

/// Returns the i-th command token or a usage error.
fn arg(tokens: &[String], i: usize) -> anyhow::Result<&str> {
    tokens
        .get(i)
        .map(|s| s.as_str())
        .context("missing argument (try --help)")
}

/// Builds a request from the command tokens.
fn build_request(tokens: &[String]) -> anyhow::Result<Request> {
    if tokens.is_empty() {
        bail!("no command given (try --help)");
    }
    let key = |i: usize| arg(tokens, i).map(str::to_string);
    let num = |i: usize| -> anyhow::Result<i64> { Ok(arg(tokens, i)?.parse()?) };

    let req = match tokens[0].as_str() {
        "get" => McRequest::get(key(1)?)?,
        "gets" => McRequest::gets(key(1)?)?,
        "gat" => McRequest::gat(key(1)?, num(2)?)?,
        "gats" => McRequest::gats(key(1)?, num(2)?)?,
        "set" => McRequest::set(key(1)?, 0, 0, arg(tokens, 2)?.as_bytes())?,
        "add" => McRequest::add(key(1)?, 0, 0, arg(tokens, 2)?.as_bytes())?,
        "replace" => McRequest::replace(key(1)?, 0, 0, arg(tokens, 2)?.as_bytes())?,
        "append" => McRequest::append(key(1)?, 0, 0, arg(tokens, 2)?.as_bytes())?,
        "prepend" => McRequest::prepend(key(1)?, 0, 0, arg(tokens, 2)?.as_bytes())?,
        "cas" => McRequest::cas(
            key(1)?,
            0,
            0,
            arg(tokens, 2)?.parse()?,
            arg(tokens, 3)?.as_bytes(),
        )?,
        "delete" => McRequest::delete(key(1)?)?,
        "incr" => McRequest::incr(key(1)?, arg(tokens, 2)?.parse()?)?,
        "decr" => McRequest::decr(key(1)?, arg(tokens, 2)?.parse()?)?,
        "touch" => McRequest::touch(key(1)?, num(2)?)?,
        other => bail!("unknown command '{}' (try --help)", other),
    };
    Ok(Request::memcache(req))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_args();

    // Set up logging
    let _subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let req = build_request(&config.command)?;

    let timeout = Duration::from_millis(config.timeout_ms);
    let backend = BackendConfig::new(config.cluster.clone(), config.addr.clone())
        .with_timeouts(timeout, timeout, timeout);
    let dialer = Dialer::new(backend, Arc::new(NoopStats));

    let mut handler = dialer
        .dial()
        .await
        .with_context(|| format!("dial {}", config.addr))?;
    debug!(addr = %config.addr, "Connected");

    let resp = handler.handle(&req).await?;
    let data = resp.as_memcache().context("non-memcached response")?.data();
    print!("{}", String::from_utf8_lossy(data));

    handler.close().await?;
    Ok(())
}
