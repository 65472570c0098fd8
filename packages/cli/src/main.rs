//! `apconform` — protocol conformance suite command-line interface.
//!
//! - **`run`** — serve simulated actors and run one supervised session,
//!   talking to the operator in JSON lines over stdin/stdout.
//! - **`traverse`** — print the member identifiers of a remote collection.
//! - **`sign`** — print the headers that would sign a request.
//!
//! Logs go to stderr; stdout belongs to the session transport.
//!
//! # Environment variables
//!
//! `run` reads its defaults through [`EngineConfig::from_env`]; any flag
//! given on the command line overrides the environment.

mod stdio;

use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use apconform::{SignableRequest, SignedIdentity, SigningKeypair};
use apconform_engine::{
    AuthenticatedClient, CollectionWalker, EngineConfig, EngineContext, Operator, TestSession,
};
use clap::{Parser, Subcommand};
use reqwest::Url;
use tracing::info;

use stdio::StdioOperator;

/// apconform — ActivityPub client-to-server conformance suite
#[derive(Parser)]
#[command(name = "apconform", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one supervised test session.
    ///
    /// Simulated actors are served on --bind and advertised under
    /// --public-base, which the server under test must be able to reach.
    Run {
        /// Listener for simulated actor routes [env: APCONFORM_BIND].
        #[arg(long, value_name = "ADDR")]
        bind: Option<SocketAddr>,

        /// Externally reachable base URL of the listener [env: APCONFORM_PUBLIC_BASE].
        #[arg(long, value_name = "URL")]
        public_base: Option<String>,

        /// Attempts for eventual-consistency polling [env: APCONFORM_POLL_ATTEMPTS].
        #[arg(long, value_name = "N")]
        poll_attempts: Option<u32>,

        /// Delay between polling attempts [env: APCONFORM_POLL_DELAY_MS].
        #[arg(long, value_name = "MS")]
        poll_delay_ms: Option<u64>,

        /// Upper bound on identifiers read from one collection [env: APCONFORM_MAX_COLLECTION_ITEMS].
        #[arg(long, value_name = "N")]
        max_items: Option<usize>,

        /// PEM private key for simulated actors. Generated when absent.
        #[arg(long, env = "APCONFORM_KEY", value_name = "FILE")]
        key: Option<PathBuf>,

        /// Write the report here instead of stdout.
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,
    },

    /// Print every member identifier of a collection, one per line.
    Traverse {
        uri: String,

        /// Stop after this many identifiers.
        #[arg(long, default_value_t = 1000)]
        max: usize,

        /// Bearer token to present.
        #[arg(long, env = "APCONFORM_TOKEN")]
        token: Option<String>,
    },

    /// Sign a request and print the resulting headers.
    ///
    /// Example:
    ///   apconform sign --key key.pem --key-id https://me.example/a#main-key \
    ///     --method POST --url https://them.example/inbox --body activity.json
    Sign {
        /// PEM private key (PKCS#8 or PKCS#1).
        #[arg(long, value_name = "FILE")]
        key: PathBuf,

        #[arg(long, value_name = "URI")]
        key_id: String,

        #[arg(long, default_value = "GET")]
        method: String,

        #[arg(long, value_name = "URL")]
        url: String,

        /// File whose bytes form the request body.
        #[arg(long, value_name = "FILE")]
        body: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "apconform_engine=info,tower_http=debug".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            bind,
            public_base,
            poll_attempts,
            poll_delay_ms,
            max_items,
            key,
            report,
        } => {
            let mut config =
                EngineConfig::from_env().unwrap_or_else(|e| fatal(&format!("configuration: {e}")));
            if let Some(bind) = bind {
                config.bind_addr = bind;
                if public_base.is_none() && std::env::var("APCONFORM_PUBLIC_BASE").is_err() {
                    config.public_base = format!("http://{bind}");
                }
            }
            if let Some(base) = public_base {
                config.public_base = base.trim_end_matches('/').to_string();
            }
            if let Some(n) = poll_attempts {
                config.retry.attempts = n;
            }
            if let Some(ms) = poll_delay_ms {
                config.retry.delay = Duration::from_millis(ms);
            }
            if let Some(n) = max_items {
                config.max_collection_items = n;
            }
            run(config, key, report).await;
        }

        Command::Traverse { uri, max, token } => {
            let mut client = AuthenticatedClient::anonymous(reqwest::Client::new());
            if let Some(token) = token {
                client = client.with_bearer(token);
            }
            let mut walker = CollectionWalker::new(&client, uri.as_str(), max);
            loop {
                match walker.next().await {
                    Ok(Some(id)) => println!("{id}"),
                    Ok(None) => break,
                    Err(e) => fatal(&format!("traversal of {uri} failed: {e}")),
                }
            }
        }

        Command::Sign {
            key,
            key_id,
            method,
            url,
            body,
        } => {
            let keypair = load_key(&key);
            let parsed = Url::parse(&url).unwrap_or_else(|e| fatal(&format!("invalid --url: {e}")));
            let host = parsed
                .host_str()
                .unwrap_or_else(|| fatal("--url has no host"));
            let authority = match parsed.port() {
                Some(port) => format!("{host}:{port}"),
                None => host.to_string(),
            };
            let path = match parsed.query() {
                Some(q) => format!("{}?{q}", parsed.path()),
                None => parsed.path().to_string(),
            };

            let mut request = SignableRequest::new(method.to_ascii_uppercase(), path, authority);
            if let Some(body) = body {
                let bytes = fs::read(&body)
                    .unwrap_or_else(|e| fatal(&format!("failed to read {}: {e}", body.display())));
                request = request.with_body(bytes);
            }
            SignedIdentity::new(key_id, Arc::new(keypair))
                .sign(&mut request)
                .unwrap_or_else(|e| fatal(&format!("signing failed: {e}")));
            for (name, value) in request.headers() {
                println!("{name}: {value}");
            }
        }
    }
}

async fn run(config: EngineConfig, key: Option<PathBuf>, report_path: Option<PathBuf>) {
    let keypair = match key {
        Some(path) => load_key(&path),
        None => {
            info!("keys: generating {}-bit RSA keypair for simulated actors", config.key_bits);
            SigningKeypair::generate(config.key_bits)
                .unwrap_or_else(|e| fatal(&format!("key generation failed: {e}")))
        }
    };

    let bind_addr = config.bind_addr;
    let ctx = EngineContext::new(config, Arc::new(keypair))
        .unwrap_or_else(|e| fatal(&format!("failed to build HTTP client: {e}")));

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .unwrap_or_else(|e| fatal(&format!("failed to bind {bind_addr}: {e}")));
    info!(
        "listening on {bind_addr}; simulated actors under {}",
        ctx.config().public_base
    );
    let app = ctx.router();
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("server error: {e}");
        }
    });

    let operator: Arc<dyn Operator> = Arc::new(StdioOperator::new());
    let report = match TestSession::new(ctx, operator).run().await {
        Ok(report) => report,
        Err(e) if e.is_session_closed() => {
            info!("session: operator left before the session finished; no report written");
            return;
        }
        Err(e) => fatal(&format!("session failed: {e}")),
    };

    let json = serde_json::to_string_pretty(&report)
        .unwrap_or_else(|e| fatal(&format!("failed to serialise report: {e}")));
    match report_path {
        Some(path) => {
            fs::write(&path, json)
                .unwrap_or_else(|e| fatal(&format!("failed to write {}: {e}", path.display())));
            info!("report written to {}", path.display());
        }
        None => println!("{json}"),
    }
}

fn load_key(path: &PathBuf) -> SigningKeypair {
    let pem = fs::read_to_string(path)
        .unwrap_or_else(|e| fatal(&format!("failed to read {}: {e}", path.display())));
    SigningKeypair::from_pem(&pem)
        .unwrap_or_else(|e| fatal(&format!("invalid key in {}: {e}", path.display())))
}

/// Print an error message to stderr and exit with code 2.
fn fatal(msg: &str) -> ! {
    eprintln!("apconform: {msg}");
    process::exit(2);
}
