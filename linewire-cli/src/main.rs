use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use linewire_cipher::{keys, CipherMode, KeySize, SymmetricCipher};
use linewire_transport::{AesEndpoint, ConcurrencyMode, SocketEndpoint};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 7070;
const DEFAULT_TIMEOUT_MS: u64 = 2000;

#[derive(Debug)]
struct Options {
    host: String,
    port: u16,
    mode: CipherMode,
    iv: Option<String>,
    key: Option<String>,
    pooled: bool,
    message: Option<String>,
    timeout_ms: u64,
    key_size: KeySize,
}

impl Options {
    fn cipher(&self) -> Result<Option<SymmetricCipher>, Box<dyn std::error::Error>> {
        match (&self.iv, &self.key) {
            (Some(iv), Some(key)) => {
                Ok(Some(SymmetricCipher::from_base64(self.mode, iv, key)?))
            }
            (None, None) => Ok(None),
            _ => Err("--iv and --key must be given together".into()),
        }
    }

    fn concurrency(&self) -> ConcurrencyMode {
        if self.pooled {
            ConcurrencyMode::Pooled
        } else {
            ConcurrencyMode::Single
        }
    }
}

fn usage() {
    eprintln!("usage: linewire <command> [options]");
    eprintln!();
    eprintln!("commands:");
    eprintln!("  serve            run an echo server");
    eprintln!("  send             send one message and print the reply");
    eprintln!("  keygen           generate a base64 IV and key");
    eprintln!("  ping             check whether a host accepts connections");
    eprintln!();
    eprintln!("options:");
    eprintln!("  --host <addr>          peer host (default {DEFAULT_HOST})");
    eprintln!("  --port <port>          port (default {DEFAULT_PORT})");
    eprintln!("  --iv <base64>          AES IV; enables encryption with --key");
    eprintln!("  --key <base64>         AES key; enables encryption with --iv");
    eprintln!("  --mode <name>          AES transformation (default AES/CTR/NoPadding)");
    eprintln!("  --pooled               serve accepted peers in parallel");
    eprintln!("  --message <text>       payload for send");
    eprintln!("  --timeout-ms <n>       ping timeout (default {DEFAULT_TIMEOUT_MS})");
    eprintln!("  --bits <n>             key size for keygen: 128, 192 or 256");
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let Some(command) = args.get(1).cloned() else {
        usage();
        return ExitCode::FAILURE;
    };

    let mut options = Options {
        host: DEFAULT_HOST.to_string(),
        port: DEFAULT_PORT,
        mode: CipherMode::Ctr,
        iv: None,
        key: None,
        pooled: false,
        message: None,
        timeout_ms: DEFAULT_TIMEOUT_MS,
        key_size: KeySize::Bits256,
    };

    // Minimal arg parsing
    let mut i = 2;
    while i < args.len() {
        let parse_failure = |flag: &str, value: &str| {
            eprintln!("invalid value for {flag}: {value}");
            ExitCode::FAILURE
        };
        match args[i].as_str() {
            "--host" if i + 1 < args.len() => {
                options.host = args[i + 1].clone();
                i += 1;
            }
            "--port" if i + 1 < args.len() => {
                match args[i + 1].parse() {
                    Ok(port) => options.port = port,
                    Err(_) => return parse_failure("--port", &args[i + 1]),
                }
                i += 1;
            }
            "--iv" if i + 1 < args.len() => {
                options.iv = Some(args[i + 1].clone());
                i += 1;
            }
            "--key" if i + 1 < args.len() => {
                options.key = Some(args[i + 1].clone());
                i += 1;
            }
            "--mode" if i + 1 < args.len() => {
                match CipherMode::from_name(&args[i + 1]) {
                    Ok(mode) => options.mode = mode,
                    Err(e) => {
                        eprintln!("{e}");
                        return ExitCode::FAILURE;
                    }
                }
                i += 1;
            }
            "--pooled" => options.pooled = true,
            "--message" if i + 1 < args.len() => {
                options.message = Some(args[i + 1].clone());
                i += 1;
            }
            "--timeout-ms" if i + 1 < args.len() => {
                match args[i + 1].parse() {
                    Ok(ms) => options.timeout_ms = ms,
                    Err(_) => return parse_failure("--timeout-ms", &args[i + 1]),
                }
                i += 1;
            }
            "--bits" if i + 1 < args.len() => {
                let bits: usize = match args[i + 1].parse() {
                    Ok(bits) => bits,
                    Err(_) => return parse_failure("--bits", &args[i + 1]),
                };
                match KeySize::from_bits(bits) {
                    Ok(size) => options.key_size = size,
                    Err(e) => {
                        eprintln!("{e}");
                        return ExitCode::FAILURE;
                    }
                }
                i += 1;
            }
            other => {
                eprintln!("unknown option: {other}");
                usage();
                return ExitCode::FAILURE;
            }
        }
        i += 1;
    }

    let outcome = match command.as_str() {
        "serve" => serve(&options).await,
        "send" => send(&options).await,
        "keygen" => keygen(&options),
        "ping" => ping(&options).await,
        _ => {
            usage();
            return ExitCode::FAILURE;
        }
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn serve(options: &Options) -> Result<(), Box<dyn std::error::Error>> {
    match options.cipher()? {
        Some(cipher) => serve_encrypted(options, cipher).await,
        None => serve_plain(options).await,
    }
}

async fn serve_plain(options: &Options) -> Result<(), Box<dyn std::error::Error>> {
    let endpoint = Arc::new(SocketEndpoint::server(options.concurrency()));
    let routine_side = endpoint.clone();
    let port = endpoint
        .start_listener(options.port, move || {
            let endpoint = routine_side.clone();
            async move {
                while endpoint.continue_listening() {
                    let Ok(connection) = endpoint.accept_request().await else { break };
                    match endpoint.read_content_from(&connection).await {
                        Ok(Some(request)) => {
                            info!(peer = %connection.peer_addr(), "request received");
                            if let Err(e) = endpoint.write_content_to(&connection, request).await
                            {
                                error!("reply failed: {e}");
                            }
                        }
                        Ok(None) => {}
                        Err(e) => error!("read failed: {e}"),
                    }
                }
            }
        })
        .await?;

    info!(port, "plain echo server listening");
    tokio::signal::ctrl_c().await?;
    endpoint.stop_listener();
    Ok(())
}

async fn serve_encrypted(
    options: &Options,
    cipher: SymmetricCipher,
) -> Result<(), Box<dyn std::error::Error>> {
    let endpoint = Arc::new(AesEndpoint::server(options.concurrency(), cipher));
    let routine_side = endpoint.clone();
    let port = endpoint
        .start_listener(options.port, move || {
            let endpoint = routine_side.clone();
            async move {
                while endpoint.continue_listening() {
                    let Ok(connection) = endpoint.accept_request().await else { break };
                    match endpoint.read_content_from(&connection).await {
                        Ok(Some(request)) => {
                            info!(peer = %connection.peer_addr(), "request received");
                            if let Err(e) = endpoint.write_content_to(&connection, request).await
                            {
                                error!("reply failed: {e}");
                            }
                        }
                        Ok(None) => {}
                        Err(e) => error!("read failed: {e}"),
                    }
                }
            }
        })
        .await?;

    info!(port, mode = %options.mode, "encrypted echo server listening");
    tokio::signal::ctrl_c().await?;
    endpoint.stop_listener();
    Ok(())
}

async fn send(options: &Options) -> Result<(), Box<dyn std::error::Error>> {
    let message = options.message.clone().ok_or("send requires --message")?;
    let reply = match options.cipher()? {
        Some(cipher) => {
            let client = AesEndpoint::client(options.host.clone(), options.port, cipher);
            client.write_content(message).await?;
            client.read_content().await?
        }
        None => {
            let client = SocketEndpoint::client(options.host.clone(), options.port);
            client.write_content(message).await?;
            client.read_content().await?
        }
    };
    match reply {
        Some(reply) => println!("{reply}"),
        None => println!("(connection closed without a reply)"),
    }
    Ok(())
}

fn keygen(options: &Options) -> Result<(), Box<dyn std::error::Error>> {
    println!("iv:  {}", keys::generate_base64_iv());
    println!("key: {}", keys::generate_base64_key(options.key_size));
    Ok(())
}

async fn ping(options: &Options) -> Result<(), Box<dyn std::error::Error>> {
    let reachable = SocketEndpoint::ping_host(
        &options.host,
        options.port,
        Duration::from_millis(options.timeout_ms),
    )
    .await;
    println!(
        "{}:{} is {}",
        options.host,
        options.port,
        if reachable { "reachable" } else { "unreachable" }
    );
    Ok(())
}
