//! sigrelay CLI tool
//!
//! Key generation, one-shot signing and verification, an interactive chat
//! over a relay server, and the primitive throughput benchmark.

use clap::{Parser, Subcommand};
use sigrelay::{
    bench::{Algorithm, BenchmarkHarness, BenchmarkResult, ResultSet, TrackingAllocator},
    config::{BenchConfig, SessionConfig},
    crypto::{KeyManager, DEFAULT_KEY_BITS},
    message::{EnvelopeId, EnvelopeIdGenerator, Identity, MessageEnvelope, VerificationStatus},
    relay::ConnectionState,
    session::ChatSession,
    sink::{Notification, Severity, UiSink},
    transport::WebSocketTransport,
    VerificationEngine,
};
use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[global_allocator]
static ALLOCATOR: TrackingAllocator = TrackingAllocator::new();

/// sigrelay: signed messages over an unauthenticated relay
#[derive(Parser)]
#[command(name = "sigrelay")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a key pair and print its public half
    Keygen {
        /// RSA modulus size
        #[arg(short, long, default_value_t = DEFAULT_KEY_BITS)]
        bits: usize,
    },

    /// Sign a message with a fresh key pair and print the envelope as JSON
    Sign {
        /// Message text, signed exactly as given
        text: String,

        /// Claimed author label
        #[arg(short, long, default_value = "sender")]
        author: String,

        /// RSA modulus size
        #[arg(short, long, default_value_t = DEFAULT_KEY_BITS)]
        bits: usize,
    },

    /// Verify an envelope read from a JSON file (or stdin)
    Verify {
        /// Envelope file; reads stdin when omitted
        file: Option<PathBuf>,
    },

    /// Chat with a peer through a relay server
    Chat {
        /// Relay URL
        #[arg(short, long, default_value = "ws://127.0.0.1:4000")]
        relay: String,

        /// Your label
        #[arg(short, long)]
        name: String,

        /// Peer label
        #[arg(short, long)]
        peer: String,

        /// RSA modulus size
        #[arg(short, long, default_value_t = DEFAULT_KEY_BITS)]
        bits: usize,
    },

    /// Benchmark ciphers, hashes and signatures at increasing load
    Bench {
        /// Iteration tiers, comma separated
        #[arg(short, long, value_delimiter = ',')]
        tiers: Option<Vec<u64>>,

        /// Algorithms, comma separated (e.g. aes-256-gcm,blake3)
        #[arg(short, long, value_delimiter = ',')]
        algorithms: Option<Vec<Algorithm>>,

        /// Input text fed to every algorithm
        #[arg(long)]
        text: Option<String>,

        /// Print the result set as JSON when done
        #[arg(long)]
        json: bool,
    },
}

/// Prints everything the core reports to the terminal
struct TerminalSink;

impl UiSink for TerminalSink {
    fn on_verification_status_changed(&self, id: EnvelopeId, status: VerificationStatus) {
        println!("  [{}] signature {}", id, status);
    }

    fn on_benchmark_row_added(&self, result: &BenchmarkResult) {
        println!("{}", format_row(result));
    }

    fn on_notify(&self, notification: &Notification) {
        match notification.severity {
            Severity::Error => eprintln!("! {}", notification.message),
            Severity::Success => println!("+ {}", notification.message),
            Severity::Info => println!("* {}", notification.message),
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Keygen { bits } => cmd_keygen(bits).await,
        Commands::Sign { text, author, bits } => cmd_sign(&text, &author, bits).await,
        Commands::Verify { file } => cmd_verify(file),
        Commands::Chat {
            relay,
            name,
            peer,
            bits,
        } => cmd_chat(&relay, &name, &peer, bits).await,
        Commands::Bench {
            tiers,
            algorithms,
            text,
            json,
        } => cmd_bench(tiers, algorithms, text, json).await,
    }
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("Error: {}", message);
    std::process::exit(1);
}

async fn cmd_keygen(bits: usize) {
    let started = Instant::now();
    let keys = KeyManager::new(bits)
        .generate_key_pair()
        .await
        .unwrap_or_else(|e| fail(e));

    println!("{}", keys.public_key());
    println!("Fingerprint: {}", keys.public_key().fingerprint());
    println!("Generated in {:.2?}", started.elapsed());
    println!();
    println!("The private key is not persisted and is gone when this process exits.");
}

async fn cmd_sign(text: &str, author: &str, bits: usize) {
    let keys = KeyManager::new(bits)
        .generate_key_pair()
        .await
        .unwrap_or_else(|e| fail(e));

    let envelope = MessageEnvelope::sign(
        EnvelopeIdGenerator::new().next_id(),
        text,
        &keys,
        Identity::new(author),
        None,
    )
    .unwrap_or_else(|e| fail(e));

    let json = serde_json::to_string_pretty(&envelope).unwrap_or_else(|e| fail(e));
    println!("{}", json);
}

fn cmd_verify(file: Option<PathBuf>) {
    let json = match file {
        Some(path) => fs::read_to_string(&path)
            .unwrap_or_else(|e| fail(format!("cannot read {:?}: {}", path, e))),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .unwrap_or_else(|e| fail(e));
            buf
        }
    };

    let envelope: MessageEnvelope =
        serde_json::from_str(&json).unwrap_or_else(|e| fail(format!("not an envelope: {}", e)));

    println!("Key fingerprint: {}", envelope.sender_public_key().fingerprint());
    match VerificationEngine::check(&envelope) {
        Ok(()) => println!("Signature VALID"),
        Err(e) => {
            println!("Signature INVALID ({})", e);
            std::process::exit(2);
        }
    }
}

async fn cmd_chat(relay: &str, name: &str, peer: &str, bits: usize) {
    let transport = WebSocketTransport::connect(relay)
        .await
        .unwrap_or_else(|e| fail(e));

    let config = SessionConfig::new(name, peer).with_key_bits(bits);
    let mut session =
        ChatSession::new(config, Box::new(transport), Arc::new(TerminalSink)).unwrap_or_else(|e| fail(e));

    println!("=== sigrelay chat ===");
    println!("You are {} talking to {} via {}", name, peer, relay);
    println!();
    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if !handle_line(&mut session, &line).await {
                            break;
                        }
                    }
                    _ => break,
                }
            }

            received = session.receive_next() => {
                match received {
                    Ok(Some(id)) => {
                        if let Some(envelope) = session.store().get(id) {
                            print_envelope(&envelope);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        debug!(error = %e, "receive failed");
                        if session.connection_state() == ConnectionState::Disconnected {
                            eprintln!("Relay connection closed.");
                            break;
                        }
                    }
                }
            }
        }
    }

    let _ = session.disconnect().await;
}

fn print_help() {
    println!("Commands:");
    println!("  /keys           - Generate keys and share the public key");
    println!("  /announce       - Share the public key again");
    println!("  /verify <id>    - Verify a received message");
    println!("  /list           - Show all messages");
    println!("  /help           - Show this help");
    println!("  /quit           - Exit");
    println!("Anything else is signed and sent.");
    println!();
}

fn print_envelope(envelope: &MessageEnvelope) {
    let author = envelope
        .author()
        .map(Identity::as_str)
        .unwrap_or("unknown");
    println!(
        "[{}] {}: {} ({})",
        envelope.id(),
        author,
        envelope.text(),
        envelope.verification_status()
    );
}

/// Returns false when the user asked to quit
async fn handle_line(session: &mut ChatSession, line: &str) -> bool {
    // Session errors have already been shown through the sink
    let command = line.trim();
    match command.split_once(' ').unwrap_or((command, "")) {
        ("/quit", _) => return false,
        ("/help", _) => print_help(),
        ("/keys", _) => {
            if let Ok(public_key) = session.generate_keys().await {
                println!("Public key fingerprint: {}", public_key.fingerprint());
            }
        }
        ("/announce", _) => {
            let _ = session.announce_key().await;
        }
        ("/verify", arg) => match arg.trim().parse::<u64>() {
            Ok(raw) => {
                let _ = session.verify(EnvelopeId::new(raw));
            }
            Err(_) => eprintln!("Usage: /verify <id>"),
        },
        ("/list", _) => {
            for envelope in session.store().snapshot() {
                print_envelope(&envelope);
            }
        }
        _ if command.starts_with('/') => println!("Unknown command. Use /help"),
        _ => {
            if let Ok(id) = session.send_message(line).await {
                println!("[{}] sent", id);
            }
        }
    }
    true
}

async fn cmd_bench(
    tiers: Option<Vec<u64>>,
    algorithms: Option<Vec<Algorithm>>,
    text: Option<String>,
    json: bool,
) {
    let mut config = BenchConfig::default();
    if let Some(tiers) = tiers {
        config.tiers = tiers;
    }
    if let Some(algorithms) = algorithms {
        config.algorithms = algorithms;
    }
    let input = text.unwrap_or_else(|| config.input.clone());
    let tiers = config.tiers.clone();

    let harness = BenchmarkHarness::new(config, Arc::new(TerminalSink))
        .unwrap_or_else(|e| fail(e))
        .with_memory_probe(&ALLOCATOR);

    println!(
        "{:<20} {:>10} {:>16} {:>14}",
        "Algorithm", "Iterations", "Time/op (ms)", "Memory (KB)"
    );

    let results = harness.run(&input).await.unwrap_or_else(|e| fail(e));

    println!();
    print_summary(&results, &tiers, &harness.algorithm_names());

    if json {
        let out = serde_json::to_string_pretty(&results).unwrap_or_else(|e| fail(e));
        println!("{}", out);
    }
}

fn format_row(row: &BenchmarkResult) -> String {
    let mut line = format!(
        "{:<20} {:>10} {:>16} {:>14}",
        row.algorithm,
        row.iterations,
        format!("{:.6}", row.time_per_op_ms),
        format!("{:.2}", row.memory_delta_kb),
    );
    if let Some(error) = &row.error {
        line.push_str(&format!("  ({})", error));
    }
    line
}

/// Time per op of every algorithm across tiers, one column per tier
fn print_summary(results: &ResultSet, tiers: &[u64], algorithms: &[&str]) {
    print!("{:<20}", "Time/op (ms)");
    for tier in tiers {
        print!(" {:>12}", tier);
    }
    println!();

    for algorithm in algorithms {
        print!("{:<20}", algorithm);
        for cell in results.time_series(algorithm, tiers) {
            match cell {
                Some(ms) => print!(" {:>12.6}", ms),
                None => print!(" {:>12}", "-"),
            }
        }
        println!();
    }
}
