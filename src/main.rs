//! stackwall - netfilter-style packet filtering engine
//!
//! Command-line front end for validating ruleset files, listing their
//! chains, and running probe packets through them.
//!
//! # Usage
//!
//! ```bash
//! stackwall validate ruleset.json             # Check a ruleset file
//! stackwall show                              # List the default tables
//! stackwall show ruleset.json                 # List a ruleset file
//! stackwall check --hook input --dport 22     # Probe the active ruleset
//! stackwall check -c ruleset.json --hook output --protocol udp --dst 10.0.0.53 --dport 53
//! ```
//!
//! `check` exits with 0 when the packet is accepted and 1 when it is
//! dropped. Any other failure exits with 2.

use clap::{Parser, Subcommand};
use stackwall::config::{self, RulesetConfig};
use stackwall::{Firewall, Hook, IpTables, PacketSpec, TransportProtocol, audit};
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use strum::IntoEnumIterator;

shadow_rs::shadow!(build);

const EXIT_DROP: u8 = 1;
const EXIT_ERROR: u8 = 2;

#[derive(Parser)]
#[command(name = "stackwall")]
#[command(version = build::PKG_VERSION, long_version = build::CLAP_LONG_VERSION)]
#[command(about = "Netfilter-style packet filter engine", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate a ruleset file
    Validate {
        /// Path to the ruleset file
        file: PathBuf,
    },
    /// List tables and chains of a ruleset (the active one if no file given)
    Show {
        /// Path to the ruleset file
        file: Option<PathBuf>,
    },
    /// Run a synthesized packet through a ruleset and print the verdict
    Check {
        /// Ruleset file (default: saved ruleset, or built-in defaults)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
        /// Hook to evaluate at (prerouting, input, forward, output, postrouting)
        #[arg(long)]
        hook: Hook,
        /// Transport protocol (tcp, udp, icmp, icmpv6)
        #[arg(short, long, default_value = "tcp")]
        protocol: TransportProtocol,
        /// Source address
        #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
        src: IpAddr,
        /// Destination address
        #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
        dst: IpAddr,
        /// Source port
        #[arg(long, default_value_t = 0)]
        sport: u16,
        /// Destination port
        #[arg(long, default_value_t = 0)]
        dport: u16,
        /// Input interface name
        #[arg(long, value_name = "IFACE")]
        in_iface: Option<String>,
        /// Output interface name
        #[arg(long, value_name = "IFACE")]
        out_iface: Option<String>,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = stackwall::utils::ensure_dirs() {
        tracing::debug!("Could not create data directories: {}", e);
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to create Tokio runtime: {e}");
            return ExitCode::from(EXIT_ERROR);
        }
    };

    match runtime.block_on(handle_cli(cli.command)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(EXIT_ERROR)
        }
    }
}

/// Loads a ruleset file, recording the outcome in the audit log.
async fn load(path: &Path) -> stackwall::Result<RulesetConfig> {
    let display = path.display().to_string();
    match config::load_ruleset(path).await {
        Ok(cfg) => {
            audit::log_load(&display, cfg.rule_count(), None).await;
            Ok(cfg)
        }
        Err(e) => {
            audit::log_load(&display, 0, Some(&e)).await;
            Err(e)
        }
    }
}

/// Resolves the ruleset to use: an explicit file, else the saved ruleset,
/// else the built-in defaults.
async fn resolve_tables(file: Option<PathBuf>) -> stackwall::Result<(String, IpTables)> {
    let path = match file {
        Some(path) => Some(path),
        None => config::default_ruleset_path().filter(|p| p.exists()),
    };

    match path {
        Some(path) => {
            let tables = load(&path).await?.build()?;
            Ok((path.display().to_string(), tables))
        }
        None => Ok(("built-in defaults".to_string(), stackwall::default_tables())),
    }
}

async fn handle_cli(command: Commands) -> Result<ExitCode, Box<dyn std::error::Error>> {
    match command {
        Commands::Validate { file } => {
            let display = file.display().to_string();
            let cfg = load(&file).await?;

            let result = cfg.build().and_then(|tables| {
                tables.validate()?;
                Ok(tables)
            });
            let table_count = cfg.tables.len();
            let rule_count = cfg.rule_count();

            match result {
                Ok(tables) => {
                    audit::log_validate(&display, table_count, rule_count, true, None).await;
                    println!("✓ Ruleset '{display}' is valid");
                    println!("  Tables: {table_count}");
                    println!("  Rules:  {rule_count}");
                    for hook in Hook::iter() {
                        let order = tables.tables_for(hook);
                        if !order.is_empty() {
                            println!("  {:<12} {}", hook.chain_name(), order.join(" -> "));
                        }
                    }
                }
                Err(e) => {
                    let error = Some(e.to_string());
                    audit::log_validate(&display, table_count, rule_count, false, error).await;
                    return Err(format!("Ruleset '{display}' is invalid: {e}").into());
                }
            }
        }
        Commands::Show { file } => {
            let (source, tables) = resolve_tables(file).await?;
            println!("# {source}");
            print!("{tables}");
        }
        Commands::Check {
            config,
            hook,
            protocol,
            src,
            dst,
            sport,
            dport,
            in_iface,
            out_iface,
        } => {
            let (source, tables) = resolve_tables(config).await?;
            let rule_count = tables.rule_count();

            let firewall = match Firewall::new(tables) {
                Ok(firewall) => firewall,
                Err(e) => {
                    audit::log_reject(rule_count, e.to_string()).await;
                    return Err(format!("Ruleset from {source} rejected: {e}").into());
                }
            };
            let snapshot = firewall.snapshot();
            audit::log_install(&snapshot).await;
            tracing::info!(
                "Snapshot {} (generation {}) installed at {}",
                snapshot.id,
                snapshot.generation,
                snapshot.installed_at.to_rfc3339()
            );

            let packet = PacketSpec {
                protocol,
                source: src,
                destination: dst,
                source_port: sport,
                destination_port: dport,
                input_interface: in_iface,
                output_interface: out_iface,
            }
            .build()?;

            if snapshot.check(hook, &packet) {
                println!("ACCEPT");
            } else {
                println!("DROP");
                return Ok(ExitCode::from(EXIT_DROP));
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}
