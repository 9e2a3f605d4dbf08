use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use shell_gate::config::load_config;
use shell_gate::security::DenyListSnapshot;

#[derive(Parser)]
#[command(name = "gate-cli")]
#[command(about = "Management CLI for shell-gate", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a bcrypt hash for a password file entry
    HashPassword {
        username: String,
        password: String,
        #[arg(long, default_value_t = bcrypt::DEFAULT_COST)]
        cost: u32,
    },
    /// Inspect or edit a persisted deny list (stop the gate first)
    DenyList {
        #[arg(short, long)]
        file: PathBuf,
        #[command(subcommand)]
        action: DenyListAction,
    },
    /// Parse and validate a configuration file
    CheckConfig { path: PathBuf },
}

#[derive(Subcommand)]
enum DenyListAction {
    /// List tracked addresses
    Show,
    /// Forget an address
    Remove { address: IpAddr },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::HashPassword {
            username,
            password,
            cost,
        } => {
            let hash = bcrypt::hash(password, cost)?;
            println!("{}:{}", username.to_lowercase(), hash);
        }
        Commands::DenyList { file, action } => {
            let mut snapshot = DenyListSnapshot::load(&file)?;
            match action {
                DenyListAction::Show => {
                    println!("{:<40} {:>8} {:>10}", "ADDRESS", "FAILURES", "IDLE_SECS");
                    let age = snapshot.age_secs();
                    for record in &snapshot.entries {
                        println!(
                            "{:<40} {:>8} {:>10}",
                            record.address,
                            record.failures,
                            record.idle_secs.saturating_add(age)
                        );
                    }
                    println!("{} entries", snapshot.entries.len());
                }
                DenyListAction::Remove { address } => {
                    let address = address.to_canonical();
                    let before = snapshot.entries.len();
                    snapshot
                        .entries
                        .retain(|record| record.address.to_canonical() != address);
                    if snapshot.entries.len() == before {
                        eprintln!("Error: {} is not in the deny list", address);
                        std::process::exit(1);
                    }
                    snapshot.save(&file)?;
                    println!("Removed {}", address);
                }
            }
        }
        Commands::CheckConfig { path } => match load_config(&path) {
            Ok(config) => {
                println!("Configuration OK");
                println!("{}", toml::to_string_pretty(&config)?);
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        },
    }

    Ok(())
}
