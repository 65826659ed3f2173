// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Zapdesk - multi-tenant message dispatch and ticket lifecycle service.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod contacts;
mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use zapdesk_config::ZapdeskConfig;

/// Zapdesk - multi-tenant message dispatch and ticket lifecycle service.
#[derive(Parser, Debug)]
#[command(name = "zapdesk", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the dispatch workers until SIGINT/SIGTERM.
    Serve {
        /// Log event bus traffic of this tenant at debug level. Repeatable.
        #[arg(long = "tenant")]
        tenants: Vec<i64>,
    },
    /// List a tenant's contacts as JSON.
    Contacts {
        #[arg(long)]
        tenant: i64,
        /// Case-insensitive substring of the contact name.
        #[arg(long)]
        name: Option<String>,
        /// Lower creation bound (ISO-8601). Used only together with --to.
        #[arg(long)]
        from: Option<String>,
        /// Upper creation bound (ISO-8601). Used only together with --from.
        #[arg(long)]
        to: Option<String>,
    },
    /// Manage Zapdesk configuration.
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Load and validate the configuration, then print a summary.
    Check,
}

fn load_config(path: Option<&PathBuf>) -> Result<ZapdeskConfig, Vec<zapdesk_config::ConfigError>> {
    match path {
        Some(path) => zapdesk_config::load_and_validate_path(path),
        None => zapdesk_config::load_and_validate(),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_ref()) {
        Ok(config) => config,
        Err(errors) => {
            zapdesk_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Some(Commands::Serve { tenants }) => serve::run_serve(config, tenants).await,
        Some(Commands::Contacts {
            tenant,
            name,
            from,
            to,
        }) => {
            let filter = zapdesk_core::types::ContactFilter {
                tenant_id: tenant,
                name,
                created_from: from,
                created_to: to,
            };
            contacts::run_contacts(&config, &filter).await
        }
        Some(Commands::Config {
            action: ConfigCommand::Check,
        }) => {
            print_config_summary(&config);
            Ok(())
        }
        None => {
            println!("zapdesk: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn print_config_summary(config: &ZapdeskConfig) {
    println!("zapdesk: config ok (service.name={})", config.service.name);
    println!("  database      {}", config.storage.database_path);
    println!(
        "  queue         {} workers, {} attempts, {:?} backoff",
        config.queue.workers, config.queue.max_attempts, config.queue.backoff
    );
    println!(
        "  tickets       queueing={}, auto-close after {}ms",
        config.tickets.queueing_enabled, config.tickets.auto_close_delay_ms
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        // Only jemalloc supports advancing the epoch.
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    fn binary_loads_config_defaults() {
        let config = zapdesk_config::load_and_validate_str("")
            .expect("default config should be valid");
        assert_eq!(config.service.name, "zapdesk");
    }

    #[test]
    fn cli_parses_contacts_filter() {
        let cli = Cli::try_parse_from([
            "zapdesk", "contacts", "--tenant", "7", "--name", "ana", "--from",
            "2026-01-01T00:00:00Z", "--to", "2026-02-01T00:00:00Z",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Contacts {
                tenant, name, from, to,
            }) => {
                assert_eq!(tenant, 7);
                assert_eq!(name.as_deref(), Some("ana"));
                assert!(from.is_some() && to.is_some());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_parses_repeated_serve_tenants() {
        let cli = Cli::try_parse_from(["zapdesk", "serve", "--tenant", "1", "--tenant", "2"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Serve { ref tenants }) if tenants == &vec![1, 2]
        ));
    }

    #[test]
    fn cli_parses_config_check_with_global_path() {
        let cli = Cli::try_parse_from(["zapdesk", "config", "check", "--config", "/tmp/z.toml"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/z.toml")));
        assert!(matches!(
            cli.command,
            Some(Commands::Config {
                action: ConfigCommand::Check
            })
        ));
    }
}
