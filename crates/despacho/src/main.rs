// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! despacho - WhatsApp order confirmation and inventory ledger service.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod credentials;
mod send;
mod serve;
mod shutdown;

use clap::{Parser, Subcommand};
use despacho_config::model::DespachoConfig;
use despacho_core::DespachoError;

/// despacho - WhatsApp order confirmation and inventory ledger service.
#[derive(Parser, Debug)]
#[command(name = "despacho", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the webhook gateway, order consumer and background sweepers.
    Serve,
    /// Inspect configuration.
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
    /// Manage per-business WhatsApp credentials in the vault.
    Credentials {
        #[command(subcommand)]
        action: CredentialsCommands,
    },
    /// Vault maintenance.
    Vault {
        #[command(subcommand)]
        action: VaultCommands,
    },
    /// Send the cash-on-delivery confirmation template for an order.
    SendConfirmation(send::ConfirmationArgs),
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Validate configuration and print the effective settings.
    Check,
}

#[derive(Subcommand, Debug)]
enum CredentialsCommands {
    /// Store a business's phone number id and access token.
    ///
    /// The token is read from DESPACHO_WHATSAPP_TOKEN or prompted for.
    Set {
        #[arg(long)]
        business_id: i64,
        #[arg(long)]
        phone_number_id: String,
    },
    /// Remove a business's phone number id and access token.
    Delete {
        #[arg(long)]
        business_id: i64,
    },
    /// List stored secrets with masked values.
    List,
}

#[derive(Subcommand, Debug)]
enum VaultCommands {
    /// Re-wrap the master key under a new passphrase.
    ///
    /// The new passphrase is read from DESPACHO_VAULT_NEW_KEY or prompted for.
    ChangePassphrase,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match despacho_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            despacho_config::render_errors(&errors);
            std::process::exit(1);
        }
    };
    serve::init_tracing(&config.service.log_level);

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Config {
            action: ConfigCommands::Check,
        }) => {
            print_config_summary(&config);
            Ok(())
        }
        Some(Commands::Credentials { action }) => match action {
            CredentialsCommands::Set {
                business_id,
                phone_number_id,
            } => credentials::run_set(&config, business_id, &phone_number_id).await,
            CredentialsCommands::Delete { business_id } => {
                credentials::run_delete(&config, business_id).await
            }
            CredentialsCommands::List => credentials::run_list(&config).await,
        },
        Some(Commands::Vault {
            action: VaultCommands::ChangePassphrase,
        }) => credentials::run_change_passphrase(&config).await,
        Some(Commands::SendConfirmation(args)) => send::run_send_confirmation(&config, &args)
            .await
            .map(|receipt| {
                println!(
                    "sent {} (conversation {})",
                    receipt.message_id, receipt.conversation_id
                );
            }),
        None => {
            println!("despacho: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        report(&e);
        std::process::exit(1);
    }
}

fn report(error: &DespachoError) {
    eprintln!("error [{}]: {error}", error.code());
}

fn configured(value: &Option<String>) -> &'static str {
    if value.is_some() { "set" } else { "not set" }
}

fn print_config_summary(config: &DespachoConfig) {
    println!("configuration OK");
    println!("  storage.database_path        {}", config.storage.database_path);
    println!("  whatsapp.api_base_url        {}", config.whatsapp.api_base_url);
    println!("  whatsapp.verify_token        {}", configured(&config.whatsapp.verify_token));
    println!("  whatsapp.app_secret          {}", configured(&config.whatsapp.app_secret));
    println!(
        "  whatsapp.conversation_ttl    {}h",
        config.whatsapp.conversation_ttl_hours
    );
    println!("  broker.url                   {}", configured(&config.broker.url));
    println!(
        "  inventory.cache              {} (ttl {}s)",
        if config.inventory.cache_enabled { "enabled" } else { "disabled" },
        config.inventory.cache_ttl_secs
    );
    println!("  alerts.enabled               {}", config.alerts.enabled);
    if config.gateway.enabled {
        println!(
            "  gateway                      {}:{}",
            config.gateway.host, config.gateway.port
        );
    } else {
        println!("  gateway                      disabled");
    }
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
    #[serial_test::serial]
    fn binary_loads_config_defaults() {
        let config = despacho_config::load_and_validate().expect("default config should be valid");
        assert_eq!(config.service.log_level, "info");
        assert_eq!(config.whatsapp.conversation_ttl_hours, 24);
        assert!(config.broker.url.is_none());
    }

    #[test]
    fn cli_parses_credentials_set() {
        let cli = Cli::try_parse_from([
            "despacho",
            "credentials",
            "set",
            "--business-id",
            "7",
            "--phone-number-id",
            "1234567890",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Credentials {
                action:
                    CredentialsCommands::Set {
                        business_id,
                        phone_number_id,
                    },
            }) => {
                assert_eq!(business_id, 7);
                assert_eq!(phone_number_id, "1234567890");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn cli_parses_send_confirmation() {
        let cli = Cli::try_parse_from([
            "despacho",
            "send-confirmation",
            "--business-id",
            "1",
            "--phone",
            "+57 300 123 4567",
            "--order",
            "ORD-555",
            "--name",
            "Ana",
            "--store",
            "Tienda Sol",
            "--address",
            "Calle 1",
            "--products",
            "1x Gorra",
        ])
        .unwrap();
        let Some(Commands::SendConfirmation(args)) = cli.command else {
            panic!("expected send-confirmation");
        };
        assert_eq!(args.order, "ORD-555");
        assert_eq!(args.vars()["3"], "ORD-555");
    }

    #[test]
    fn cli_parses_vault_maintenance() {
        let cli = Cli::try_parse_from(["despacho", "credentials", "delete", "--business-id", "3"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Credentials {
                action: CredentialsCommands::Delete { business_id: 3 }
            })
        ));
        let cli = Cli::try_parse_from(["despacho", "vault", "change-passphrase"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Vault {
                action: VaultCommands::ChangePassphrase
            })
        ));
    }

    #[test]
    fn config_check_requires_subcommand() {
        assert!(Cli::try_parse_from(["despacho", "config"]).is_err());
        assert!(Cli::try_parse_from(["despacho", "config", "check"]).is_ok());
    }
}
