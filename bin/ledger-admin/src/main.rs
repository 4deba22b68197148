use anyhow::{anyhow, Context};
use clap::{Arg, ArgMatches, Command};
use rust_decimal::Decimal;
use std::path::PathBuf;
use tracing::info;
use uuid::Uuid;

use withdrawal_ledger::build_ledger;
use withdrawal_ledger::config::load_config;
use withdrawal_ledger::queue::ReconciliationSweep;

fn user_arg() -> Arg {
    Arg::new("user")
        .long("user")
        .value_name("USER_ID")
        .help("User whose ledger to operate on")
        .required(true)
        .value_parser(clap::value_parser!(String))
}

fn cli() -> Command {
    Command::new("Ledger Admin")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Operator commands for the withdrawal ledger")
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("CONFIG_FILE")
                .help("Path to configuration file")
                .default_value("config.toml")
                .value_parser(clap::value_parser!(String)),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("balance")
                .about("Show a user's balance")
                .arg(user_arg()),
        )
        .subcommand(
            Command::new("credit")
                .about("Credit released escrow or bonus earnings to a user")
                .arg(user_arg())
                .arg(
                    Arg::new("amount")
                        .long("amount")
                        .value_name("AMOUNT")
                        .help("Amount to credit")
                        .required(true)
                        .value_parser(clap::value_parser!(String)),
                ),
        )
        .subcommand(
            Command::new("withdrawals")
                .about("List a user's withdrawals, newest first")
                .arg(user_arg()),
        )
        .subcommand(
            Command::new("cancel")
                .about("Cancel a pending withdrawal")
                .arg(user_arg())
                .arg(
                    Arg::new("id")
                        .long("id")
                        .value_name("WITHDRAWAL_ID")
                        .help("Withdrawal to cancel")
                        .required(true)
                        .value_parser(clap::value_parser!(String)),
                ),
        )
        .subcommand(Command::new("reconcile").about("Run one reconciliation pass and exit"))
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> anyhow::Result<&'a String> {
    matches
        .get_one::<String>(name)
        .ok_or_else(|| anyhow!("missing --{}", name))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let matches = cli().get_matches();
    let config_path = PathBuf::from(required(&matches, "config")?);
    let config = load_config(Some(config_path.as_path()).filter(|path| path.exists()))?;
    if config.database.url().is_none() {
        return Err(anyhow!(
            "ledger-admin needs a database; set DATABASE_URL or database.url"
        ));
    }

    let ledger = build_ledger(&config).await?;
    info!("Connected to ledger");

    match matches.subcommand() {
        Some(("balance", args)) => {
            let balance = ledger.balance(required(args, "user")?).await?;
            println!("{}", serde_json::to_string_pretty(&balance)?);
        }
        Some(("credit", args)) => {
            let amount: Decimal = required(args, "amount")?
                .parse()
                .context("amount must be a decimal number")?;
            let balance = ledger
                .credit_earnings(required(args, "user")?, amount)
                .await?;
            println!("{}", serde_json::to_string_pretty(&balance)?);
        }
        Some(("withdrawals", args)) => {
            for withdrawal in ledger.withdrawals(required(args, "user")?).await? {
                println!(
                    "{}  {:<10}  {:>12}  {}  {}",
                    withdrawal.id,
                    withdrawal.status.as_str(),
                    withdrawal.requested_amount.to_string(),
                    withdrawal.created_at.to_rfc3339(),
                    withdrawal.failure_reason.unwrap_or_default()
                );
            }
        }
        Some(("cancel", args)) => {
            let id = Uuid::parse_str(required(args, "id")?).context("invalid withdrawal id")?;
            let cancelled = ledger.cancel_withdrawal(required(args, "user")?, id).await?;
            println!("Withdrawal {} is now {}", cancelled.id, cancelled.status);
        }
        Some(("reconcile", _)) => {
            let sweep = ReconciliationSweep::new(ledger, config.reconciliation.clone());
            let report = sweep.run_once().await?;
            println!("{:?}", report);
        }
        _ => unreachable!("subcommand_required is set"),
    }

    Ok(())
}
