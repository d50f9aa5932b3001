//! Diagnostic CLI for the credit calendar core.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use creditcal_client::{HttpCreditsApi, StaticToken};
use creditcal_core::{CalendarConfig, CreditTrackingService};
use creditcal_models::CalendarQuery;

#[derive(Parser)]
#[command(name = "creditcal", about = "Inspect card credit calendars through the core")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load one month's slice.
    Month {
        #[arg(long)]
        year: i32,
        /// 1-based month.
        #[arg(long)]
        month: u32,
        /// Restrict to a card; repeatable.
        #[arg(long = "card")]
        cards: Vec<String>,
        #[arg(long)]
        exclude_hidden: bool,
    },
    /// Show one credit with every period of a year.
    Credit {
        #[arg(long)]
        card: String,
        #[arg(long)]
        credit: String,
        #[arg(long)]
        year: i32,
    },
    /// Reconcile a year (default: the server's current year).
    Sync {
        #[arg(long)]
        year: Option<i32>,
    },
    /// Show tracking preferences.
    Preferences,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    let token = std::env::var("CREDITS_API_TOKEN").unwrap_or_default();
    let api = HttpCreditsApi::from_env(Arc::new(StaticToken::new(token)))
        .context("Failed to create credits API client")?;
    info!(base_url = %api.config().base_url, "Credits API client ready");

    let service =
        CreditTrackingService::with_system_clock(Arc::new(api), CalendarConfig::from_env());

    match cli.command {
        Command::Month {
            year,
            month,
            cards,
            exclude_hidden,
        } => {
            let mut query = CalendarQuery::default().excluding_hidden(exclude_hidden);
            if !cards.is_empty() {
                query = query.with_cards(cards);
            }
            let load = service.load_month_data(year, month, &query).await?;
            print_json(&load)?;
        }
        Command::Credit { card, credit, year } => {
            let found = service
                .get_credit_with_full_history(&card, &credit, year, &CalendarQuery::default())
                .await?;
            print_json(&found)?;
        }
        Command::Sync { year } => {
            let query = CalendarQuery::default();
            let synced = match year {
                Some(year) => service.sync_year_credits_debounced(year, &query).await?,
                None => service.sync_current_year_credits_debounced(&query).await?,
            };
            print_json(&synced)?;
        }
        Command::Preferences => {
            let preferences = service.fetch_credit_tracking_preferences().await?;
            print_json(&preferences)?;
        }
    }

    service.dispose();
    Ok(())
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Logs go to stderr so stdout stays valid JSON.
    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .with(env_filter)
            .init();
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
