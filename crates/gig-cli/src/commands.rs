//! Subcommand implementations.

use std::io::Write;
use std::path::Path;

use gig_core::{Amount, FeeSplit};
use gig_market::MarketConfig;
use serde::Serialize;

use crate::cli::Format;
use crate::error::CliError;
use crate::script::{self, ReplayReport, Script};

/// Fee breakdown for one price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeeQuote {
    /// The quoted price.
    pub price: Amount,
    /// Platform fee percentage applied.
    pub percent: u8,
    /// Freelancer payout and platform fee.
    #[serde(flatten)]
    pub split: FeeSplit,
}

/// Computes the payout split for `price` under `config`.
pub fn fee(config: &MarketConfig, price: Amount) -> Result<FeeQuote, CliError> {
    let schedule = config.fee_schedule()?;
    Ok(FeeQuote {
        price,
        percent: schedule.percent(),
        split: schedule.split(price),
    })
}

/// Writes a fee quote.
pub fn write_fee<W: Write>(out: &mut W, format: Format, quote: &FeeQuote) -> Result<(), CliError> {
    match format {
        Format::Json => {
            serde_json::to_writer_pretty(&mut *out, quote)?;
            writeln!(out)?;
        }
        Format::Text => {
            writeln!(out, "price:   {}", quote.price)?;
            writeln!(out, "fee:     {} ({}%)", quote.split.fee, quote.percent)?;
            writeln!(out, "payout:  {}", quote.split.payout)?;
        }
    }
    Ok(())
}

/// Loads and validates a config file, then writes the effective settings.
pub fn check_config<W: Write>(out: &mut W, format: Format, path: &Path) -> Result<MarketConfig, CliError> {
    let config = MarketConfig::load(path)?;
    match format {
        Format::Json => {
            serde_json::to_writer_pretty(&mut *out, &config)?;
            writeln!(out)?;
        }
        Format::Text => {
            writeln!(out, "{}: ok", path.display())?;
            writeln!(out, "platform_fee_percent: {}", config.platform_fee_percent)?;
            writeln!(out, "platform_account:     {}", config.platform_account)?;
            writeln!(out, "event_capacity:       {}", config.event_capacity)?;
        }
    }
    Ok(config)
}

/// Replays a script file. Events go to `out`; the summary goes to `summary`.
pub async fn replay_file<W: Write, S: Write>(
    out: &mut W,
    summary: &mut S,
    format: Format,
    config: MarketConfig,
    path: &Path,
    strict: bool,
) -> Result<ReplayReport, CliError> {
    let contents = std::fs::read_to_string(path)?;
    let script = Script::from_json(&contents)?;
    let report = script::replay(script, config, strict, out).await?;
    match format {
        Format::Json => {
            serde_json::to_writer(&mut *summary, &report)?;
            writeln!(summary)?;
        }
        Format::Text => {
            writeln!(summary, "applied {} actions, rejected {}", report.applied, report.rejected.len())?;
            for rejection in &report.rejected {
                writeln!(summary, "  action {}: {}", rejection.index, rejection.error)?;
            }
            writeln!(
                summary,
                "{} jobs, {} users, {} still in escrow",
                report.snapshot.total_jobs, report.snapshot.total_users, report.snapshot.total_escrowed
            )?;
        }
    }
    Ok(report)
}
