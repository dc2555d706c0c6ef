// Report generation for the Kinetic client
//
// Renders dashboard snapshots, splitter and vault positions and cached
// strategy lists for the terminal or as JSON.

use crate::aggregate::AggregatedData;
use crate::splitter::SplitterSummary;
use crate::vault::VaultPosition;
use anyhow::Result;
use ethers::types::U256;
use ethers::utils::to_checksum;
use kinetic_common::{format_address, format_base_units, Strategy};
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Output format for reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Json,
    Text,
}

/// Report formatter for the Kinetic client
pub struct ReportFormatter;

impl ReportFormatter {
    /// Format any report as JSON
    pub fn to_json<T: Serialize>(report: &T) -> Result<String> {
        let json = serde_json::to_string_pretty(report)?;
        Ok(json)
    }

    /// Format a dashboard snapshot as plain text; amounts use `decimals`
    pub fn to_text(data: &AggregatedData, decimals: u32) -> String {
        let mut output = String::new();

        output.push_str("Kinetic Dashboard\n");
        output.push_str("=================\n\n");
        output.push_str(&format!("Total Assets: {}\n", format_base_units(data.total_assets, decimals)));
        output.push_str(&format!("Total Yield:  {}\n", format_base_units(data.total_yield, decimals)));
        output.push_str(&format!("Strategies:   {}\n", data.strategies.len()));
        if data.skipped > 0 {
            output.push_str(&format!("Unresolved:   {} (run `strategies recover`)\n", data.skipped));
        }
        if data.failed_reads > 0 {
            output.push_str(&format!("Failed reads: {}\n", data.failed_reads));
        }
        output.push('\n');

        for (i, position) in data.strategies.iter().enumerate() {
            output.push_str(&format!("{}. {} ({})\n", i + 1, position.name, format_address(&to_checksum(&position.address, None))));
            if position.read_failed {
                output.push_str("   Assets: unavailable\n\n");
                continue;
            }
            output.push_str(&format!("   Deposited: {}\n", format_base_units(position.deposited, decimals)));
            output.push_str(&format!("   Assets:    {}\n", format_base_units(position.current_assets, decimals)));
            output.push_str(&format!("   Yield:     {}\n\n", format_base_units(position.yield_generated, decimals)));
        }

        output
    }

    /// Format a payee's splitter position as plain text
    pub fn splitter_to_text(summary: &SplitterSummary, decimals: u32) -> String {
        let mut output = String::new();

        output.push_str(&format!("Payment Splitter {}\n", to_checksum(&summary.splitter, None)));
        output.push_str(&format!("Payee:          {}\n", to_checksum(&summary.payee, None)));
        if let Some(token) = summary.token {
            output.push_str(&format!("Token:          {}\n", to_checksum(&token, None)));
        }
        output.push_str(&format!(
            "Shares:         {} / {} ({:.2}%)\n",
            summary.shares,
            summary.total_shares,
            summary.share_percentage()
        ));
        output.push_str(&format!("Releasable:     {}\n", format_base_units(summary.releasable, decimals)));
        output.push_str(&format!("Released:       {}\n", format_base_units(summary.released, decimals)));
        output.push_str(&format!("Total Released: {}\n", format_base_units(summary.total_released, decimals)));

        output
    }

    /// List cached strategies, flagging records that need recovery
    /// Render a vault position; amounts use the asset's decimals when known
    pub fn position_to_text(position: &VaultPosition) -> String {
        let decimals = position.asset_decimals.unwrap_or(18);
        let amount = |value: U256| format_base_units(value, decimals);
        let mut output = String::new();

        output.push_str(&format!("Strategy {}
", to_checksum(&position.vault, None)));
        output.push_str(&format!("Account:      {}
", to_checksum(&position.account, None)));
        output.push_str(&format!("Asset:        {}
", to_checksum(&position.asset, None)));
        output.push_str(&format!("Shares:       {}
", position.shares));
        output.push_str(&format!("Value:        {}
", amount(position.assets)));
        output.push_str(&format!("Total Assets: {}
", amount(position.total_assets)));
        if let Some(limit) = position.max_deposit {
            output.push_str(&format!("Max Deposit:  {}
", amount(limit)));
        }
        if let Some(limit) = position.max_withdraw {
            output.push_str(&format!("Max Withdraw: {}
", amount(limit)));
        }

        output
    }

    pub fn strategies_to_text(strategies: &[Strategy]) -> String {
        if strategies.is_empty() {
            return "No strategies deployed yet\n".to_string();
        }

        let mut output = String::new();
        for strategy in strategies {
            let marker = if strategy.address.is_valid() { "" } else { "  [pending]" };
            output.push_str(&format!(
                "{:<8} {}  {}{}\n",
                strategy.protocol.as_str(),
                strategy.address,
                strategy.name,
                marker
            ));
        }
        output
    }

    /// Save a dashboard snapshot to a file
    pub fn save_to_file<P: AsRef<Path>>(data: &AggregatedData, decimals: u32, path: P, format: ReportFormat) -> Result<()> {
        let content = match format {
            ReportFormat::Json => Self::to_json(data)?,
            ReportFormat::Text => Self::to_text(data, decimals),
        };

        fs::write(path, content)?;
        Ok(())
    }
}
