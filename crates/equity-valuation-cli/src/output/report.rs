use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use equity_valuation_core::pipeline::{ReportExporter, ValuationReport};
use equity_valuation_core::{ValuationError, ValuationResult};

use crate::output::csv_out;

/// Writes a valuation report as one CSV file per section into a directory.
pub struct CsvReportExporter;

impl CsvReportExporter {
    fn write_section<T: Serialize>(dir: &Path, name: &str, section: &T) -> ValuationResult<()> {
        let value = serde_json::to_value(section)?;
        let file = dir.join(format!("{name}.csv"));
        let mut wtr = csv::Writer::from_path(&file).map_err(|e| export_error(&file, e))?;
        csv_out::write_value(&mut wtr, &value).map_err(|e| export_error(&file, e))?;
        wtr.flush().map_err(|e| export_error(&file, e))?;
        debug!(file = %file.display(), "section written");
        Ok(())
    }
}

impl ReportExporter for CsvReportExporter {
    fn export(&self, report: &ValuationReport, path: &Path) -> ValuationResult<PathBuf> {
        fs::create_dir_all(path).map_err(|e| export_error(path, e))?;

        Self::write_section(path, "ratios", &report.ratios)?;
        Self::write_section(path, "projection", &report.projection)?;
        Self::write_section(path, "wacc", &report.wacc)?;
        Self::write_section(path, "dcf", &report.dcf.years)?;
        Self::write_section(
            path,
            "valuation",
            &serde_json::json!({
                "ticker": report.ticker,
                "net_debt": report.net_debt.value,
                "net_debt_source": report.net_debt.source,
                "market_cap": report.market_cap.value,
                "market_cap_source": report.market_cap.source,
                "pv_of_flows": report.dcf.pv_of_flows,
                "terminal_value": report.dcf.terminal_value,
                "pv_of_terminal": report.dcf.pv_of_terminal,
                "enterprise_value": report.dcf.enterprise_value,
                "equity_value": report.dcf.equity_value,
                "equity_value_per_share": report.dcf.equity_value_per_share,
            }),
        )?;
        Self::write_section(path, "sensitivity", &report.sensitivity)?;
        Self::write_section(path, "comparables", &report.comparables)?;
        Self::write_section(path, "assumptions", &report.assumptions)?;
        if let Some(lbo) = &report.lbo {
            Self::write_section(path, "lbo_schedule", &lbo.base_case.schedule)?;
            Self::write_section(path, "lbo_scenarios", &lbo.sweep)?;
        }

        Ok(path.to_path_buf())
    }
}

fn export_error(path: &Path, e: impl std::fmt::Display) -> ValuationError {
    ValuationError::Export(format!("{}: {e}", path.display()))
}
