use anyhow::Result;
use std::fs::OpenOptions;
use std::io::Write;

use crate::engine::report::OpportunityReport;
use crate::engine::types::Opportunity;

/// Append-only CSV log of ranked opportunities, one row per opportunity
/// per run.
pub struct CsvLogger {
    log_path: String,
}

impl CsvLogger {
    pub fn new(log_path: String) -> Result<Self> {
        // Create CSV file with headers if it doesn't exist
        if !std::path::Path::new(&log_path).exists() {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .open(&log_path)?;

            writeln!(
                file,
                "timestamp,rank,buy,sell,buy_price,sell_price,raw_margin_pct,risk_weight,adjusted_margin_pct,confidence"
            )?;
        }

        Ok(Self { log_path })
    }

    /// Log every ranked opportunity from one run.
    pub fn log_report(&self, report: &OpportunityReport) -> Result<()> {
        let mut file = OpenOptions::new().append(true).open(&self.log_path)?;

        for opportunity in &report.opportunities {
            self.write_row(&mut file, &report.timestamp.to_rfc3339(), opportunity)?;
        }

        Ok(())
    }

    fn write_row(
        &self,
        file: &mut std::fs::File,
        timestamp: &str,
        opportunity: &Opportunity,
    ) -> Result<()> {
        writeln!(
            file,
            "{},{},{},{},{:.2},{:.2},{:.4},{:.4},{:.4},{:?}",
            timestamp,
            opportunity.rank,
            opportunity.buy,
            opportunity.sell,
            opportunity.buy_price,
            opportunity.sell_price,
            opportunity.raw_margin_percent,
            opportunity.risk_weight,
            opportunity.adjusted_margin_percent,
            opportunity.confidence
        )?;

        Ok(())
    }

    /// Log a run-level event (e.g. degraded sources).
    pub fn log_event(&self, timestamp: &str, event: &str) -> Result<()> {
        let mut file = OpenOptions::new().append(true).open(&self.log_path)?;

        writeln!(file, "{},EVENT,{},,,,,,,", timestamp, event)?;

        Ok(())
    }
}
