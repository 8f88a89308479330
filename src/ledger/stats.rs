use crate::ledger::reconcile::ReconcileReport;
use crate::output::Address;
use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

impl fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{},{},{}",
            self.address,
            self.shard,
            self.inserted,
            self.removed,
            self.kept,
            self.skipped_pending,
            self.anomalies.len()
        )
    }
}

/// Outcome of a wallet-wide sync: one report per reconciled address plus failed fetches.
#[derive(Debug, Default, Clone)]
pub struct SyncStats {
    pub reports: Vec<ReconcileReport>,
    pub failed_fetches: Vec<(Address, String)>,
}

impl SyncStats {
    pub fn add_report(&mut self, report: ReconcileReport) {
        self.reports.push(report);
    }

    pub fn add_failed_fetch(&mut self, address: Address, error: String) {
        self.failed_fetches.push((address, error));
    }

    pub fn inserted(&self) -> usize {
        self.reports.iter().map(|report| report.inserted).sum()
    }

    pub fn removed(&self) -> usize {
        self.reports.iter().map(|report| report.removed).sum()
    }

    pub fn anomalies(&self) -> usize {
        self.reports.iter().map(|report| report.anomalies.len()).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.failed_fetches.is_empty()
    }

    pub fn dump_stats(&self, path: PathBuf) -> anyhow::Result<()> {
        let mut stats = File::create(path)?;
        stats.write_all(b"address,shard,inserted,removed,kept,skipped_pending,anomalies\n")?;
        for report in self.reports.iter() {
            stats.write_all(format!("{}\n", report).as_bytes())?;
        }
        for (address, error) in self.failed_fetches.iter() {
            stats.write_all(format!("# fetch failed for {}: {}\n", address, error).as_bytes())?;
        }
        Ok(())
    }
}
