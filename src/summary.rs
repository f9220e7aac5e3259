use crate::alerts::ALERT_KEYS;
use crate::extract::PageRecord;

/// Counts over one run's records.
#[derive(Debug, PartialEq)]
pub struct RunSummary {
    pub total: usize,
    pub with_alerts: usize,
    pub without_alerts: usize,
    /// URLs that could not be fetched or measured.
    pub skipped: usize,
    /// Records raising each alert, in [`ALERT_KEYS`] order. Empty when no
    /// record was seen.
    pub alert_counts: Vec<(&'static str, usize)>,
}

impl RunSummary {
    pub fn from_records(records: &[PageRecord], skipped: usize) -> Self {
        let with_alerts = records.iter().filter(|r| r.alerts().has_alert()).count();
        let alert_counts = if records.is_empty() {
            Vec::new()
        } else {
            ALERT_KEYS
                .iter()
                .enumerate()
                .map(|(i, key)| {
                    let raised = records.iter().filter(|r| r.alerts().flags()[i].1).count();
                    (*key, raised)
                })
                .collect()
        };

        RunSummary {
            total: records.len(),
            with_alerts,
            without_alerts: records.len() - with_alerts,
            skipped,
            alert_counts,
        }
    }

    pub fn print(&self) {
        println!("Total URLs:     {}", self.total);
        println!("With alerts:    {}", self.with_alerts);
        println!("Without alerts: {}", self.without_alerts);
        if self.skipped > 0 {
            println!("Skipped:        {}", self.skipped);
        }
        if !self.alert_counts.is_empty() {
            println!("\n--- Alerts ---");
            for (key, count) in &self.alert_counts {
                println!("  {:<46} {:>6}", key, count);
            }
        }
    }
}
