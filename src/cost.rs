use std::time::Instant;
use serde::Serialize;

// @module: Billable character accounting and cost estimation

/// One recorded synthesis operation
#[derive(Debug, Clone, Copy)]
pub struct CostEntry {
    /// Characters submitted in the request, markup included
    pub chars_in: u64,
    /// Characters of spoken narration produced
    pub chars_out: u64,
    /// Characters the service actually bills for
    pub billable_chars: u64,
}

/// Summed totals across a whole job
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CostTotals {
    pub chars_in: u64,
    pub chars_out: u64,
    pub billable_chars: u64,
    /// Billable characters multiplied by the configured per-character rate
    pub estimated_cost_usd: f64,
}

/// Append-only ledger of billable usage for one job.
///
/// Entries are never recomputed or discarded, so a running total is accurate
/// at any point mid-job. One instance per job, written only by the
/// orchestrator after each completed operation.
#[derive(Debug)]
pub struct CostLedger {
    entries: Vec<CostEntry>,
    /// USD per billable character
    rate_per_char: f64,
    start_time: Instant,
}

impl CostLedger {
    /// Create an empty ledger with the given per-character USD rate
    pub fn new(rate_per_char: f64) -> Self {
        Self {
            entries: Vec::new(),
            rate_per_char,
            start_time: Instant::now(),
        }
    }

    /// Append one operation's usage. Purely additive.
    pub fn record(&mut self, chars_in: u64, chars_out: u64, billable_chars: u64) {
        self.entries.push(CostEntry {
            chars_in,
            chars_out,
            billable_chars,
        });
    }

    /// Number of recorded operations
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether anything has been recorded yet
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Recorded entries in insertion order
    pub fn entries(&self) -> &[CostEntry] {
        &self.entries
    }

    /// Sum all entries into job totals
    pub fn total(&self) -> CostTotals {
        let mut totals = CostTotals {
            chars_in: 0,
            chars_out: 0,
            billable_chars: 0,
            estimated_cost_usd: 0.0,
        };
        for entry in &self.entries {
            totals.chars_in += entry.chars_in;
            totals.chars_out += entry.chars_out;
            totals.billable_chars += entry.billable_chars;
        }
        totals.estimated_cost_usd = totals.billable_chars as f64 * self.rate_per_char;
        totals
    }

    /// Human-readable usage summary
    pub fn summary(&self) -> String {
        let totals = self.total();
        let elapsed = self.start_time.elapsed();
        format!(
            "Cost summary: {} operation(s), {} billable chars, est. ${:.4} ({}s elapsed)",
            self.entries.len(),
            totals.billable_chars,
            totals.estimated_cost_usd,
            elapsed.as_secs()
        )
    }
}
