/*!
 * Tests for the billable usage ledger
 */

use papercast::cost::CostLedger;

#[test]
fn test_total_recordedEntries_shouldSumExactly() {
    let mut ledger = CostLedger::new(0.000030);
    ledger.record(120, 100, 95);
    ledger.record(80, 70, 64);
    ledger.record(40, 30, 28);

    let totals = ledger.total();
    assert_eq!(ledger.len(), 3);
    assert_eq!(totals.chars_in, 240);
    assert_eq!(totals.chars_out, 200);
    assert_eq!(totals.billable_chars, 187);
    assert!((totals.estimated_cost_usd - 187.0 * 0.000030).abs() < 1e-12);
}

#[test]
fn test_total_emptyLedger_shouldBeZero() {
    let ledger = CostLedger::new(0.000016);
    let totals = ledger.total();

    assert!(ledger.is_empty());
    assert_eq!(totals.billable_chars, 0);
    assert_eq!(totals.estimated_cost_usd, 0.0);
}

/// A running total is accurate mid-job, not only at the end
#[test]
fn test_total_midJob_shouldReflectEntriesSoFar() {
    let mut ledger = CostLedger::new(1.0);
    ledger.record(10, 10, 10);
    assert_eq!(ledger.total().billable_chars, 10);

    ledger.record(5, 5, 5);
    assert_eq!(ledger.total().billable_chars, 15);
    assert_eq!(ledger.entries().len(), 2);
}

#[test]
fn test_summary_withEntries_shouldMentionCounts() {
    let mut ledger = CostLedger::new(0.000030);
    ledger.record(100, 90, 85);

    let summary = ledger.summary();
    assert!(summary.contains("1 operation(s)"));
    assert!(summary.contains("85 billable chars"));
}
