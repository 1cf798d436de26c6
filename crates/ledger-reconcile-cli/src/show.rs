use anstyle::{AnsiColor, Color, Reset, Style};
use ledger_reconcile::reconcile::{Reconciliator, Summary};
use ledger_reconcile::review::{self, ReviewOutcome};

use crate::kinds::LoadingInfo;

pub fn show_preview(reconciliator: &Reconciliator, info: &LoadingInfo, currency_symbol: &str) {
    let matched_style = Style::new().fg_color(Some(Color::Ansi(AnsiColor::Green)));
    let unmatched_style = Style::new().fg_color(Some(Color::Ansi(AnsiColor::Yellow)));
    let reset = Reset;

    let preview = reconciliator.preview();
    let mut without_candidates = 0;
    for rfm in &preview {
        if rfm.has_candidates() {
            println!("{matched_style}━━━ {} candidate(s) ━━━{reset}", rfm.candidates().len());
        } else {
            println!("{unmatched_style}━━━ No candidates ━━━{reset}");
            without_candidates += 1;
        }
        for line in review::render(rfm, reconciliator, currency_symbol) {
            println!("{line}");
        }
        println!();
    }

    println!("{}━━━ Summary ━━━{}", Style::new().bold(), reset);
    println!(
        "  {} unmatched {} line(s)",
        preview.len(),
        info.third_party_descriptor
    );
    if without_candidates > 0 {
        println!("  {unmatched_style}{without_candidates}{reset} line(s) with nothing to match");
    }
}

pub fn show_summary(summary: &Summary, outcome: ReviewOutcome, info: &LoadingInfo) {
    let matched_style = Style::new().fg_color(Some(Color::Ansi(AnsiColor::Green)));
    let unmatched_style = Style::new().fg_color(Some(Color::Ansi(AnsiColor::Yellow)));
    let reset = Reset;

    if outcome == ReviewOutcome::Exited {
        println!("{unmatched_style}Stopped before the end of the statement.{reset}");
    }
    if summary.third_party_unmatched == 0 && summary.owned_unmatched == 0 {
        println!("✓ Everything is reconciled!");
        return;
    }

    println!("{}━━━ Summary ━━━{}", Style::new().bold(), reset);
    println!(
        "  {matched_style}{}{reset} {} line(s) matched",
        summary.third_party_matched, info.third_party_descriptor
    );
    if summary.third_party_unmatched > 0 {
        println!(
            "  {unmatched_style}{}{reset} {} line(s) unmatched",
            summary.third_party_unmatched, info.third_party_descriptor
        );
    }
    if summary.owned_unmatched > 0 {
        println!(
            "  {unmatched_style}{}{reset} {} record(s) unmatched",
            summary.owned_unmatched, info.owned_descriptor
        );
    }
    if summary.synthetic > 0 {
        println!("  {} merged record(s) created", summary.synthetic);
    }
}
