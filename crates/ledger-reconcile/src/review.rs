//! The interactive confirm / skip / undo loop.

use std::io;

use crate::Result;
use crate::error::ReconcileError;
use crate::reconcile::candidates::{PotentialMatch, RecordForMatching};
use crate::reconcile::{Decision, Reconciliator};
use crate::record::format_amount;

/// Line-based terminal access.
pub trait Console {
    /// Shows `prompt` and reads one line. `None` at end of input.
    fn get_input(&mut self, prompt: &str) -> io::Result<Option<String>>;

    fn output_line(&mut self, text: &str) -> io::Result<()>;
}

/// Inputs that are not candidate numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tokens {
    pub skip: String,
    pub undo: String,
    pub exit: String,
}

impl Default for Tokens {
    fn default() -> Self {
        Tokens {
            skip: "s".to_owned(),
            undo: "u".to_owned(),
            exit: "q".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewOptions {
    pub tokens: Tokens,
    /// Consecutive invalid inputs after which the record is skipped.
    pub max_attempts: usize,
    pub currency_symbol: String,
}

impl Default for ReviewOptions {
    fn default() -> Self {
        ReviewOptions {
            tokens: Tokens::default(),
            max_attempts: 10,
            currency_symbol: "£".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewState {
    Presenting,
    Matched,
    Skipped,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewOutcome {
    /// Every statement line was decided.
    Completed,
    /// The user left early or input ended.
    Exited,
}

enum Step {
    To(ReviewState),
    Exit,
}

enum Choice {
    Select(usize),
    Skip,
    Undo,
    Exit,
    Invalid,
}

fn parse_choice(input: &str, tokens: &Tokens) -> Choice {
    if input.eq_ignore_ascii_case(&tokens.exit) {
        Choice::Exit
    } else if input.eq_ignore_ascii_case(&tokens.skip) {
        Choice::Skip
    } else if input.eq_ignore_ascii_case(&tokens.undo) {
        Choice::Undo
    } else {
        input.parse().map_or(Choice::Invalid, Choice::Select)
    }
}

/// Presents each unmatched statement line in turn until all are decided or
/// the user exits.
pub fn review(
    reconciliator: &mut Reconciliator,
    console: &mut impl Console,
    options: &ReviewOptions,
) -> Result<ReviewOutcome> {
    let mut state = ReviewState::Presenting;
    loop {
        tracing::debug!(?state, "review");
        state = match state {
            ReviewState::Presenting => match present(reconciliator, console, options)? {
                Step::To(next) => next,
                Step::Exit => return Ok(ReviewOutcome::Exited),
            },
            ReviewState::Matched | ReviewState::Skipped => ReviewState::Presenting,
            ReviewState::Done => return Ok(ReviewOutcome::Completed),
        };
    }
}

fn present(
    reconciliator: &mut Reconciliator,
    console: &mut impl Console,
    options: &ReviewOptions,
) -> Result<Step> {
    let Some(rfm) = reconciliator.prepare_next().cloned() else {
        return Ok(Step::To(ReviewState::Done));
    };
    for line in render(&rfm, reconciliator, &options.currency_symbol) {
        console.output_line(&line)?;
    }

    let prompt = prompt(&options.tokens, rfm.has_candidates());
    let mut attempts = 0;
    loop {
        let Some(input) = console.get_input(&prompt)? else {
            return Ok(Step::Exit);
        };
        let input = input.trim();
        match parse_choice(input, &options.tokens) {
            Choice::Exit => return Ok(Step::Exit),
            Choice::Skip => {
                reconciliator.apply(Decision::Skip)?;
                return Ok(Step::To(ReviewState::Skipped));
            }
            Choice::Undo if reconciliator.can_undo() => {
                reconciliator.apply(Decision::Undo)?;
                console.output_line("Undid the last match.")?;
                return Ok(Step::To(ReviewState::Presenting));
            }
            Choice::Undo => {
                console.output_line("Nothing to undo.")?;
                continue;
            }
            Choice::Select(index) => match reconciliator.apply(Decision::Confirm(index)) {
                Ok(()) => {
                    console.output_line("Matched.")?;
                    return Ok(Step::To(ReviewState::Matched));
                }
                Err(error @ ReconcileError::InvalidSelection { .. }) => {
                    console.output_line(&error.to_string())?;
                    attempts += 1;
                }
                Err(error) => return Err(error.into()),
            },
            Choice::Invalid => {
                console.output_line(&format!("'{input}' is not a valid choice."))?;
                attempts += 1;
            }
        }

        if attempts >= options.max_attempts {
            tracing::info!(source = %rfm.source(), attempts, "too many invalid inputs");
            console.output_line("Too many invalid inputs, skipping this record.")?;
            reconciliator.apply(Decision::Skip)?;
            return Ok(Step::To(ReviewState::Skipped));
        }
    }
}

fn prompt(tokens: &Tokens, has_candidates: bool) -> String {
    let Tokens { skip, undo, exit } = tokens;
    if has_candidates {
        format!("Match number, {skip} to skip, {undo} to undo, {exit} to exit: ")
    } else {
        format!("{skip} to skip, {undo} to undo, {exit} to exit: ")
    }
}

/// The statement line followed by its numbered candidates.
pub fn render(
    rfm: &RecordForMatching,
    reconciliator: &Reconciliator,
    currency_symbol: &str,
) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(source) = reconciliator.third_party().get(rfm.source()) {
        lines.push(format!("Statement: {}", source.console_line(currency_symbol)));
    }
    if !rfm.has_candidates() {
        lines.push("No matching records.".to_owned());
    }
    for (index, candidate) in rfm.candidates().iter().enumerate() {
        render_candidate(&mut lines, index, candidate, reconciliator, currency_symbol);
    }
    lines
}

fn render_candidate(
    lines: &mut Vec<String>,
    index: usize,
    candidate: &PotentialMatch,
    reconciliator: &Reconciliator,
    currency_symbol: &str,
) {
    let owned = reconciliator.owned();
    if let [member] = candidate.members() {
        if let Some(record) = owned.get(*member) {
            lines.push(format!("  {index}. {}", record.console_line(currency_symbol)));
        }
        return;
    }

    lines.push(format!(
        "  {index}. {} from {} records:",
        format_amount(candidate.total(), currency_symbol),
        candidate.len()
    ));
    for record in candidate.members().iter().filter_map(|&id| owned.get(id)) {
        lines.push(format!("       {}", record.console_line(currency_symbol)));
    }
}
