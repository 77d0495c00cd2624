//! Interactive step selection when no subcommand is given.

use council_diversity::config::DiversityConfig;
use council_diversity_cli_utils::MultiProgress;
use council_diversity_models::{CouncilorType, Factor};
use council_diversity_store::DiversityStore;
use dialoguer::{Confirm, MultiSelect};

use crate::pipeline;

/// Steps offered by the interactive flow.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Step {
    Snapshot,
    Rank,
    History,
}

impl Step {
    const ALL: &[Self] = &[Self::Snapshot, Self::Rank, Self::History];

    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::Snapshot => "Score current councils",
            Self::Rank => "Rank current councils",
            Self::History => "Score and rank age history",
        }
    }
}

/// Prompts for steps, factors and councilor series, then runs them in order.
///
/// # Errors
///
/// Returns an error if a prompt fails or any selected step fails.
pub fn run(
    store: &dyn DiversityStore,
    config: &DiversityConfig,
    multi: &MultiProgress,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("Council Diversity");
    println!();

    let labels: Vec<&str> = Step::ALL.iter().map(Step::label).collect();
    let selected = MultiSelect::new()
        .with_prompt("Steps (space=toggle, enter=confirm)")
        .items(&labels)
        .defaults(&vec![true; labels.len()])
        .interact()?;

    if selected.is_empty() {
        println!("Nothing selected.");
        return Ok(());
    }

    let mut config = config.clone();
    let wants = |step: Step| selected.iter().any(|&i| Step::ALL[i] == step);

    if wants(Step::Snapshot) || wants(Step::Rank) {
        config.snapshot.factors = select_factors(&config.snapshot.factors)?;
    }
    if wants(Step::History) {
        config.history.councilor_types = select_councilor_types(&config.history.councilor_types)?;
    }

    let localities = if wants(Step::Snapshot) {
        pipeline::configured_localities(store, &config)?
    } else {
        Vec::new()
    };
    let prompt = if wants(Step::Snapshot) {
        format!("Score {} localities?", localities.len())
    } else {
        "Run the selected steps?".to_string()
    };
    let proceed = Confirm::new().with_prompt(prompt).default(true).interact()?;
    if !proceed {
        return Ok(());
    }

    for &index in &selected {
        match Step::ALL[index] {
            Step::Snapshot => {
                pipeline::run_snapshot(store, &localities, &config.snapshot, multi)?;
            }
            Step::Rank => pipeline::run_rank(store, &config.snapshot.factors, multi)?,
            Step::History => {
                pipeline::run_history(store, config.localities, &config.history, multi)?;
            }
        }
    }

    Ok(())
}

fn select_factors(current: &[Factor]) -> Result<Vec<Factor>, dialoguer::Error> {
    let all = Factor::all();
    let labels: Vec<&str> = all.iter().map(AsRef::as_ref).collect();
    let defaults: Vec<bool> = all.iter().map(|f| current.contains(f)).collect();

    let picked = MultiSelect::new()
        .with_prompt("Factors")
        .items(&labels)
        .defaults(&defaults)
        .interact()?;
    Ok(picked.into_iter().map(|i| all[i]).collect())
}

fn select_councilor_types(
    current: &[CouncilorType],
) -> Result<Vec<CouncilorType>, dialoguer::Error> {
    let all = CouncilorType::all();
    let labels: Vec<&str> = all.iter().map(AsRef::as_ref).collect();
    let defaults: Vec<bool> = all.iter().map(|t| current.contains(t)).collect();

    let picked = MultiSelect::new()
        .with_prompt("Councilor series")
        .items(&labels)
        .defaults(&defaults)
        .interact()?;
    Ok(picked.into_iter().map(|i| all[i]).collect())
}
