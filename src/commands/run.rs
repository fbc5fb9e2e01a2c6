use anyhow::{Result, bail};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use provisioner::{ItemOutcome, ProvisionReport};
use std::time::Duration;

use crate::Context;
use crate::cli::RunArgs;
use crate::ui;

pub fn run(ctx: &Context, args: &RunArgs) -> Result<()> {
    let (path, settings) = super::load_settings(ctx)?;
    let managers = settings.managers(&args.only)?;

    if managers.is_empty() {
        ui::warn(&format!("No software configured in {}", path.display()));
        return Ok(());
    }

    if !ctx.quiet {
        ui::header(&format!("Provisioning {}", settings.node_name()));
    }

    let pb = ProgressBar::new(managers.len() as u64);
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} [{pos}/{len}] {msg}")?,
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message(
        managers
            .iter()
            .map(provisioner::SoftwareManager::name)
            .collect::<Vec<_>>()
            .join(", "),
    );
    if ctx.quiet {
        pb.set_draw_target(indicatif::ProgressDrawTarget::hidden());
    }

    let outcomes = provisioner::provision_all_with(&managers, args.jobs, |outcome| {
        pb.inc(1);
        let mark = if outcome.is_success() { "✓" } else { "✗" };
        pb.set_message(format!("{} {}", outcome.software, mark));
    })?;
    pb.finish_and_clear();

    let failed = outcomes.iter().filter(|o| !o.is_success()).count();
    for (i, outcome) in outcomes.iter().enumerate() {
        print_outcome(ctx, outcome, &ui::item_counter(i + 1, outcomes.len()));
    }

    if failed > 0 {
        bail!("{} of {} item(s) failed", failed, outcomes.len());
    }

    if !ctx.quiet {
        println!();
        ui::success(&format!("{} item(s) configured", outcomes.len()));
    }
    Ok(())
}

fn print_outcome(ctx: &Context, outcome: &ItemOutcome, counter: &str) {
    match &outcome.result {
        Ok(report) => {
            if ctx.quiet {
                return;
            }
            let changes = report.changes();
            let summary = if changes == 0 {
                "already configured".dimmed().to_string()
            } else {
                format!("{changes} step(s) applied")
            };
            ui::success(&format!(
                "{} {}: {}",
                counter.dimmed(),
                outcome.software.bold(),
                summary
            ));
            if ctx.verbose > 0 || changes > 0 {
                print_steps(report);
            }
        }
        Err(e) => {
            ui::error(&format!("{} {}: {}", counter, outcome.software.bold(), e));
            let category = e.category();
            ui::dim(&format!("{category}: {}", category.advice()));
        }
    }
}

fn print_steps(report: &ProvisionReport) {
    for (step, outcome) in [
        ("archive", &report.artifact),
        ("install", &report.install),
        ("environment", &report.environment),
    ] {
        ui::step(step, outcome.is_applied(), outcome.detail());
    }
}
