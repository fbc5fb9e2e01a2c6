use anyhow::{Context as _, Result};
use colored::Colorize;
use provisioner::ItemStatus;

use crate::Context;
use crate::cli::StatusArgs;
use crate::ui;

pub fn run(ctx: &Context, args: &StatusArgs) -> Result<()> {
    let (path, settings) = super::load_settings(ctx)?;
    let managers = settings.managers(&[])?;

    let statuses = managers
        .iter()
        .map(|m| {
            m.status()
                .with_context(|| format!("Failed to read status of {}", m.name()))
        })
        .collect::<Result<Vec<_>>>()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }

    ui::header(&format!("Node Status: {}", settings.node_name()));
    ui::kv("Settings", &path.display().to_string());

    if statuses.is_empty() {
        println!();
        ui::warn("No software configured");
        return Ok(());
    }

    for status in &statuses {
        show_item(status);
    }

    let configured = statuses.iter().filter(|s| s.is_configured()).count();
    println!();
    if configured == statuses.len() {
        ui::success(&format!("All {configured} item(s) configured"));
    } else {
        ui::info(&format!(
            "{} of {} item(s) configured. Run: nodeprep run",
            configured,
            statuses.len()
        ));
    }
    Ok(())
}

fn show_item(status: &ItemStatus) {
    ui::section(&status.software);

    let archive = if status.archive_cached {
        format!("{} {}", "✓".green(), status.archive_path)
    } else {
        format!("{} {}", "missing".yellow(), status.archive_path.dimmed())
    };
    ui::kv("Archive", &archive);

    let installed = match &status.installed {
        Some(record) => format!("{} {} at {}", "✓".green(), record.version, record.install_home),
        None => "not installed".yellow().to_string(),
    };
    ui::kv("Installed", &installed);

    if let Some((name, value)) = &status.binding {
        let binding = if value.trim().is_empty() {
            format!("{name} {}", "unset".yellow())
        } else {
            format!("{name}={value}")
        };
        ui::kv("Environment", &binding);
    }
}
