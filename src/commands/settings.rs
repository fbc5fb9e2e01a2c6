use anyhow::Result;
use colored::Colorize;

use crate::Context;
use crate::settings::Settings;
use crate::ui;

pub fn run(ctx: &Context) -> Result<()> {
    let (path, settings) = super::load_settings(ctx)?;

    ui::header(&format!("Settings: {}", settings.node_name()));
    ui::kv("File", &path.display().to_string());

    ui::section("Directories");
    let dirs = settings.directories();
    ui::kv("Download", &dirs.download.display().to_string());
    ui::kv("Log", &dirs.log.display().to_string());
    if let Some(es) = settings.elasticsearch_dir() {
        ui::kv("Elasticsearch", &es.display().to_string());
    }
    if let Some(temp) = &settings.directories.temp {
        ui::kv("Temp", temp);
    }
    ui::kv("Environment", &settings.environment().location());

    show_storage(&settings);
    show_items(&settings);

    ui::section("Heap");
    match settings.heap_size_mb() {
        Some(mb) => {
            let source = if settings.heap.size_mb.is_some() {
                "configured"
            } else {
                "half of physical memory"
            };
            ui::kv("Size", &format!("{} ({source})", ui::format_mb(mb)));
        }
        None => ui::kv("Size", &"unknown on this platform".dimmed().to_string()),
    }

    println!();
    Ok(())
}

fn show_storage(settings: &Settings) {
    ui::section("Storage");
    let storage = &settings.storage;
    if let Some(cs) = &storage.connection_string {
        ui::kv("Connection string", &ui::redact(cs));
    }
    if let Some(name) = &storage.account_name {
        ui::kv("Account", name);
    }
    if storage.account_key.is_some() {
        ui::kv("Account key", "<redacted>");
    }

    match settings.credentials() {
        Ok(Some(credentials)) => {
            let auth = if credentials.uses_sas() { "SAS token" } else { "shared key" };
            ui::kv(
                "Resolved",
                &format!("{} via {auth}", credentials.blob_endpoint()),
            );
        }
        Ok(None) => {
            let note = if settings.needs_storage() {
                "missing (required by a storage download)".red().to_string()
            } else {
                "not configured".dimmed().to_string()
            };
            ui::kv("Resolved", &note);
        }
        Err(e) => ui::kv("Resolved", &format!("{} {e:#}", "invalid:".red())),
    }
}

fn show_items(settings: &Settings) {
    if let Some(java) = &settings.java {
        ui::section("java");
        ui::kv("Installer", &java.installer);
        ui::kv("Source", &java.download_url);
        ui::kv("Download type", &provisioner::DownloadType::from_flag(&java.download_type).to_string());
        if let Some(secs) = java.install_timeout_secs {
            ui::kv("Install timeout", &format!("{secs}s"));
        }
    }
    if let Some(es) = &settings.elasticsearch {
        ui::section("elasticsearch");
        ui::kv("Archive", &es.archive);
        ui::kv("Source", &es.download_url);
        ui::kv("Download type", &provisioner::DownloadType::from_flag(&es.download_type).to_string());
    }
}
