use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use anyhow::Result;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;

use crate::config::Config;
use crate::config::ConfigKey;
use crate::domain::models::Report;
use crate::domain::models::ReportOptions;
use crate::domain::models::StreamEvent;
use crate::domain::services::OrchestratorSettings;
use crate::domain::services::SessionOrchestrator;
use crate::infrastructure::backends::BackendManager;
use crate::infrastructure::stores::FilesystemStore;

const REAPER_INTERVAL: Duration = Duration::from_secs(60);

fn print_report(report: &Report) {
    println!("\n{}", report.title);
    for section in &report.sections {
        println!("\n{} {}\n", "#".repeat(section.level as usize), section.heading);
        println!("{}", section.body);
    }
}

/// Line-oriented chat loop on stdin/stdout, streaming model output as it
/// arrives.
pub async fn start() -> Result<()> {
    let backend = BackendManager::get(&Config::get(ConfigKey::Backend))?;
    backend.health_check().await?;

    let mut model = Config::get(ConfigKey::Model);
    if model.is_empty() {
        let models = backend.list_models().await?;
        if models.is_empty() {
            bail!("The backend has no models available");
        }
        model = models[0].to_string();
        Config::set(ConfigKey::Model, &model);
    }

    let orchestrator = Arc::new(SessionOrchestrator::new(
        backend,
        Box::<FilesystemStore>::default(),
        OrchestratorSettings::default(),
    ));
    let _reaper = orchestrator.start_reaper(REAPER_INTERVAL);

    let user = Config::get(ConfigKey::Username);
    let mut session_id = Config::get(ConfigKey::SessionID);
    if session_id.is_empty() {
        session_id = orchestrator.open_session(&user, &model).await?;
    }

    println!("Session {session_id} using {model}. Type /report for a report, /quit to exit.");

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }
        if line == "/report" {
            match orchestrator
                .request_report(&session_id, &user, &ReportOptions::default())
                .await
            {
                Ok(report) => print_report(&report),
                Err(err) => println!("Report failed: {err}"),
            }
            continue;
        }

        match orchestrator.submit(&session_id, &user, &line).await {
            Ok(mut handle) => {
                while let Some(event) = handle.recv().await {
                    match event {
                        StreamEvent::Delta(text) => {
                            stdout.write_all(text.as_bytes()).await?;
                            stdout.flush().await?;
                        }
                        StreamEvent::Done(_) => {
                            stdout.write_all(b"\n").await?;
                            break;
                        }
                        StreamEvent::Error(err) => {
                            println!("\nExchange failed: {err}");
                            break;
                        }
                    }
                }
            }
            Err(err) => println!("Could not submit message: {err}"),
        }
    }

    return Ok(());
}
