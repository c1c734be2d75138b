//! CLI command implementations

use anyhow::{Context, Result};
use serde::Serialize;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::api::{ApiClient, VideoBackend, VideoFilter, VideoRecord, VideoStatus};
use crate::auth::CredentialStore;
use crate::cli::args::ConfigCommand;
use crate::config::Settings;
use crate::monitor::{
    ConnectionState, HttpPushChannel, LatestStatus, MonitorOptions, MonitorSnapshot,
    ProgressMonitor,
};
use crate::session::{SessionEvent, SessionState, Uploader};
use crate::upload::{format_bytes, UploadFile, UploadProgressSample};
use crate::VidjotError;

const PROGRESS_BAR_WIDTH: usize = 30;

/// Sign in and persist the bearer token
pub async fn login(settings: &Settings, password: Option<String>) -> Result<()> {
    settings.ensure_dirs()?;

    let password = match password {
        Some(password) => password,
        None => read_password()?,
    };

    let credentials = CredentialStore::load(&settings.credentials_path())?;
    let client = ApiClient::from_settings(settings, credentials)?;
    client
        .authenticate(&password)
        .await
        .with_context(|| format!("Failed to sign in to {}", client.base_url()))?;

    println!("Signed in to {}", client.base_url());
    Ok(())
}

/// Forget the stored bearer token
pub fn logout(settings: &Settings) -> Result<()> {
    CredentialStore::load(&settings.credentials_path())?.invalidate();
    println!("Signed out");
    Ok(())
}

/// Upload a video, create its record and start processing
pub async fn upload_video(settings: &Settings, path: &Path, watch: bool) -> Result<()> {
    let client = api_client(settings)?;
    let file = UploadFile::from_path(path)?;
    let name = file.name.clone();
    let size = file.size;

    let mut uploader = Uploader::from_settings(settings, client.clone())?;
    let (session, events) = uploader.open_session(file)?;

    eprintln!("Uploading {} ({})", name, format_bytes(size));

    let cancel = session.cancel_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() && cancel.cancel() {
            eprintln!();
            eprintln!("Cancelling upload...");
        }
    });
    let renderer = tokio::spawn(render_session(events));

    let result = session.run().await;
    interrupt.abort();
    let _ = renderer.await;

    let record = session_outcome(result)?;

    println!("Uploaded {} as video {}", name, record.id);

    if watch {
        follow_progress(settings, &client, &record, false).await
    } else {
        println!("Follow processing with: vidjot watch {}", record.id);
        Ok(())
    }
}

/// Map a finished session to the command result; a cancel is a failure too
fn session_outcome(result: crate::Result<VideoRecord>) -> Result<VideoRecord> {
    match result {
        Ok(record) => Ok(record),
        Err(VidjotError::Cancelled) => anyhow::bail!("Upload cancelled"),
        Err(e @ VidjotError::Transfer(_)) => {
            Err(e).context("Upload did not finish; run the same command again to retry")
        }
        Err(e) => Err(e.into()),
    }
}

/// List videos in the journal
pub async fn list_videos(
    settings: &Settings,
    status: Option<VideoStatus>,
    tag: Option<String>,
    limit: u32,
) -> Result<()> {
    let client = api_client(settings)?;
    let list = client
        .list_videos(&VideoFilter {
            status,
            tag,
            limit: Some(limit),
        })
        .await?;

    if list.videos.is_empty() {
        println!("No videos found");
        return Ok(());
    }

    println!(
        "{:<36} {:<30} {:<11} {:<12} {:<8}",
        "ID", "Title", "Status", "Date", "Duration"
    );
    println!("{}", "-".repeat(100));

    for video in &list.videos {
        let duration = video
            .duration_seconds
            .map(|secs| format_duration(secs.max(0.0) as u64))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<36} {:<30} {:<11} {:<12} {:<8}",
            video.id,
            truncate(video.display_title(), 28),
            video.status,
            video.created_at.format("%Y-%m-%d"),
            duration
        );
    }

    if list.total > list.videos.len() {
        println!();
        println!("Showing {} of {} videos", list.videos.len(), list.total);
    }

    Ok(())
}

/// Show a video's details and transcript
pub async fn view_video(settings: &Settings, id: &str) -> Result<()> {
    let client = api_client(settings)?;
    let video = client.get_video(id).await?;

    println!("Title: {}", video.display_title());
    println!("ID: {}", video.id);
    println!("File: {}", video.filename);
    println!("Status: {}", video.status);
    println!("Date: {}", video.created_at.format("%Y-%m-%d %H:%M"));
    if let Some(duration) = video.duration_seconds {
        println!("Duration: {}", format_duration(duration.max(0.0) as u64));
    }
    if !video.tags.is_empty() {
        println!("Tags: {}", video.tags.join(", "));
    }
    if let Some(url) = &video.storage_url {
        println!("Playback: {}", url);
    }

    if let Some(summary) = video.summary.as_deref() {
        println!();
        println!("Summary:");
        println!("{}", summary);
    }
    println!();

    match video.transcript.as_deref() {
        Some(transcript) if !transcript.trim().is_empty() => println!("{}", transcript),
        _ => println!("(No transcript available yet)"),
    }

    Ok(())
}

/// Start AI processing for an existing video
pub async fn process_video(settings: &Settings, id: &str, watch: bool) -> Result<()> {
    let client = api_client(settings)?;
    let ack = client
        .start_processing(id)
        .await
        .map_err(|e| e.reclassify(VidjotError::ProcessingStart))?;

    if ack.already_processing() {
        println!("Video {} is already being processed", id);
    } else {
        println!("Processing started for {}", id);
    }

    if watch {
        let video = client.get_video(id).await?;
        follow_progress(settings, &client, &video, false).await?;
    }

    Ok(())
}

/// Follow processing progress for a video
pub async fn watch_video(settings: &Settings, id: &str, poll: bool) -> Result<()> {
    let client = api_client(settings)?;
    let video = client.get_video(id).await?;
    follow_progress(settings, &client, &video, poll).await
}

/// Delete a video and its stored file
pub async fn delete_video(settings: &Settings, id: &str) -> Result<()> {
    let client = api_client(settings)?;
    client.delete_video(id).await?;
    println!("Deleted video {}", id);
    Ok(())
}

/// List every tag in use
pub async fn list_tags(settings: &Settings) -> Result<()> {
    let client = api_client(settings)?;
    let tags = client.list_tags().await?;

    if tags.tags.is_empty() {
        println!("No tags yet");
        return Ok(());
    }

    for tag in tags.tags {
        println!("{}", tag);
    }
    Ok(())
}

/// Handle config subcommands
pub fn config_command(settings: &Settings, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show => {
            let toml = toml::to_string_pretty(settings)?;
            println!("{}", toml);
        }
        ConfigCommand::Path => {
            let path = Settings::config_path()?;
            println!("{}", path.display());
        }
        ConfigCommand::Init { force } => {
            let path = Settings::config_path()?;
            if path.exists() && !force {
                anyhow::bail!(
                    "Config file already exists at {}. Use --force to overwrite.",
                    path.display()
                );
            }
            Settings::write_default(&path)?;
            println!("Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

#[derive(Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: &'static str,
    detail: String,
}

#[derive(Serialize)]
struct DoctorReport {
    version: &'static str,
    api_url: String,
    config_file: String,
    credentials: &'static str,
    checks: Vec<DoctorCheck>,
    notes: Vec<String>,
}

/// Run diagnostic checks to help troubleshoot setup issues.
pub async fn run_doctor(settings: &Settings, json: bool) -> Result<()> {
    let report = collect_doctor_report(settings).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("vidjot doctor");
    println!("version: {}", report.version);
    println!("api: {}", report.api_url);
    println!("config: {}", report.config_file);
    println!("credentials: {}", report.credentials);
    println!();

    for check in &report.checks {
        println!("{:<12} {:<8} {}", check.name, check.status, check.detail);
    }

    if !report.notes.is_empty() {
        println!();
        for note in &report.notes {
            println!("{}", note);
        }
    }

    Ok(())
}

async fn collect_doctor_report(settings: &Settings) -> Result<DoctorReport> {
    let config_path = Settings::config_path()?;
    let env_token = Settings::env_token().is_some();
    let stored = CredentialStore::load(&settings.credentials_path())?;

    let credentials = if env_token {
        "environment (VIDJOT_TOKEN)"
    } else if stored.is_signed_in() {
        "stored"
    } else {
        "none"
    };

    let mut checks = Vec::new();
    let mut notes = Vec::new();

    checks.push(DoctorCheck {
        name: "config",
        status: if config_path.exists() { "ok" } else { "default" },
        detail: if config_path.exists() {
            config_path.display().to_string()
        } else {
            "no config file, using defaults".to_string()
        },
    });

    let client = api_client(settings)?;
    let (status, detail) = match client.health().await {
        Ok(()) => ("ok", format!("{} is reachable", client.base_url())),
        Err(e) => ("error", e.to_string()),
    };
    checks.push(DoctorCheck {
        name: "backend",
        status,
        detail,
    });
    if status != "ok" {
        notes.push(
            "hint: set api.base_url in the config file or VIDJOT_API_URL in the environment."
                .to_string(),
        );
    }

    if credentials == "none" {
        notes.push("hint: run `vidjot login` to sign in.".to_string());
    }

    Ok(DoctorReport {
        version: crate::VERSION,
        api_url: settings.api.base_url.clone(),
        config_file: config_path.display().to_string(),
        credentials,
        checks,
        notes,
    })
}

// Helper functions

/// Client using `VIDJOT_TOKEN` when set, otherwise the stored credentials
fn api_client(settings: &Settings) -> Result<ApiClient> {
    let credentials = match Settings::env_token() {
        Some(token) => CredentialStore::in_memory(Some(token)),
        None => CredentialStore::load(&settings.credentials_path())?,
    };
    Ok(ApiClient::from_settings(settings, credentials)?)
}

fn progress_monitor(settings: &Settings, client: &ApiClient) -> Result<ProgressMonitor> {
    let push = Arc::new(HttpPushChannel::new(
        client.base_url(),
        settings.request_timeout(),
    )?);
    Ok(ProgressMonitor::new(
        push,
        Arc::new(client.clone()),
        MonitorOptions::from_settings(settings),
    ))
}

/// Print pipeline progress until the video is ready or failed
async fn follow_progress(
    settings: &Settings,
    client: &ApiClient,
    video: &VideoRecord,
    poll: bool,
) -> Result<()> {
    let monitor = progress_monitor(settings, client)?;
    let mut subscription = if poll && !video.status.is_terminal() {
        monitor.subscribe_polling(&video.id)?
    } else {
        monitor.subscribe_record(video)?
    };

    let mut last_line = String::new();
    let mut snapshot = subscription.snapshot();

    let finished = loop {
        let line = describe_snapshot(&snapshot);
        if line != last_line {
            eprintln!("{}", line);
            last_line = line;
        }
        if snapshot.is_terminal() {
            break Some(snapshot);
        }

        tokio::select! {
            next = subscription.changed() => match next {
                Some(next) => snapshot = next,
                None => break None,
            },
            _ = tokio::signal::ctrl_c() => {
                println!("Stopped watching; processing continues on the server");
                return Ok(());
            }
        }
    };

    match finished.and_then(|s| s.outcome()) {
        Some(VideoStatus::Ready) => {
            let video = client.get_video(&video.id).await?;
            println!("Ready: {}", video.display_title());
            if !video.tags.is_empty() {
                println!("Tags: {}", video.tags.join(", "));
            }
            if let Some(summary) = video.summary.as_deref() {
                println!();
                println!("{}", summary);
            }
            Ok(())
        }
        Some(_) => anyhow::bail!("Processing failed for video {}", video.id),
        None => anyhow::bail!(
            "Lost track of video {}; check it later with `vidjot view {}`",
            video.id,
            video.id
        ),
    }
}

fn describe_snapshot(snapshot: &MonitorSnapshot) -> String {
    let status = match &snapshot.latest {
        LatestStatus::Awaiting => "waiting for progress".to_string(),
        LatestStatus::Pushed(event) => {
            format!("{:>3}% {:<12} {}", event.percent, event.stage, event.message)
        }
        LatestStatus::Polled(status) => format!("status: {}", status),
    };

    if snapshot.is_terminal() {
        return status;
    }

    match snapshot.connection {
        ConnectionState::Connecting | ConnectionState::Disconnected => {
            format!("{} (connecting...)", status)
        }
        ConnectionState::Polling => format!("{} (polling)", status),
        ConnectionState::Connected | ConnectionState::Closed => status,
    }
}

async fn render_session(mut events: mpsc::UnboundedReceiver<SessionEvent>) {
    let mut shown = None;

    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Progress(sample) => {
                let whole = sample.percent.floor() as u32;
                if shown != Some(whole) {
                    eprint!("\r{}", progress_line(&sample));
                    let _ = io::stderr().flush();
                    shown = Some(whole);
                }
            }
            SessionEvent::State(SessionState::Uploading { .. }) => {}
            SessionEvent::State(state) => {
                if shown.take().is_some() {
                    eprintln!();
                }
                match state {
                    SessionState::RecordCreated { video_id } => {
                        eprintln!("Created video {}", video_id)
                    }
                    SessionState::ProcessingStarted { .. } => eprintln!("Processing started"),
                    SessionState::Error { message } => eprintln!("Failed: {}", message),
                    _ => {}
                }
            }
        }
    }
}

fn progress_line(sample: &UploadProgressSample) -> String {
    let filled = ((sample.percent / 100.0) * PROGRESS_BAR_WIDTH as f64).round() as usize;
    let filled = filled.min(PROGRESS_BAR_WIDTH);
    format!(
        "[{}{}] {:>5.1}%  {} / {}",
        "#".repeat(filled),
        "-".repeat(PROGRESS_BAR_WIDTH - filled),
        sample.percent,
        format_bytes(sample.bytes_transferred),
        format_bytes(sample.total_bytes)
    )
}

fn read_password() -> Result<String> {
    eprint!("Password: ");
    io::stderr().flush()?;

    let mut line = String::new();
    io::stdin()
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;

    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        anyhow::bail!("No password given");
    }
    Ok(password)
}

fn format_duration(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
