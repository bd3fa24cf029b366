use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use charla::chat::controllers::{Workspace, WorkspaceError};
use charla::chat::models::conversation::truncate_for_display;
use charla::chat::models::{ChatSession, SessionEvent};
use charla::chat::repositories::ConversationJsonRepository;
use charla::settings::repositories::SettingsJsonRepository;
use charla::settings::{ProviderKind, SettingsService};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let settings_repository =
        Arc::new(SettingsJsonRepository::new().context("could not locate the settings file")?);
    let settings = Arc::new(SettingsService::load(settings_repository).await);

    ensure_provider(&settings).await?;
    let conversations_dir = ensure_conversations_dir(&settings).await?;
    debug!(dir = %conversations_dir.display(), "using conversations folder");

    let repository = Arc::new(ConversationJsonRepository::new(conversations_dir));
    let mut workspace = Workspace::new(settings, repository)?;
    workspace.open_existing().await?;

    println!(
        "charla (provider: {}, theme: {})",
        workspace.provider_name(),
        theme_label(workspace.dark_mode())
    );
    print_tabs(&workspace);
    println!("Commands: /tabs /new /open <name> /close /delete /provider <name> /key <name> /theme /quit");

    loop {
        let active = workspace.active();
        let label = active
            .as_ref()
            .map(|s| s.title())
            .unwrap_or_else(|| "-".to_string());

        let line = prompt(&format!("[{label}] > "))?;
        if line.is_empty() {
            continue;
        }

        let Some(rest) = line.strip_prefix('/') else {
            match active {
                Some(session) => {
                    if let Some(renamed_to) = send_and_render(&session, &line).await {
                        workspace.set_active(&renamed_to);
                    }
                }
                None => println!("No open tab; use /new."),
            }
            continue;
        };

        let mut parts = rest.splitn(2, ' ');
        let command = parts.next().unwrap_or_default();
        let arg = parts.next().unwrap_or("").trim();

        match command {
            "tabs" => print_tabs(&workspace),
            "new" => {
                let session = workspace.new_chat().await?;
                println!("Opened {}", session.name());
            }
            "open" => {
                if arg.is_empty() {
                    println!("Usage: /open <name>");
                } else {
                    let session = workspace.open(arg).await?;
                    render_history(&session);
                }
            }
            "close" => {
                if let Some(session) = active {
                    workspace.close(&session.name());
                    println!("Closed {} (file kept)", session.name());
                }
            }
            "delete" => {
                if let Some(session) = active {
                    let name = session.name();
                    if prompt(&format!("Delete '{name}' and its file? [y/N] "))? == "y" {
                        workspace.remove(&name).await?;
                        println!("Deleted {name}");
                    }
                }
            }
            "provider" => match ProviderKind::parse(arg) {
                Some(kind) => switch_provider(&mut workspace, kind).await?,
                None => println!("Unknown provider: {arg}"),
            },
            "key" => match ProviderKind::parse(arg) {
                Some(kind) => {
                    let key = prompt(&format!("New API key for {kind}: "))?;
                    if !key.is_empty() {
                        workspace.update_api_key(kind, key).await?;
                        println!("Key for {kind} updated.");
                    }
                }
                None => println!("Usage: /key <deepseek|chatgpt>"),
            },
            "theme" => {
                let dark = workspace.toggle_dark_mode().await;
                println!("Theme: {}", theme_label(dark));
            }
            "quit" | "q" | "exit" => break,
            other => println!("Unknown command: /{other}"),
        }
    }

    Ok(())
}

/// First-run dialog: pick a provider and collect its key, then persist.
async fn ensure_provider(settings: &SettingsService) -> Result<()> {
    let configured = settings
        .selected_provider()
        .filter(|kind| settings.api_key(*kind).is_some());
    if configured.is_some() {
        return Ok(());
    }

    let kind = loop {
        let choice = prompt("Provider ([1] DeepSeek, [2] ChatGPT): ")?;
        match choice.as_str() {
            "1" => break ProviderKind::DeepSeek,
            "2" => break ProviderKind::ChatGpt,
            other => match ProviderKind::parse(other) {
                Some(kind) => break kind,
                None => println!("Please answer 1 or 2."),
            },
        }
    };

    let key = loop {
        let key = prompt(&format!("API key for {kind}: "))?;
        if !key.is_empty() {
            break key;
        }
    };

    settings.set_api_key(kind, key);
    settings.select_provider(kind);
    settings.save().await;
    Ok(())
}

/// First-run dialog: choose where the conversations folder lives.
async fn ensure_conversations_dir(settings: &SettingsService) -> Result<PathBuf> {
    if let Some(dir) = settings.conversations_dir()
        && dir.exists()
    {
        return Ok(dir);
    }

    let default_base = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("charla");
    let answer = prompt(&format!(
        "Folder for the 'conversaciones' directory [{}]: ",
        default_base.display()
    ))?;
    let base = if answer.is_empty() {
        default_base
    } else {
        PathBuf::from(answer)
    };

    let dir = base.join("conversaciones");
    tokio::fs::create_dir_all(&dir)
        .await
        .context("could not create the conversations folder")?;

    settings.set_conversations_dir(dir.clone());
    settings.save().await;
    Ok(dir)
}

async fn switch_provider(workspace: &mut Workspace, kind: ProviderKind) -> Result<()> {
    match workspace.switch_provider(kind).await {
        Ok(()) => println!("Provider: {}", workspace.provider_name()),
        Err(WorkspaceError::MissingApiKey(kind)) => {
            let key = prompt(&format!("API key for {kind}: "))?;
            if !key.is_empty() {
                workspace.update_api_key(kind, key).await?;
                workspace.switch_provider(kind).await?;
                println!("Provider: {}", workspace.provider_name());
            }
        }
        Err(err) => return Err(err.into()),
    }
    Ok(())
}

/// Send one message and render the streamed reply inline. Returns the new
/// backing-file name when the session renamed itself.
async fn send_and_render(session: &ChatSession, text: &str) -> Option<String> {
    let mut events = session.subscribe();
    if let Err(err) = session.send(text).await {
        println!("({err})");
        return None;
    }

    let mut author = String::new();
    let mut typing = false;
    let mut renamed_to = None;

    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Renamed { name, title } => {
                println!("[tab renamed to \"{title}\"]");
                renamed_to = Some(name);
            }
            SessionEvent::ReplyStarted { author: name } => {
                author = name;
                print!("{author}: escribiendo...");
                flush();
                typing = true;
            }
            SessionEvent::ReplyDelta { text } => {
                if typing {
                    // overwrite the typing indicator with the reply header
                    print!("\r{:width$}\r{author}: ", "", width = author.len() + 16);
                    typing = false;
                }
                print!("{text}");
                flush();
            }
            SessionEvent::ReplyCompleted { .. } => {
                println!();
                break;
            }
            SessionEvent::ReplyFailed { message } => {
                if typing {
                    println!();
                }
                println!("{}: {}", message.author, message.text);
                break;
            }
        }
    }

    renamed_to
}

fn render_history(session: &ChatSession) {
    println!("=== {} ===", session.title());
    for message in session.messages() {
        let stamp = message.timestamp.as_deref().unwrap_or("");
        println!(
            "{} [{}]: {}",
            message.author,
            stamp,
            truncate_for_display(&message.text)
        );
    }
}

fn print_tabs(workspace: &Workspace) {
    let active = workspace.active().map(|s| s.name());
    println!("Tabs:");
    for session in workspace.sessions() {
        let name = session.name();
        let marker = if active.as_deref() == Some(name.as_str()) {
            "*"
        } else {
            " "
        };
        println!(
            " {marker} {} ({} messages)",
            session.title(),
            session.messages().len()
        );
    }
}

fn theme_label(dark: bool) -> &'static str {
    if dark { "dark" } else { "light" }
}

fn prompt(label: &str) -> Result<String> {
    print!("{label}");
    flush();
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn flush() {
    std::io::stdout().flush().ok();
}
