// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `parley shell` command implementation.
//!
//! Interactive REPL that drives turns through the full pipeline for one
//! user: access gate, conversation memory, gateway and billing. Local files
//! stand in for uploads, so `/file` and `/image` exercise the same flows a
//! chat front end would.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use colored::Colorize;
use parley_agent::{Turn, TurnHandler, TurnInput, TurnOutcome, deny_message, user_facing_message};
use parley_config::ParleyConfig;
use parley_core::{BalanceOracle, FileFetcher, GeneratedImage, ParleyError, PendingFileMeta, UserId};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::debug;

use crate::app;

/// Reads "uploaded" files straight from the local filesystem. The file id is
/// the path.
struct LocalFileFetcher;

#[async_trait]
impl FileFetcher for LocalFileFetcher {
    async fn fetch(&self, file_id: &str) -> Result<Vec<u8>, ParleyError> {
        tokio::fs::read(file_id)
            .await
            .map_err(|e| ParleyError::Internal(format!("failed to read {file_id}: {e}")))
    }
}

/// One parsed line of shell input.
#[derive(Debug, Clone, PartialEq)]
enum ShellCommand<'a> {
    Quit,
    Clear,
    Balance,
    Help,
    Model(Option<&'a str>),
    File(&'a str),
    Image { path: &'a str, caption: Option<&'a str> },
    Draw(&'a str),
    Message(&'a str),
    Invalid(&'static str),
}

fn parse_command(line: &str) -> ShellCommand<'_> {
    let line = line.trim();
    let Some(rest) = line.strip_prefix('/') else {
        return ShellCommand::Message(line);
    };
    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, Some(arg.trim()).filter(|a| !a.is_empty())),
        None => (rest, None),
    };
    match (name, arg) {
        ("quit" | "exit", _) => ShellCommand::Quit,
        ("clear", _) => ShellCommand::Clear,
        ("balance", _) => ShellCommand::Balance,
        ("help", _) => ShellCommand::Help,
        ("model", arg) => ShellCommand::Model(arg),
        ("file", Some(path)) => ShellCommand::File(path),
        ("file", None) => ShellCommand::Invalid("usage: /file <path>"),
        ("image", Some(arg)) => {
            let (path, caption) = match arg.split_once(char::is_whitespace) {
                Some((path, caption)) => (path, Some(caption.trim()).filter(|c| !c.is_empty())),
                None => (arg, None),
            };
            ShellCommand::Image { path, caption }
        }
        ("image", None) => ShellCommand::Invalid("usage: /image <path> [caption]"),
        ("draw", Some(prompt)) => ShellCommand::Draw(prompt),
        ("draw", None) => ShellCommand::Invalid("usage: /draw <prompt>"),
        _ => ShellCommand::Invalid("unknown command, try /help"),
    }
}

/// Best-effort MIME type from a file extension.
fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "csv" => "text/csv",
        "md" => "text/markdown",
        "txt" | "log" | "rs" | "toml" | "json" => "text/plain",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}

fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "png",
    }
}

/// Runs the interactive shell.
pub async fn run_shell(
    config: ParleyConfig,
    user: UserId,
    model: Option<String>,
) -> Result<(), ParleyError> {
    app::init_tracing("warn");

    let app::Services {
        handler, ledger, ..
    } = app::build_services(&config, Arc::new(LocalFileFetcher)).await?;
    let mut model = model;

    let mut rl = DefaultEditor::new()
        .map_err(|e| ParleyError::Internal(format!("failed to initialize readline: {e}")))?;

    println!("{}", "parley shell".bold().green());
    println!(
        "user {user}, model {}. Type {} for commands, {} to exit.\n",
        model.as_deref().unwrap_or(&config.gateway.default_model),
        "/help".yellow(),
        "/quit".yellow()
    );

    let prompt = format!("{}> ", "parley".green());
    let mut drawn = 0usize;
    loop {
        let line = match rl.readline(&prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{}: {e}", "error".red());
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(&line);

        let input = match parse_command(&line) {
            ShellCommand::Quit => break,
            ShellCommand::Help => {
                print_help();
                continue;
            }
            ShellCommand::Invalid(usage) => {
                eprintln!("{}", usage.yellow());
                continue;
            }
            ShellCommand::Clear => {
                match handler.conversations().clear_history(user).await {
                    Ok(()) => println!("{}", "history cleared".dimmed()),
                    Err(e) => eprintln!("{}: {e}", "error".red()),
                }
                continue;
            }
            ShellCommand::Balance => {
                match ledger.get_balance(user).await {
                    Ok(balance) => println!("balance: {balance:.2} SP"),
                    Err(e) => eprintln!("{}: {e}", "error".red()),
                }
                continue;
            }
            ShellCommand::Model(choice) => {
                match choice {
                    Some(name) => {
                        model = Some(name.to_string());
                        println!("{}", format!("model set to {name}").dimmed());
                    }
                    None => println!(
                        "model: {}",
                        model.as_deref().unwrap_or(&config.gateway.default_model)
                    ),
                }
                continue;
            }
            ShellCommand::File(path) => {
                if let Err(e) = attach_file(&handler, user, path).await {
                    eprintln!("{}: {e}", "error".red());
                }
                continue;
            }
            ShellCommand::Image { path, caption } => match read_image(path).await {
                Ok(data_url) => TurnInput::Image {
                    caption: caption.map(str::to_string),
                    images: vec![data_url],
                },
                Err(e) => {
                    eprintln!("{}: {e}", "error".red());
                    continue;
                }
            },
            ShellCommand::Draw(prompt) => TurnInput::GenerateImage {
                prompt: prompt.to_string(),
            },
            ShellCommand::Message(text) => TurnInput::Text {
                text: text.to_string(),
            },
        };

        let mut turn = Turn::new(user, input);
        if let Some(name) = &model {
            turn = turn.with_model(name.clone());
        }

        match handler.handle(turn).await {
            Ok(TurnOutcome::Reply { text, images }) => {
                if !text.is_empty() {
                    println!("{text}");
                }
                for image in &images {
                    drawn += 1;
                    save_image(image, drawn).await;
                }
            }
            Ok(TurnOutcome::Denied(reason)) => eprintln!("{}", deny_message(reason).yellow()),
            Ok(TurnOutcome::Unsupported { capability }) => eprintln!(
                "{}",
                format!("this model does not support {capability}").yellow()
            ),
            Err(e) => {
                debug!(error = %e, "turn failed");
                eprintln!("{}", user_facing_message(&e).red());
            }
        }
    }

    println!("{}", "goodbye".dimmed());
    Ok(())
}

fn print_help() {
    println!("  {}             clear conversation history", "/clear".yellow());
    println!("  {}           show balance", "/balance".yellow());
    println!("  {}     show or switch model", "/model [name]".yellow());
    println!("  {}       attach a document to the next message", "/file <path>".yellow());
    println!("  {} send an image", "/image <path> [text]".yellow());
    println!("  {}    generate an image", "/draw <prompt>".yellow());
    println!("  {}              exit", "/quit".yellow());
}

/// Records a local file as the user's pending upload.
async fn attach_file(handler: &TurnHandler, user: UserId, path: &str) -> Result<(), ParleyError> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| ParleyError::Internal(format!("failed to stat {path}: {e}")))?;
    let file_path = Path::new(path);
    let meta = PendingFileMeta {
        file_id: path.to_string(),
        file_name: file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string()),
        mime_type: mime_for_path(file_path).to_string(),
        size: metadata.len(),
        timestamp: Utc::now(),
    };
    handler.conversations().set_pending_file(user, &meta).await?;
    println!(
        "{}",
        format!("attached {} ({}), it goes with your next message", meta.file_name, meta.mime_type)
            .dimmed()
    );
    Ok(())
}

async fn read_image(path: &str) -> Result<String, ParleyError> {
    let mime_type = mime_for_path(Path::new(path));
    if !mime_type.starts_with("image/") {
        return Err(ParleyError::Unsupported(format!("{path} is not an image")));
    }
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ParleyError::Internal(format!("failed to read {path}: {e}")))?;
    Ok(format!("data:{mime_type};base64,{}", STANDARD.encode(bytes)))
}

async fn save_image(image: &GeneratedImage, index: usize) {
    let name = format!("parley-image-{index}.{}", extension_for_mime(&image.mime_type));
    let target = std::env::temp_dir().join(name);
    match tokio::fs::write(&target, &image.data).await {
        Ok(()) => println!(
            "{}",
            format!("[image saved to {}]", target.display()).dimmed()
        ),
        Err(e) => eprintln!("{}: failed to save image: {e}", "error".red()),
    }
}
