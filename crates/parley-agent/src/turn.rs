// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One user turn through gate, memory and gateway.
//!
//! Order: capability check, access decision, history read, gateway call,
//! history write, then at most one deduction. A failed gateway call returns
//! before anything is written or charged.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use parley_billing::{AccessGate, Capability, DenyReason};
use parley_config::ParleyConfig;
use parley_core::{
    ChatGateway, DomainError, FileFetcher, GeneratedImage, ParleyError, PendingFileMeta, Role,
    UserId,
};
use parley_gateway::request::{
    self, AttachedFile, AudioClip, RequestContext, image_generation_request,
};
use parley_gateway::extract_text;
use parley_session::ConversationStore;
use tracing::{debug, info, warn};

/// What the user sent.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnInput {
    Text {
        text: String,
    },
    /// Images as `data:` URLs.
    Image {
        caption: Option<String>,
        images: Vec<String>,
    },
    Audio {
        caption: Option<String>,
        data_base64: String,
        format: String,
    },
    GenerateImage {
        prompt: String,
    },
}

impl TurnInput {
    fn required_capability(&self) -> Option<Capability> {
        match self {
            TurnInput::Text { .. } => None,
            TurnInput::Image { .. } => Some(Capability::Photos),
            TurnInput::Audio { .. } => Some(Capability::Audio),
            TurnInput::GenerateImage { .. } => Some(Capability::ImageGen),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            TurnInput::Text { .. } => "text",
            TurnInput::Image { .. } => "image",
            TurnInput::Audio { .. } => "audio",
            TurnInput::GenerateImage { .. } => "image generation",
        }
    }

    /// The user entry recorded in history.
    fn summary(&self, file: Option<&PendingFileMeta>) -> String {
        let caption = |c: &Option<String>, fallback: &str| {
            c.as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| fallback.to_string())
        };
        match self {
            TurnInput::Text { text } => match file {
                Some(meta) => format!("[file: {}] {text}", meta.file_name),
                None => text.clone(),
            },
            TurnInput::Image { caption: c, images } => {
                format!("[{} image(s)] {}", images.len(), caption(c, ""))
                    .trim_end()
                    .to_string()
            }
            TurnInput::Audio { caption: c, .. } => caption(c, "[voice message]"),
            TurnInput::GenerateImage { prompt } => format!("[image request] {prompt}"),
        }
    }
}

/// A single inbound turn.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub user: UserId,
    /// Model chosen by the user; the configured default when `None`.
    pub model: Option<String>,
    /// Price multiplier passed to the access gate.
    pub multiplier: f64,
    pub input: TurnInput,
}

impl Turn {
    pub fn new(user: UserId, input: TurnInput) -> Self {
        Self {
            user,
            model: None,
            multiplier: 1.0,
            input,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Result handed back to the delivery surface.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Reply {
        text: String,
        images: Vec<GeneratedImage>,
    },
    Denied(DenyReason),
    Unsupported {
        capability: Capability,
    },
}

/// Fixed settings of the turn pipeline.
#[derive(Debug, Clone)]
pub struct TurnSettings {
    pub default_model: String,
    pub image_model: String,
    pub system_prompt: String,
    pub default_audio_prompt: String,
}

impl TurnSettings {
    pub fn from_config(config: &ParleyConfig, system_prompt: String) -> Self {
        Self {
            default_model: config.gateway.default_model.clone(),
            image_model: config.gateway.image_model.clone(),
            system_prompt,
            default_audio_prompt: config.bot.default_audio_prompt.clone(),
        }
    }
}

/// Runs turns end to end.
#[derive(Clone)]
pub struct TurnHandler {
    conversations: ConversationStore,
    gate: AccessGate,
    gateway: Arc<dyn ChatGateway>,
    files: Arc<dyn FileFetcher>,
    settings: TurnSettings,
}

impl TurnHandler {
    pub fn new(
        conversations: ConversationStore,
        gate: AccessGate,
        gateway: Arc<dyn ChatGateway>,
        files: Arc<dyn FileFetcher>,
        settings: TurnSettings,
    ) -> Self {
        Self {
            conversations,
            gate,
            gateway,
            files,
            settings,
        }
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    fn model_for(&self, turn: &Turn) -> String {
        match (&turn.model, &turn.input) {
            (Some(model), _) => model.clone(),
            (None, TurnInput::GenerateImage { .. }) => self.settings.image_model.clone(),
            (None, _) => self.settings.default_model.clone(),
        }
    }

    /// Handles one turn.
    ///
    /// Errors are returned raw; map them with [`user_facing_message`] before
    /// showing anything to the user.
    pub async fn handle(&self, turn: Turn) -> Result<TurnOutcome, ParleyError> {
        let user = turn.user;
        let model = self.model_for(&turn);
        let capabilities = self.gate.pricing().capabilities(&model)?;

        if let Some(capability) = turn.input.required_capability()
            && !capabilities.supports(capability)
        {
            debug!(user_id = %user, model, %capability, "model lacks capability");
            return Ok(TurnOutcome::Unsupported { capability });
        }

        let decision = self.gate.check_access(user, &model, turn.multiplier).await?;
        if !decision.allowed {
            let reason = decision.reason.unwrap_or(DenyReason::InsufficientFunds);
            info!(user_id = %user, model, %reason, "turn denied");
            return Ok(TurnOutcome::Denied(reason));
        }

        let history = self.conversations.get_history(user).await;
        let ctx = RequestContext {
            model: &model,
            system_prompt: &self.settings.system_prompt,
            history: &history,
        };

        let mut consumed_file = None;
        let (reply_text, images, new_last_image) = match &turn.input {
            TurnInput::Text { text } => {
                // A model without file support leaves the upload pending.
                let attached = if capabilities.files {
                    self.conversations.take_pending_file(user).await
                } else {
                    None
                };
                let file_text = match &attached {
                    Some(meta) => Some(self.read_file(meta).await?),
                    None => None,
                };
                let file = attached.as_ref().zip(file_text.as_deref()).map(|(meta, text)| {
                    AttachedFile {
                        name: &meta.file_name,
                        text,
                    }
                });
                let last_image = self.conversations.get_last_image(user).await;
                let req = request::text_request(&ctx, text, file, last_image.as_deref());
                let completion = self.gateway.complete(req).await?;
                consumed_file = attached;
                (completion.text, Vec::new(), None)
            }
            TurnInput::Image { caption, images } => {
                let req = request::image_request(&ctx, caption.as_deref(), images)?;
                let completion = self.gateway.complete(req).await?;
                (completion.text, Vec::new(), images.last().cloned())
            }
            TurnInput::Audio {
                caption,
                data_base64,
                format,
            } => {
                let last_image = self.conversations.get_last_image(user).await;
                let req = request::audio_request(
                    &ctx,
                    caption.as_deref(),
                    &self.settings.default_audio_prompt,
                    AudioClip {
                        data_base64,
                        format,
                    },
                    last_image.as_deref(),
                );
                let completion = self.gateway.complete(req).await?;
                (completion.text, Vec::new(), None)
            }
            TurnInput::GenerateImage { prompt } => {
                let reference = self.conversations.get_last_image(user).await;
                let req = image_generation_request(
                    &model,
                    &self.settings.system_prompt,
                    prompt,
                    reference.as_deref(),
                );
                let generation = self.gateway.generate_image(req).await?;
                if generation.images.is_empty() {
                    return Err(ParleyError::gateway("image model returned no image"));
                }
                let text = generation
                    .text
                    .unwrap_or_else(|| format!("[generated {} image(s)]", generation.images.len()));
                let first = generation.images.first().map(to_data_url);
                (text, generation.images, first)
            }
        };

        // An unpaid reply is never recorded.
        let description = format!("{} via {model}", turn.input.kind());
        let charged = self
            .gate
            .deduct_if_needed(user, &model, decision.price, &description)
            .await?;

        self.conversations
            .append_message(user, Role::User, &turn.input.summary(consumed_file.as_ref()))
            .await?;
        self.conversations
            .append_message(user, Role::Assistant, &reply_text)
            .await?;
        if let Some(url) = new_last_image
            && let Err(e) = self.conversations.set_last_image(user, &url).await
        {
            warn!(user_id = %user, error = %e, "failed to cache last image");
        }
        info!(
            user_id = %user,
            model,
            kind = turn.input.kind(),
            charged,
            reply_chars = reply_text.chars().count(),
            images = images.len(),
            "turn completed"
        );

        Ok(TurnOutcome::Reply {
            text: reply_text,
            images,
        })
    }

    /// Fetches and extracts an uploaded document off the async workers.
    async fn read_file(&self, meta: &PendingFileMeta) -> Result<String, ParleyError> {
        let bytes = self.files.fetch(&meta.file_id).await?;
        let mime_type = meta.mime_type.clone();
        let text = tokio::task::spawn_blocking(move || extract_text(&mime_type, &bytes))
            .await
            .map_err(|e| ParleyError::Internal(format!("extraction task failed: {e}")))??;
        debug!(file = meta.file_name, chars = text.chars().count(), "file extracted");
        Ok(text)
    }
}

fn to_data_url(image: &GeneratedImage) -> String {
    format!("data:{};base64,{}", image.mime_type, STANDARD.encode(&image.data))
}

/// Message shown to the user for a denied turn.
pub fn deny_message(reason: DenyReason) -> &'static str {
    match reason {
        DenyReason::InsufficientFunds => {
            "Not enough SP on your balance for this model. Top up or pick a cheaper model."
        }
        DenyReason::DailyLimitReached => {
            "You have used all free messages for today. Come back tomorrow or subscribe."
        }
    }
}

/// Message shown to the user for a failed turn. Never includes error details.
pub fn user_facing_message(error: &ParleyError) -> &'static str {
    match error {
        ParleyError::Domain(DomainError::InsufficientFunds) => {
            "Not enough SP on your balance for this request."
        }
        ParleyError::Domain(DomainError::UserNotFound) => {
            "Your account has no balance yet. Top up to use paid models."
        }
        ParleyError::Extraction { .. } => {
            "I could not read that file. PDF, DOCX, PPTX, CSV and text files are supported."
        }
        ParleyError::UnknownModel(_) => "That model is not available. Please choose another one.",
        ParleyError::Unsupported(_) => "This kind of message is not supported here.",
        _ => "Something went wrong while processing your message. Please try again later.",
    }
}

/// Loads the system prompt following priority: file > inline > default.
pub async fn load_system_prompt(
    bot_name: &str,
    inline_prompt: &Option<String>,
    prompt_file: &Option<String>,
) -> String {
    if let Some(file_path) = prompt_file {
        match tokio::fs::read_to_string(file_path).await {
            Ok(content) => {
                let trimmed = content.trim().to_string();
                if !trimmed.is_empty() {
                    info!(path = file_path, "loaded system prompt from file");
                    return trimmed;
                }
            }
            Err(e) => {
                warn!(path = file_path, error = %e, "failed to read system prompt file, falling back");
            }
        }
    }

    if let Some(prompt) = inline_prompt
        && !prompt.is_empty()
    {
        return prompt.clone();
    }

    format!("You are {bot_name}, a helpful assistant. Answer concisely.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summaries_describe_the_input() {
        let text = TurnInput::Text { text: "hi".into() };
        assert_eq!(text.summary(None), "hi");

        let image = TurnInput::Image {
            caption: None,
            images: vec!["data:image/png;base64,AA".into()],
        };
        assert_eq!(image.summary(None), "[1 image(s)]");

        let audio = TurnInput::Audio {
            caption: Some("  ".into()),
            data_base64: "AA".into(),
            format: "ogg".into(),
        };
        assert_eq!(audio.summary(None), "[voice message]");
    }

    #[test]
    fn raw_errors_never_reach_users() {
        let err = ParleyError::gateway_status(500, "upstream stack trace: secret-token-123");
        let msg = user_facing_message(&err);
        assert!(!msg.contains("secret"));
        assert!(!msg.contains("500"));
    }

    #[test]
    fn data_url_round_trip() {
        let url = to_data_url(&GeneratedImage {
            data: vec![0, 0, 0],
            mime_type: "image/png".into(),
        });
        assert_eq!(url, "data:image/png;base64,AAAA");
    }

    #[tokio::test]
    async fn system_prompt_default() {
        let prompt = load_system_prompt("parley", &None, &None).await;
        assert_eq!(prompt, "You are parley, a helpful assistant. Answer concisely.");
    }

    #[tokio::test]
    async fn system_prompt_file_overrides_inline() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("prompt.md");
        std::fs::write(&file_path, "File-based prompt.\n").unwrap();
        let prompt = load_system_prompt(
            "parley",
            &Some("Inline prompt.".into()),
            &Some(file_path.to_string_lossy().into_owned()),
        )
        .await;
        assert_eq!(prompt, "File-based prompt.");
    }

    #[tokio::test]
    async fn system_prompt_missing_file_falls_back_to_inline() {
        let prompt = load_system_prompt(
            "parley",
            &Some("Fallback prompt.".into()),
            &Some("/nonexistent/path/prompt.md".into()),
        )
        .await;
        assert_eq!(prompt, "Fallback prompt.");
    }
}
