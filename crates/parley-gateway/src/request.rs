// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request-shape builders.
//!
//! Every builder starts with the system preamble. The text, image and audio
//! shapes replay the stored history before the new user message.

use parley_core::{ChatMessage, ChatRequest, ContentPart, ConversationEntry, ParleyError, Role};

/// Appended to the image-generation preamble when a reference image is sent.
const REFERENCE_IMAGE_GUIDANCE: &str = "\n\nA reference image is attached. \
Edit or transform it only if the user explicitly asks to change, modify or \
build upon that image. If the request describes something new, generate a \
new image and use the reference for context only.";

/// Shared inputs of the conversational request shapes.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext<'a> {
    pub model: &'a str,
    pub system_prompt: &'a str,
    pub history: &'a [ConversationEntry],
}

impl RequestContext<'_> {
    fn preamble(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.history.len() + 3);
        messages.push(ChatMessage::text(Role::System, self.system_prompt));
        messages.extend(
            self.history
                .iter()
                .map(|entry| ChatMessage::text(entry.role, entry.content.clone())),
        );
        messages
    }

    fn request(&self, messages: Vec<ChatMessage>) -> ChatRequest {
        ChatRequest {
            model: self.model.to_string(),
            messages,
            modalities: None,
            max_tokens: None,
        }
    }
}

/// Text extracted from an uploaded document.
#[derive(Debug, Clone, Copy)]
pub struct AttachedFile<'a> {
    pub name: &'a str,
    pub text: &'a str,
}

/// A text turn, optionally carrying a consumed file and the last image for
/// visual continuity.
pub fn text_request(
    ctx: &RequestContext<'_>,
    text: &str,
    file: Option<AttachedFile<'_>>,
    last_image: Option<&str>,
) -> ChatRequest {
    let mut messages = ctx.preamble();
    if let Some(file) = file {
        messages.push(ChatMessage::text(
            Role::User,
            format!("Content of the attached file \"{}\":\n\n{}", file.name, file.text),
        ));
    }
    let message = match last_image {
        Some(url) => ChatMessage::parts(
            Role::User,
            vec![ContentPart::text(text), ContentPart::image(url)],
        ),
        None => ChatMessage::text(Role::User, text),
    };
    messages.push(message);
    ctx.request(messages)
}

/// An image turn with one or more data URLs and an optional caption.
pub fn image_request(
    ctx: &RequestContext<'_>,
    caption: Option<&str>,
    images: &[String],
) -> Result<ChatRequest, ParleyError> {
    if images.is_empty() {
        return Err(ParleyError::Unsupported(
            "image turn without any image".into(),
        ));
    }
    let mut parts = Vec::with_capacity(images.len() + 1);
    if let Some(caption) = caption.map(str::trim).filter(|c| !c.is_empty()) {
        parts.push(ContentPart::text(caption));
    }
    parts.extend(images.iter().map(|url| ContentPart::image(url.as_str())));

    let mut messages = ctx.preamble();
    messages.push(ChatMessage::parts(Role::User, parts));
    Ok(ctx.request(messages))
}

/// Base64 audio with its container format tag.
#[derive(Debug, Clone, Copy)]
pub struct AudioClip<'a> {
    pub data_base64: &'a str,
    pub format: &'a str,
}

/// A voice turn. The text part is never empty: `default_prompt` stands in
/// for a missing caption.
pub fn audio_request(
    ctx: &RequestContext<'_>,
    caption: Option<&str>,
    default_prompt: &str,
    clip: AudioClip<'_>,
    last_image: Option<&str>,
) -> ChatRequest {
    let text = caption
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(default_prompt);
    let mut parts = vec![
        ContentPart::text(text),
        ContentPart::audio(clip.data_base64, clip.format),
    ];
    if let Some(url) = last_image {
        parts.push(ContentPart::image(url));
    }

    let mut messages = ctx.preamble();
    messages.push(ChatMessage::parts(Role::User, parts));
    ctx.request(messages)
}

/// An image-generation turn. History is not replayed.
pub fn image_generation_request(
    model: &str,
    system_prompt: &str,
    prompt: &str,
    reference_image: Option<&str>,
) -> ChatRequest {
    let mut preamble = system_prompt.to_string();
    let user = match reference_image {
        Some(url) => {
            preamble.push_str(REFERENCE_IMAGE_GUIDANCE);
            ChatMessage::parts(
                Role::User,
                vec![ContentPart::text(prompt), ContentPart::image(url)],
            )
        }
        None => ChatMessage::text(Role::User, prompt),
    };
    ChatRequest {
        model: model.to_string(),
        messages: vec![ChatMessage::text(Role::System, preamble), user],
        modalities: Some(vec!["image".to_string(), "text".to_string()]),
        max_tokens: None,
    }
}

#[cfg(test)]
mod tests {
    use parley_core::MessageContent;

    use super::*;

    fn history() -> Vec<ConversationEntry> {
        vec![
            ConversationEntry::new(Role::User, "hi"),
            ConversationEntry::new(Role::Assistant, "hello"),
        ]
    }

    fn ctx(history: &[ConversationEntry]) -> RequestContext<'_> {
        RequestContext {
            model: "openai/gpt-4o-mini",
            system_prompt: "be kind",
            history,
        }
    }

    fn parts(message: &ChatMessage) -> &[ContentPart] {
        match &message.content {
            MessageContent::Parts(parts) => parts,
            MessageContent::Text(text) => panic!("expected parts, got text {text:?}"),
        }
    }

    #[test]
    fn text_request_replays_history_after_preamble() {
        let h = history();
        let req = text_request(&ctx(&h), "what now?", None, None);
        assert_eq!(req.messages.len(), 4);
        assert_eq!(req.messages[0].role, Role::System);
        assert_eq!(req.messages[1].content, MessageContent::Text("hi".into()));
        assert_eq!(req.messages[3].content, MessageContent::Text("what now?".into()));
        assert!(req.modalities.is_none());
    }

    #[test]
    fn text_request_injects_file_and_last_image() {
        let req = text_request(
            &ctx(&[]),
            "summarize",
            Some(AttachedFile {
                name: "report.pdf",
                text: "quarterly numbers",
            }),
            Some("data:image/png;base64,AAAA"),
        );
        assert_eq!(req.messages.len(), 3);
        match &req.messages[1].content {
            MessageContent::Text(t) => {
                assert!(t.contains("report.pdf"));
                assert!(t.contains("quarterly numbers"));
            }
            other => panic!("unexpected {other:?}"),
        }
        let last = parts(&req.messages[2]);
        assert_eq!(last.len(), 2);
        assert_eq!(last[1], ContentPart::image("data:image/png;base64,AAAA"));
    }

    #[test]
    fn image_request_requires_an_image() {
        assert!(matches!(
            image_request(&ctx(&[]), Some("look"), &[]),
            Err(ParleyError::Unsupported(_))
        ));
    }

    #[test]
    fn image_request_skips_blank_caption() {
        let images = vec!["data:image/jpeg;base64,AA".to_string(), "data:image/jpeg;base64,BB".to_string()];
        let req = image_request(&ctx(&[]), Some("  "), &images).unwrap();
        let p = parts(req.messages.last().unwrap());
        assert_eq!(p.len(), 2);
        assert!(p.iter().all(|part| matches!(part, ContentPart::ImageUrl { .. })));
    }

    #[test]
    fn audio_request_always_has_text() {
        let clip = AudioClip {
            data_base64: "T2dnUw==",
            format: "ogg",
        };
        let req = audio_request(&ctx(&[]), Some(""), "Listen and reply.", clip, None);
        let p = parts(req.messages.last().unwrap());
        assert_eq!(p[0], ContentPart::text("Listen and reply."));
        assert_eq!(p[1], ContentPart::audio("T2dnUw==", "ogg"));
        assert_eq!(p.len(), 2);

        let req = audio_request(&ctx(&[]), Some("transcribe"), "unused", clip, Some("data:image/png;base64,AA"));
        let p = parts(req.messages.last().unwrap());
        assert_eq!(p[0], ContentPart::text("transcribe"));
        assert_eq!(p.len(), 3);
    }

    #[test]
    fn image_generation_adds_guidance_only_with_reference() {
        let req = image_generation_request("img", "draw well", "a cat", None);
        assert_eq!(req.modalities.as_deref(), Some(&["image".to_string(), "text".to_string()][..]));
        assert_eq!(req.messages[0].content, MessageContent::Text("draw well".into()));
        assert_eq!(req.messages[1].content, MessageContent::Text("a cat".into()));

        let req = image_generation_request("img", "draw well", "make it blue", Some("data:image/png;base64,AA"));
        match &req.messages[0].content {
            MessageContent::Text(t) => assert!(t.contains("only if the user explicitly asks")),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(parts(&req.messages[1]).len(), 2);
    }
}
