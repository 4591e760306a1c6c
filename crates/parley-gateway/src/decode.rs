// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Image extraction from heterogeneous completion responses.
//!
//! The response is first normalized into [`NormalizedMessage`], then every
//! extractor in [`EXTRACTORS`] runs over it in order and feeds one
//! [`ImageCollector`]. Results are unioned and deduplicated; remote links are
//! only resolved by the caller when no inline image was found.

use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use parley_core::GeneratedImage;
use regex::Regex;
use serde_json::Value;

use crate::types::ChatResponse;

static DATA_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"data:(image/[\w.+-]+);base64,([A-Za-z0-9+/=_-]+)").unwrap()
});

static IMAGE_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)https?://[^\s"'<>()\[\]]+?\.(?:png|jpe?g|webp|gif)(?:\?[^\s"'<>()\[\]]*)?"#)
        .unwrap()
});

/// Assistant message reduced to the three places images can appear.
#[derive(Debug, Clone, Default)]
pub struct NormalizedMessage {
    /// Items of the structured `images[]` field.
    pub image_items: Vec<Value>,
    /// Elements of an array-valued `content`.
    pub parts: Vec<Value>,
    /// String-valued `content`.
    pub text: Option<String>,
}

impl NormalizedMessage {
    /// Normalizes the first choice of a response.
    pub fn from_response(response: &ChatResponse) -> Self {
        let Some(choice) = response.choices.first() else {
            return Self::default();
        };
        let message = &choice.message;
        let mut normalized = Self {
            image_items: message.images.clone().unwrap_or_default(),
            ..Self::default()
        };
        match &message.content {
            Some(Value::String(s)) => normalized.text = Some(s.clone()),
            Some(Value::Array(parts)) => normalized.parts = parts.clone(),
            _ => {}
        }
        normalized
    }

    /// Concatenated text from the string content or the text parts.
    pub fn raw_text(&self) -> String {
        if let Some(text) = &self.text {
            return text.clone();
        }
        self.parts
            .iter()
            .filter_map(part_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Accumulates decoded images and remote candidates without duplicates.
#[derive(Debug, Default)]
pub struct ImageCollector {
    images: Vec<GeneratedImage>,
    links: Vec<String>,
}

impl ImageCollector {
    pub fn images(&self) -> &[GeneratedImage] {
        &self.images
    }

    pub fn links(&self) -> &[String] {
        &self.links
    }

    fn push_image(&mut self, image: GeneratedImage) {
        if !self.images.iter().any(|i| i.data == image.data) {
            self.images.push(image);
        }
    }

    fn push_link(&mut self, link: &str) {
        if !self.links.iter().any(|l| l == link) {
            self.links.push(link.to_string());
        }
    }

    /// Accepts a `data:` URL or an http(s) link. Returns whether it was usable.
    fn push_url(&mut self, url: &str) -> bool {
        let url = url.trim();
        if url.starts_with("data:") {
            match parse_data_url(url) {
                Some(image) => {
                    self.push_image(image);
                    true
                }
                None => false,
            }
        } else if url.starts_with("http://") || url.starts_with("https://") {
            self.push_link(url);
            true
        } else {
            false
        }
    }

    fn push_base64(&mut self, payload: &str, mime_type: Option<&str>) -> bool {
        match decode_base64(payload) {
            Some(data) if !data.is_empty() => {
                self.push_image(GeneratedImage {
                    data,
                    mime_type: mime_type.unwrap_or("image/png").to_string(),
                });
                true
            }
            _ => false,
        }
    }

    fn scan_text(&mut self, text: &str) {
        for caps in DATA_URL.captures_iter(text) {
            if let Some(data) = decode_base64(&caps[2]) {
                self.push_image(GeneratedImage {
                    data,
                    mime_type: caps[1].to_string(),
                });
            }
        }
        for m in IMAGE_LINK.find_iter(text) {
            self.push_link(m.as_str());
        }
    }

    /// Consumes the collector.
    pub fn into_parts(self) -> (Vec<GeneratedImage>, Vec<String>) {
        (self.images, self.links)
    }
}

/// An independent extractor over the normalized message.
pub type Extractor = fn(&NormalizedMessage, &mut ImageCollector);

/// Extractors in precedence order.
pub const EXTRACTORS: &[Extractor] = &[from_image_items, from_content_parts, from_plain_text];

/// Structured `images[]` items: a URL first, else a base64 payload.
pub fn from_image_items(message: &NormalizedMessage, out: &mut ImageCollector) {
    for item in &message.image_items {
        if let Some(url) = item_url(item)
            && out.push_url(url)
        {
            continue;
        }
        if let Some((payload, mime)) = item_base64(item) {
            out.push_base64(payload, mime);
        }
    }
}

/// Array-valued content: image_url parts, inline base64 parts, and text
/// parts scanned for embedded images.
pub fn from_content_parts(message: &NormalizedMessage, out: &mut ImageCollector) {
    for part in &message.parts {
        if let Some(url) = item_url(part)
            && out.push_url(url)
        {
            continue;
        }
        if let Some((payload, mime)) = item_base64(part)
            && out.push_base64(payload, mime)
        {
            continue;
        }
        if let Some(text) = part_text(part) {
            out.scan_text(text);
        }
    }
}

/// String-valued content scanned for embedded images.
pub fn from_plain_text(message: &NormalizedMessage, out: &mut ImageCollector) {
    if let Some(text) = &message.text {
        out.scan_text(text);
    }
}

/// Runs every extractor over the message.
pub fn collect_images(message: &NormalizedMessage) -> ImageCollector {
    let mut collector = ImageCollector::default();
    for extract in EXTRACTORS {
        extract(message, &mut collector);
    }
    collector
}

/// Message text with embedded image links removed, or `None` when nothing
/// but links was there.
pub fn strip_image_links(text: &str) -> Option<String> {
    let without_data = DATA_URL.replace_all(text, "");
    let cleaned = IMAGE_LINK.replace_all(&without_data, "");
    let trimmed = cleaned.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Decodes a `data:<mime>;base64,<payload>` URL.
pub fn parse_data_url(url: &str) -> Option<GeneratedImage> {
    let rest = url.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mime_type = header.strip_suffix(";base64")?;
    let data = decode_base64(payload)?;
    Some(GeneratedImage {
        data,
        mime_type: if mime_type.is_empty() {
            "image/png".to_string()
        } else {
            mime_type.to_string()
        },
    })
}

fn decode_base64(payload: &str) -> Option<Vec<u8>> {
    let payload = payload.trim();
    [STANDARD, URL_SAFE, STANDARD_NO_PAD, URL_SAFE_NO_PAD]
        .iter()
        .find_map(|engine| engine.decode(payload).ok())
}

fn item_url(item: &Value) -> Option<&str> {
    item.pointer("/image_url/url")
        .or_else(|| item.get("image_url"))
        .or_else(|| item.get("url"))
        .and_then(Value::as_str)
}

fn item_base64(item: &Value) -> Option<(&str, Option<&str>)> {
    let inline = item
        .get("inline_data")
        .or_else(|| item.get("inlineData"))
        .unwrap_or(item);
    let payload = ["data", "b64_json", "base64", "image_base64"]
        .iter()
        .find_map(|k| inline.get(*k).and_then(Value::as_str))?;
    let mime = ["mime_type", "mimeType", "media_type"]
        .iter()
        .find_map(|k| inline.get(*k).and_then(Value::as_str));
    Some((payload, mime))
}

fn part_text(part: &Value) -> Option<&str> {
    match part {
        Value::String(s) => Some(s),
        _ => part.get("text").and_then(Value::as_str),
    }
}
