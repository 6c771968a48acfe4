use crate::config::CaptionConfig;
use crate::error::CaptionError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const CAPTION_PROMPT: &str = "Describe what is in this image without starting with \"The image shows\", start immediately with description.";
pub const CAPTION_SUFFIX: &str = "\n\n✨ AI-generated images";
pub const FALLBACK_CAPTION: &str = "✨ AI-generated pajama piece ✨\n\n#AIArt #DigitalArt";

/// Describes an image in free text.
pub trait Captioner {
    async fn describe(&self, image: &Path) -> Result<String, CaptionError>;
}

/// How long a caption may be, as the publishing platform counts it.
#[derive(Debug, Clone, Copy)]
pub struct CaptionLimit {
    pub max: usize,
    /// Weight of one character toward `max`.
    pub weight: fn(char) -> usize,
}

impl CaptionLimit {
    /// Every character counts as one.
    #[cfg(test)]
    pub fn chars(max: usize) -> Self {
        Self { max, weight: |_| 1 }
    }

    pub fn measure(&self, text: &str) -> usize {
        text.chars().map(self.weight).sum()
    }
}

/// Produces the final caption for `image`, never failing: errors and empty
/// descriptions fall back to [`FALLBACK_CAPTION`]. Generated captions fit
/// within `limit`.
pub async fn generate_caption<C: Captioner>(
    captioner: &C,
    image: &Path,
    limit: CaptionLimit,
) -> String {
    let description = match captioner.describe(image).await {
        Ok(text) => strip_think_tags(&text).trim().to_string(),
        Err(e) => {
            tracing::warn!("Caption generation failed for {}: {e}", image.display());
            return FALLBACK_CAPTION.to_string();
        }
    };

    if description.is_empty() {
        tracing::warn!("Caption for {} was empty, using fallback", image.display());
        return FALLBACK_CAPTION.to_string();
    }

    let caption = fit_caption(&description, limit);
    tracing::info!("Generated caption for {}: {}", image.display(), preview(&caption, 100));
    caption
}

/// Joins description and suffix, shortening the description with an
/// ellipsis when the whole caption would exceed `limit`.
fn fit_caption(description: &str, limit: CaptionLimit) -> String {
    let full = format!("{description}{CAPTION_SUFFIX}");
    if limit.measure(&full) <= limit.max {
        return full;
    }

    let budget = limit
        .max
        .saturating_sub(limit.measure(CAPTION_SUFFIX) + limit.measure("…"));
    let mut used = 0;
    let cut: String = description
        .chars()
        .take_while(|&c| {
            used += (limit.weight)(c);
            used <= budget
        })
        .collect();
    format!("{}…{CAPTION_SUFFIX}", cut.trim_end())
}

/// Reasoning models wrap their scratch work in `<think>` blocks.
fn strip_think_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("<think>") {
        out.push_str(&rest[..start]);
        match rest[start..].find("</think>") {
            Some(end) => rest = &rest[start + end + "</think>".len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

/// First `max` characters of `text`, for log lines.
pub fn preview(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Captioner backed by an Ollama-compatible `/api/chat` endpoint.
pub struct OllamaCaptioner {
    http: Client,
    chat_url: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
    images: Vec<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: String,
}

impl OllamaCaptioner {
    pub fn new(config: &CaptionConfig) -> Result<Self, CaptionError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            chat_url: format!("{}/api/chat", config.host.trim_end_matches('/')),
            model: config.model.clone(),
        })
    }

    fn request_body<'a>(&'a self, image_b64: String) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: CAPTION_PROMPT,
                images: vec![image_b64],
            }],
            stream: false,
        }
    }
}

impl Captioner for OllamaCaptioner {
    async fn describe(&self, image: &Path) -> Result<String, CaptionError> {
        let bytes = tokio::fs::read(image)
            .await
            .map_err(|source| CaptionError::ReadImage {
                path: image.to_path_buf(),
                source,
            })?;

        let body = self.request_body(BASE64.encode(bytes));
        let resp = self.http.post(&self.chat_url).json(&body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CaptionError::Endpoint {
                status: status.as_u16(),
                body,
            });
        }

        let chat: ChatResponse = resp.json().await?;
        let content = chat.message.content.trim();
        if content.is_empty() {
            return Err(CaptionError::Empty);
        }
        Ok(content.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    const LIMIT: CaptionLimit = CaptionLimit {
        max: 280,
        weight: |_| 1,
    };

    struct StubCaptioner {
        reply: Option<&'static str>,
        calls: Cell<usize>,
    }

    impl StubCaptioner {
        fn new(reply: Option<&'static str>) -> Self {
            Self {
                reply,
                calls: Cell::new(0),
            }
        }
    }

    impl Captioner for StubCaptioner {
        async fn describe(&self, _image: &Path) -> Result<String, CaptionError> {
            self.calls.set(self.calls.get() + 1);
            self.reply.map(str::to_string).ok_or(CaptionError::Empty)
        }
    }

    #[tokio::test]
    async fn test_caption_gets_suffix() {
        let stub = StubCaptioner::new(Some("  A cat asleep on a quilt.\n"));
        let caption = generate_caption(&stub, Path::new("cat.png"), LIMIT).await;
        assert_eq!(caption, "A cat asleep on a quilt.\n\n✨ AI-generated images");
        assert_eq!(stub.calls.get(), 1);
    }

    #[tokio::test]
    async fn test_failure_uses_fallback() {
        let stub = StubCaptioner::new(None);
        let caption = generate_caption(&stub, Path::new("cat.png"), LIMIT).await;
        assert_eq!(caption, FALLBACK_CAPTION);
    }

    #[tokio::test]
    async fn test_blank_reply_uses_fallback() {
        let stub = StubCaptioner::new(Some("   \n "));
        assert_eq!(generate_caption(&stub, Path::new("x.jpg"), LIMIT).await, FALLBACK_CAPTION);

        let stub = StubCaptioner::new(Some("<think>hmm</think>  "));
        assert_eq!(generate_caption(&stub, Path::new("x.jpg"), LIMIT).await, FALLBACK_CAPTION);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_uses_fallback() {
        let dir = tempfile::TempDir::new().unwrap();
        let image = dir.path().join("a.png");
        std::fs::write(&image, b"\x89PNG").unwrap();

        let config = CaptionConfig {
            host: "http://127.0.0.1:9".into(),
            timeout_secs: 2,
            ..CaptionConfig::default()
        };
        let captioner = OllamaCaptioner::new(&config).unwrap();

        assert!(captioner.describe(&image).await.is_err());
        assert_eq!(generate_caption(&captioner, &image, LIMIT).await, FALLBACK_CAPTION);
    }

    #[tokio::test]
    async fn test_missing_image_is_caption_error() {
        let captioner = OllamaCaptioner::new(&CaptionConfig::default()).unwrap();
        let err = captioner.describe(Path::new("/definitely/not/here.png")).await.unwrap_err();
        assert!(matches!(err, CaptionError::ReadImage { .. }));
    }

    #[test]
    fn test_fit_caption_truncates_description_only() {
        let description = "word ".repeat(100);
        let limit = CaptionLimit::chars(280);
        let caption = fit_caption(description.trim(), limit);

        let len = limit.measure(&caption);
        assert!(len <= 280 && len > 250, "length {len}");
        assert!(caption.ends_with(CAPTION_SUFFIX));
        assert!(caption.contains('…'));
    }

    #[test]
    fn test_fit_caption_respects_weights() {
        let limit = CaptionLimit {
            max: 60,
            weight: |c| if c.is_ascii() { 1 } else { 2 },
        };
        let caption = fit_caption(&"é".repeat(50), limit);

        assert!(limit.measure(&caption) <= 60);
        assert!(caption.starts_with('é'));
        assert!(caption.ends_with(CAPTION_SUFFIX));
    }

    #[test]
    fn test_fit_caption_short_is_untouched() {
        assert_eq!(
            fit_caption("Short.", CaptionLimit::chars(280)),
            format!("Short.{CAPTION_SUFFIX}")
        );
    }

    #[test]
    fn test_strip_think_tags() {
        assert_eq!(strip_think_tags("<think>plan</think>A dog."), "A dog.");
        assert_eq!(strip_think_tags("A <think>x</think>b<think>y</think>c"), "A bc");
        assert_eq!(strip_think_tags("open <think>never closed"), "open ");
        assert_eq!(strip_think_tags("plain"), "plain");
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("abcdef", 3), "abc...");
        assert_eq!(preview("✨✨", 5), "✨✨");
    }

    #[test]
    fn test_request_body_shape() {
        let captioner = OllamaCaptioner::new(&CaptionConfig::default()).unwrap();
        let json = serde_json::to_value(captioner.request_body("aGk=".into())).unwrap();

        assert_eq!(json["model"], "llama3.2-vision");
        assert_eq!(json["stream"], false);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], CAPTION_PROMPT);
        assert_eq!(json["messages"][0]["images"][0], "aGk=");
        assert_eq!(captioner.chat_url, "http://localhost:11434/api/chat");
    }
}
