use crate::caption::CaptionLimit;
use crate::config::XCredentials;
use crate::error::PublishError;
use crate::oauth::OAuthSigner;
use crate::publish::{Account, Published, Publisher};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const TWEETS_URL: &str = "https://api.x.com/2/tweets";
const MEDIA_UPLOAD_URL: &str = "https://upload.twitter.com/1.1/media/upload.json";
const ME_URL: &str = "https://api.x.com/2/users/me";

const MAX_MEDIA_SIZE: u64 = 5 * 1024 * 1024; // 5MB
const MAX_TWEET_LENGTH: usize = 280;

pub struct XClient {
    signer: OAuthSigner,
    http: Client,
    username: Option<String>,
}

#[derive(Serialize)]
struct TweetBody<'a> {
    text: &'a str,
    media: TweetMedia,
}

#[derive(Serialize)]
struct TweetMedia {
    media_ids: Vec<String>,
}

#[derive(Deserialize)]
struct TweetResponse {
    data: TweetData,
}

#[derive(Deserialize)]
struct TweetData {
    id: String,
}

#[derive(Deserialize)]
struct MediaResponse {
    media_id_string: String,
}

#[derive(Deserialize)]
struct MeResponse {
    data: MeData,
}

#[derive(Deserialize)]
struct MeData {
    id: String,
    username: String,
}

impl XClient {
    pub fn new(credentials: XCredentials) -> Result<Self, PublishError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| PublishError::Network(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            signer: OAuthSigner::new(credentials),
            http,
            username: None,
        })
    }

    async fn upload_media(&self, path: &Path) -> Result<String, PublishError> {
        let mime = mime_from_path(path)?;
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| PublishError::Validation(format!("Cannot read {}: {e}", path.display())))?;
        if metadata.len() > MAX_MEDIA_SIZE {
            return Err(PublishError::Validation(format!(
                "File too large: {} bytes (max {}MB)",
                metadata.len(),
                MAX_MEDIA_SIZE / (1024 * 1024)
            )));
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| PublishError::Validation(format!("Failed to read {}: {e}", path.display())))?;
        let file_name = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime)
            .map_err(|e| PublishError::Validation(format!("Invalid MIME type: {e}")))?;
        let form = reqwest::multipart::Form::new().part("media", part);

        let resp = self
            .http
            .post(MEDIA_UPLOAD_URL)
            .header("Authorization", self.signer.authorization("POST", MEDIA_UPLOAD_URL))
            .multipart(form)
            .send()
            .await
            .map_err(|e| PublishError::Network(format!("Media upload failed: {e}")))?;

        let resp = check_status(resp).await?;
        let media: MediaResponse = resp
            .json()
            .await
            .map_err(|e| PublishError::Network(format!("Failed to parse media response: {e}")))?;
        Ok(media.media_id_string)
    }

    async fn create_post(&self, text: &str, media_id: String) -> Result<String, PublishError> {
        let body = TweetBody {
            text,
            media: TweetMedia {
                media_ids: vec![media_id],
            },
        };

        let resp = self
            .http
            .post(TWEETS_URL)
            .header("Authorization", self.signer.authorization("POST", TWEETS_URL))
            .json(&body)
            .send()
            .await
            .map_err(|e| PublishError::Network(format!("HTTP request failed: {e}")))?;

        let resp = check_status(resp).await?;
        let tweet: TweetResponse = resp
            .json()
            .await
            .map_err(|e| PublishError::Network(format!("Failed to parse tweet response: {e}")))?;
        Ok(tweet.data.id)
    }
}

impl Publisher for XClient {
    async fn login(&mut self) -> Result<Account, PublishError> {
        let resp = self
            .http
            .get(ME_URL)
            .header("Authorization", self.signer.authorization("GET", ME_URL))
            .send()
            .await
            .map_err(|e| PublishError::Authentication(format!("Could not reach X: {e}")))?;

        let resp = check_status(resp).await.map_err(|e| match e {
            PublishError::Authentication(msg) => PublishError::Authentication(msg),
            other => PublishError::Authentication(other.to_string()),
        })?;
        let me: MeResponse = resp
            .json()
            .await
            .map_err(|e| PublishError::Authentication(format!("Failed to parse profile: {e}")))?;

        self.username = Some(me.data.username.clone());
        Ok(Account {
            id: me.data.id,
            username: me.data.username,
        })
    }

    async fn publish(&self, image: &Path, caption: &str) -> Result<Published, PublishError> {
        let username = self
            .username
            .as_deref()
            .ok_or_else(|| PublishError::Authentication("Not logged in".into()))?;
        validate_caption(caption)?;

        let media_id = self.upload_media(image).await?;
        let post_id = self.create_post(caption, media_id).await?;
        Ok(Published {
            url: format!("https://x.com/{username}/status/{post_id}"),
            post_id,
        })
    }

    fn caption_limit(&self) -> CaptionLimit {
        CaptionLimit {
            max: MAX_TWEET_LENGTH,
            weight: tweet_char_weight,
        }
    }
}

/// Maps non-success responses to errors.
async fn check_status(resp: Response) -> Result<Response, PublishError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    match status {
        StatusCode::UNAUTHORIZED => {
            tracing::error!(
                "Received 401 Unauthorized from X API. \
                 Your OAuth credentials may be revoked or invalid. \
                 Regenerate them at https://developer.x.com/"
            );
            Err(PublishError::Authentication("X API rejected the credentials (401)".into()))
        }
        StatusCode::TOO_MANY_REQUESTS => Err(PublishError::RateLimited(rate_limit_reset(&resp))),
        _ => {
            let body = resp.text().await.unwrap_or_default();
            Err(PublishError::Api {
                status: status.as_u16(),
                body,
            })
        }
    }
}

fn rate_limit_reset(resp: &Response) -> String {
    resp.headers()
        .get("x-rate-limit-reset")
        .and_then(|v| v.to_str().ok())
        .map(|reset| format!("Rate limit resets at timestamp {reset}."))
        .unwrap_or_else(|| "Try again later.".into())
}

/// X counts Latin-range and common punctuation characters as one and
/// everything else (CJK, emoji) as two.
fn tweet_char_weight(c: char) -> usize {
    match c as u32 {
        0..=4351 | 8192..=8205 | 8208..=8223 | 8242..=8247 => 1,
        _ => 2,
    }
}

fn validate_caption(text: &str) -> Result<(), PublishError> {
    if text.trim().is_empty() {
        return Err(PublishError::Validation("Caption cannot be empty".into()));
    }
    let len: usize = text.chars().map(tweet_char_weight).sum();
    if len > MAX_TWEET_LENGTH {
        return Err(PublishError::Validation(format!(
            "Caption counts as {len} characters (max {MAX_TWEET_LENGTH})"
        )));
    }
    Ok(())
}

fn mime_from_path(path: &Path) -> Result<&'static str, PublishError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "jpg" | "jpeg" => Ok("image/jpeg"),
        "png" => Ok("image/png"),
        _ => Err(PublishError::Validation(format!(
            "Unsupported image format '.{ext}'. Allowed: jpeg, png"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caption::FALLBACK_CAPTION;

    fn client() -> XClient {
        XClient::new(XCredentials {
            api_key: "k".into(),
            api_key_secret: "ks".into(),
            access_token: "t".into(),
            access_token_secret: "ts".into(),
        })
        .unwrap()
    }

    #[test]
    fn test_mime_from_path() {
        assert_eq!(mime_from_path(Path::new("a.PNG")).unwrap(), "image/png");
        assert_eq!(mime_from_path(Path::new("a.jpeg")).unwrap(), "image/jpeg");
        assert_eq!(mime_from_path(Path::new("dir/a.Jpg")).unwrap(), "image/jpeg");
        assert!(mime_from_path(Path::new("a.gif")).is_err());
        assert!(mime_from_path(Path::new("noext")).is_err());
    }

    #[test]
    fn test_validate_caption() {
        assert!(validate_caption(FALLBACK_CAPTION).is_ok());
        assert!(validate_caption("  ").is_err());
        assert!(validate_caption(&"x".repeat(280)).is_ok());
        assert!(validate_caption(&"x".repeat(281)).is_err());
        assert!(validate_caption(&"✨".repeat(140)).is_ok());
        assert!(validate_caption(&"✨".repeat(141)).is_err());
    }

    #[test]
    fn test_caption_limit_uses_tweet_weights() {
        let limit = client().caption_limit();
        assert_eq!(limit.measure("a✨"), 3);
        assert_eq!(limit.measure("café — “ok”"), 11);
    }

    #[test]
    fn test_tweet_body_shape() {
        let body = TweetBody {
            text: "hello",
            media: TweetMedia {
                media_ids: vec!["42".into()],
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json, serde_json::json!({"text": "hello", "media": {"media_ids": ["42"]}}));
    }

    #[tokio::test]
    async fn test_publish_requires_login() {
        let client = client();
        let err = client
            .publish(Path::new("a.png"), "caption")
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_oversized_image_is_rejected_before_upload() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("big.png");
        let file = std::fs::File::create(&path).unwrap();
        file.set_len(MAX_MEDIA_SIZE + 1).unwrap();

        let err = client().upload_media(&path).await.unwrap_err();
        assert!(matches!(err, PublishError::Validation(ref m) if m.contains("too large")));
    }
}
