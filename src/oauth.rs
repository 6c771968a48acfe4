//! OAuth 1.0a request signing (HMAC-SHA1) for the X API.

use crate::config::XCredentials;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use rand::Rng;
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Everything except RFC 3986 unreserved characters is percent-encoded.
const RFC3986: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

type HmacSha1 = Hmac<sha1::Sha1>;

pub struct OAuthSigner {
    credentials: XCredentials,
}

impl OAuthSigner {
    pub fn new(credentials: XCredentials) -> Self {
        Self { credentials }
    }

    /// `Authorization` header for a request whose body is not form-encoded
    /// (JSON and multipart bodies are left out of the signature).
    pub fn authorization(&self, method: &str, url: &str) -> String {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
            .to_string();

        let mut bytes = [0u8; 16];
        rand::thread_rng().fill(&mut bytes);
        let nonce: String = bytes.iter().map(|b| format!("{b:02x}")).collect();

        self.authorization_with(method, url, &BTreeMap::new(), &nonce, &timestamp)
    }

    fn authorization_with(
        &self,
        method: &str,
        url: &str,
        request_params: &BTreeMap<String, String>,
        nonce: &str,
        timestamp: &str,
    ) -> String {
        let mut oauth = BTreeMap::new();
        oauth.insert("oauth_consumer_key".to_string(), self.credentials.api_key.clone());
        oauth.insert("oauth_nonce".to_string(), nonce.to_string());
        oauth.insert("oauth_signature_method".to_string(), "HMAC-SHA1".to_string());
        oauth.insert("oauth_timestamp".to_string(), timestamp.to_string());
        oauth.insert("oauth_token".to_string(), self.credentials.access_token.clone());
        oauth.insert("oauth_version".to_string(), "1.0".to_string());

        let mut signed = oauth.clone();
        signed.extend(request_params.iter().map(|(k, v)| (k.clone(), v.clone())));
        let signature = self.sign(&base_string(method, url, &signed));
        oauth.insert("oauth_signature".to_string(), signature);

        let fields: Vec<String> = oauth
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", pct_encode(k), pct_encode(v)))
            .collect();
        format!("OAuth {}", fields.join(", "))
    }

    fn sign(&self, base: &str) -> String {
        let key = format!(
            "{}&{}",
            pct_encode(&self.credentials.api_key_secret),
            pct_encode(&self.credentials.access_token_secret)
        );
        let mut mac =
            HmacSha1::new_from_slice(key.as_bytes()).expect("HMAC accepts any key length");
        mac.update(base.as_bytes());
        BASE64.encode(mac.finalize().into_bytes())
    }
}

fn base_string(method: &str, url: &str, params: &BTreeMap<String, String>) -> String {
    // BTreeMap order is the sorted order OAuth requires.
    let param_string = params
        .iter()
        .map(|(k, v)| format!("{}={}", pct_encode(k), pct_encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{}&{}&{}",
        method.to_uppercase(),
        pct_encode(url),
        pct_encode(&param_string)
    )
}

fn pct_encode(input: &str) -> String {
    utf8_percent_encode(input, RFC3986).to_string()
}
