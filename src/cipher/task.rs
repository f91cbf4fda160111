//! Pending signature resolutions

use std::fmt;
use tokio::sync::oneshot;
use url::form_urlencoded;

type Sink = Box<dyn FnOnce(String) + Send>;

/// A stream URL waiting for its signature to be deciphered.
///
/// The sink is invoked at most once, with the playable URL.
pub struct CipherTask {
    url: String,
    signature: String,
    param: String,
    sink: Sink,
}

impl CipherTask {
    /// Create a task; the deciphered value is appended as `&sig=...`
    pub fn new(
        url: impl Into<String>,
        signature: impl Into<String>,
        sink: impl FnOnce(String) + Send + 'static,
    ) -> Self {
        Self {
            url: url.into(),
            signature: signature.into(),
            param: "sig".to_string(),
            sink: Box::new(sink),
        }
    }

    /// Create a task whose result arrives on a oneshot channel
    pub fn channel(
        url: impl Into<String>,
        signature: impl Into<String>,
    ) -> (Self, oneshot::Receiver<String>) {
        let (tx, rx) = oneshot::channel();
        let task = Self::new(url, signature, move |resolved| {
            let _ = tx.send(resolved);
        });
        (task, rx)
    }

    /// Build a task from a format's URL-encoded `signatureCipher` value.
    ///
    /// Returns `None` when the value lacks `url` or `s`.
    pub fn from_signature_cipher(
        signature_cipher: &str,
        sink: impl FnOnce(String) + Send + 'static,
    ) -> Option<Self> {
        let mut url = None;
        let mut signature = None;
        let mut param = None;
        for (key, value) in form_urlencoded::parse(signature_cipher.as_bytes()) {
            match key.as_ref() {
                "url" => url = Some(value.into_owned()),
                "s" => signature = Some(value.into_owned()),
                "sp" => param = Some(value.into_owned()),
                _ => {}
            }
        }

        let mut task = Self::new(url?, signature?, sink);
        if let Some(param) = param.filter(|p| !p.is_empty()) {
            task.param = param;
        }
        Some(task)
    }

    /// Base stream URL without signature
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Obfuscated signature
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Query parameter the deciphered signature is attached under
    pub fn param(&self) -> &str {
        &self.param
    }

    /// Playable URL for a deciphered signature
    pub fn resolved_url(&self, deciphered: &str) -> String {
        let separator = if self.url.contains('?') { '&' } else { '?' };
        let encoded: String = form_urlencoded::byte_serialize(deciphered.as_bytes()).collect();
        format!("{}{}{}={}", self.url, separator, self.param, encoded)
    }

    /// Deliver the deciphered signature, consuming the task
    pub fn complete(self, deciphered: &str) {
        let resolved = self.resolved_url(deciphered);
        (self.sink)(resolved);
    }
}

impl fmt::Debug for CipherTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherTask")
            .field("url", &self.url)
            .field("signature", &self.signature)
            .field("param", &self.param)
            .finish_non_exhaustive()
    }
}
