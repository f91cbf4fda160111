//! Player script discovery in watch pages and script URLs

use crate::error::SigfetchError;
use regex::Regex;
use std::sync::OnceLock;
use url::Url;

/// Host that serves player scripts
pub const PLAYER_HOST: &str = "https://www.youtube.com";

fn player_path_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"/s/player/\S+?\.js").expect("static regex"))
}

/// Find the player script path (`/s/player/<...>.js`) referenced by a page.
///
/// The path doubles as the script identifier for the cipher cache.
pub fn player_script_path(page: &str) -> Option<String> {
    player_path_regex()
        .find(page)
        .map(|m| m.as_str().to_string())
}

/// Absolute URL of a player script path
pub fn player_script_url(path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        path.to_string()
    } else {
        format!("{}{}", PLAYER_HOST, path)
    }
}

/// Script identifier for an absolute player script URL
pub fn script_id_from_url(url: &str) -> Result<String, SigfetchError> {
    let parsed = Url::parse(url)?;
    let path = parsed.path();
    if path.is_empty() || path == "/" {
        return Err(SigfetchError::Generic(format!("No script path in {}", url)));
    }
    Ok(path.to_string())
}
