//! Prompt attachments from `--file` and `--url`.
//!
//! Text becomes a user `Text` part wrapped with its source name; images,
//! audio and PDFs become `InlineMedia` parts.

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::constants::{ATTACHMENT_MAX_SIZE, BINARY_DETECTION_BYTES};
use crate::history::Part;

/// MIME type for extensions sent as media.
fn media_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "flac" => "audio/flac",
        "pdf" => "application/pdf",
        _ => return None,
    };
    Some(mime)
}

fn looks_binary(content: &[u8]) -> bool {
    let check_len = content.len().min(BINARY_DETECTION_BYTES);
    content[..check_len].contains(&0)
}

fn wrap_text(source: &str, text: &str) -> Part {
    Part::text(format!("<file name=\"{}\">\n{}\n</file>", source, text))
}

/// Reads a `--file` attachment.
pub async fn load_file(path: &Path) -> Result<Part> {
    let metadata = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("Cannot read attachment {}", path.display()))?;
    if metadata.len() > ATTACHMENT_MAX_SIZE {
        bail!(
            "Attachment {} is too large: {} bytes (max {})",
            path.display(),
            metadata.len(),
            ATTACHMENT_MAX_SIZE
        );
    }
    let content = tokio::fs::read(path)
        .await
        .with_context(|| format!("Cannot read attachment {}", path.display()))?;

    if let Some(mime) = media_type_for(path) {
        tracing::debug!(path = %path.display(), mime, "attaching media file");
        return Ok(Part::media(content, mime));
    }
    if looks_binary(&content) {
        bail!(
            "Attachment {} looks like a binary file of unknown type",
            path.display()
        );
    }
    let text = String::from_utf8(content)
        .with_context(|| format!("Attachment {} is not valid UTF-8", path.display()))?;
    Ok(wrap_text(&path.display().to_string(), &text))
}

fn is_textual(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence.starts_with("text/") || essence == "application/json" || essence.ends_with("+json")
}

/// Fetches a `--url` attachment.
pub async fn fetch_url(client: &reqwest::Client, url: &str) -> Result<Part> {
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to fetch {}", url))?
        .error_for_status()
        .with_context(|| format!("Failed to fetch {}", url))?;
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    let body = response
        .bytes()
        .await
        .with_context(|| format!("Failed to read body of {}", url))?;

    if is_textual(&content_type) {
        let text = String::from_utf8_lossy(&body);
        return Ok(wrap_text(url, &text));
    }
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();
    tracing::debug!(url, mime = %mime, bytes = body.len(), "attaching fetched media");
    Ok(Part::media(body.to_vec(), mime))
}
