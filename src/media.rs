//! Inline media produced by the model.
//!
//! Images are either written to a file or drawn in the terminal; audio is
//! always written, with raw PCM first wrapped in a WAV container. Anything
//! else is unsupported unless the run is told to ignore it.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::constants::{PCM_BITS_PER_SAMPLE, PCM_DEFAULT_CHANNELS, PCM_DEFAULT_SAMPLE_RATE};
use crate::error::GenerateError;

/// Where generated images go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ImageOutput {
    #[default]
    File,
    Terminal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFamily {
    Image,
    Audio,
    Other,
}

/// A parsed `type/subtype; key=value` media type.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaType {
    pub kind: String,
    pub subtype: String,
    pub params: HashMap<String, String>,
}

impl MediaType {
    /// Lenient parse: type, subtype and parameter names are lowercased;
    /// a missing subtype is left empty.
    pub fn parse(raw: &str) -> Self {
        let mut pieces = raw.split(';');
        let essence = pieces.next().unwrap_or_default().trim().to_ascii_lowercase();
        let (kind, subtype) = match essence.split_once('/') {
            Some((k, s)) => (k.trim().to_string(), s.trim().to_string()),
            None => (essence.clone(), String::new()),
        };
        let params = pieces
            .filter_map(|p| p.split_once('='))
            .map(|(k, v)| {
                (
                    k.trim().to_ascii_lowercase(),
                    v.trim().trim_matches('"').to_string(),
                )
            })
            .collect();
        Self {
            kind,
            subtype,
            params,
        }
    }

    /// `type/subtype` without parameters.
    pub fn essence(&self) -> String {
        format!("{}/{}", self.kind, self.subtype)
    }

    pub fn family(&self) -> MediaFamily {
        match self.kind.as_str() {
            "image" => MediaFamily::Image,
            "audio" => MediaFamily::Audio,
            _ => MediaFamily::Other,
        }
    }

    /// Raw 16-bit PCM without a container.
    pub fn is_raw_pcm(&self) -> bool {
        self.family() == MediaFamily::Audio
            && (self.subtype == "l16"
                || self.subtype == "pcm"
                || self
                    .params
                    .get("codec")
                    .is_some_and(|c| c.eq_ignore_ascii_case("pcm")))
    }

    fn param<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.params.get(key).and_then(|v| v.parse().ok())
    }

    /// File extension for persisted media.
    pub fn extension(&self) -> &str {
        if self.is_raw_pcm() {
            return "wav";
        }
        match (self.kind.as_str(), self.subtype.as_str()) {
            ("image", "jpeg") | ("image", "jpg") => "jpg",
            ("image", "svg+xml") => "svg",
            ("audio", "mpeg") | ("audio", "mp3") => "mp3",
            ("audio", "wav") | ("audio", "x-wav") | ("audio", "wave") => "wav",
            ("audio", "ogg") | ("audio", "opus") => "ogg",
            ("image", s) | ("audio", s) if !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric()) => s,
            _ => "bin",
        }
    }
}

/// Wraps little-endian 16-bit PCM samples in a 44-byte RIFF/WAVE header.
///
/// Returns `None` when the header fields cannot represent the stream: zero
/// channels, a block alignment or byte rate past its field width, or more
/// sample data than a RIFF chunk can hold.
pub fn wav_wrap(pcm: &[u8], sample_rate: u32, channels: u16) -> Option<Vec<u8>> {
    if channels == 0 {
        return None;
    }
    let block_align = channels.checked_mul(PCM_BITS_PER_SAMPLE / 8)?;
    let byte_rate = sample_rate.checked_mul(u32::from(block_align))?;
    let data_len = u32::try_from(pcm.len()).ok()?;
    let riff_len = data_len.checked_add(36)?;

    let mut out = Vec::with_capacity(44 + pcm.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&riff_len.to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&PCM_BITS_PER_SAMPLE.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.extend_from_slice(pcm);
    Some(out)
}

/// Escape sequence that draws an image inline (iTerm2 / WezTerm protocol).
pub fn inline_image_sequence(data: &[u8]) -> String {
    format!(
        "\x1b]1337;File=inline=1;size={};preserveAspectRatio=1:{}\x07",
        data.len(),
        STANDARD.encode(data)
    )
}

/// What happened to one media fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaAction {
    Saved { kind: &'static str, path: PathBuf },
    Inline(String),
    Ignored { mime_type: String },
}

#[derive(Debug, Clone)]
pub struct MediaHandler {
    pub image_output: ImageOutput,
    pub output_dir: PathBuf,
    pub ignore_unsupported: bool,
}

impl MediaHandler {
    pub fn new(image_output: ImageOutput, output_dir: PathBuf, ignore_unsupported: bool) -> Self {
        Self {
            image_output,
            output_dir,
            ignore_unsupported,
        }
    }

    pub async fn handle(&self, data: &[u8], mime_type: &str) -> Result<MediaAction, GenerateError> {
        let media = MediaType::parse(mime_type);
        match media.family() {
            MediaFamily::Image => match self.image_output {
                ImageOutput::Terminal => Ok(MediaAction::Inline(inline_image_sequence(data))),
                ImageOutput::File => {
                    let path = self.persist("image", media.extension(), data).await?;
                    Ok(MediaAction::Saved {
                        kind: "image",
                        path,
                    })
                }
            },
            MediaFamily::Audio if media.is_raw_pcm() => {
                let rate = media.param("rate").unwrap_or(PCM_DEFAULT_SAMPLE_RATE);
                let channels = media.param("channels").unwrap_or(PCM_DEFAULT_CHANNELS);
                let Some(wav) = wav_wrap(data, rate, channels) else {
                    tracing::warn!(mime_type, rate, channels, "PCM parameters out of range");
                    return Err(GenerateError::UnsupportedContent {
                        mime_type: mime_type.to_string(),
                    });
                };
                let path = self.persist("audio", "wav", &wav).await?;
                Ok(MediaAction::Saved {
                    kind: "audio",
                    path,
                })
            }
            MediaFamily::Audio => {
                let path = self.persist("audio", media.extension(), data).await?;
                Ok(MediaAction::Saved {
                    kind: "audio",
                    path,
                })
            }
            MediaFamily::Other if self.ignore_unsupported => {
                tracing::debug!(mime_type, "ignoring unsupported media");
                Ok(MediaAction::Ignored {
                    mime_type: mime_type.to_string(),
                })
            }
            MediaFamily::Other => Err(GenerateError::UnsupportedContent {
                mime_type: mime_type.to_string(),
            }),
        }
    }

    async fn persist(&self, prefix: &str, ext: &str, bytes: &[u8]) -> Result<PathBuf, GenerateError> {
        let path = self.output_dir.join(file_name(prefix, ext));
        write_file(&path, bytes).await.map_err(|cause| GenerateError::MediaWrite {
            path: path.clone(),
            cause,
        })?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "media saved");
        Ok(path)
    }
}

/// `<prefix>-<YYYYmmdd-HHMMSS>-<8 hex>.<ext>`
fn file_name(prefix: &str, ext: &str) -> String {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}.{}", prefix, stamp, &id[..8], ext)
}

async fn write_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await
}
