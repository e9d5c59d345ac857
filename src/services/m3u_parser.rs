use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;

use crate::error::{CatalogError, Result};
use crate::models::{
    parse_timestamp, report, Catalog, Channel, ChannelStatus, ProgressEvent, ProgressSender,
    UNGROUPED,
};

/// Top-of-file marker every playlist must start with
pub const M3U_HEADER: &str = "#EXTM3U";

const EXTINF_PREFIX: &str = "#EXTINF";

/// Escaped double quote inside an attribute value
pub const QUOTE_ENTITY: &str = "&quot;";

/// Scheme prefixes that let a bare line be recovered as a channel
pub const STREAM_SCHEMES: [&str; 5] = ["http://", "https://", "rtsp://", "rtmp://", "mmsh://"];

// Longer lines are skipped
const MAX_LINE_BYTES: usize = 32 * 1024;

lazy_static! {
    /// Regex to normalize multiple whitespaces into single space
    static ref MULTI_SPACE_REGEX: Regex = Regex::new(r"\s{2,}").unwrap();
    /// Regex to parse EXTINF attributes (tvg-id="...", group-title="...", etc)
    static ref ATTR_REGEX: Regex = Regex::new(r#"(\w+(?:-\w+)*)="([^"]*)""#).unwrap();
}

/// Parsed EXTINF line data
#[derive(Debug, Default)]
struct ExtinfData {
    attributes: HashMap<String, String>,
    title: String,
}

impl ExtinfData {
    fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Byte offset of the last comma that is not inside a quoted attribute value
fn last_unquoted_comma(content: &str) -> Option<usize> {
    let mut in_quotes = false;
    let mut last = None;
    for (i, c) in content.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => last = Some(i),
            _ => {}
        }
    }
    last
}

/// Parse an EXTINF line
/// Format: #EXTINF:duration tvg-name="..." tvg-logo="..." group-title="...",Title
fn parse_extinf(line: &str) -> std::result::Result<ExtinfData, String> {
    if line.len() > MAX_LINE_BYTES {
        return Err(format!("EXTINF line exceeds {} bytes", MAX_LINE_BYTES));
    }

    let content = line
        .strip_prefix(EXTINF_PREFIX)
        .ok_or_else(|| "not an EXTINF line".to_string())?;

    let (header, title) = match last_unquoted_comma(content) {
        Some(pos) => (&content[..pos], content[pos + 1..].trim().to_string()),
        None => (content, String::new()),
    };

    let mut attributes = HashMap::new();
    for caps in ATTR_REGEX.captures_iter(header) {
        let key = caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default();
        let value = caps
            .get(2)
            .map(|m| m.as_str().replace(QUOTE_ENTITY, "\""))
            .unwrap_or_default();
        attributes.insert(key, value);
    }

    Ok(ExtinfData { attributes, title })
}

/// Normalize text: trim and collapse multiple spaces into single space
fn normalize_text(text: &str) -> String {
    let trimmed = text.trim();
    MULTI_SPACE_REGEX.replace_all(trimmed, " ").to_string()
}

fn has_stream_scheme(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    STREAM_SCHEMES.iter().any(|scheme| lower.starts_with(scheme))
}

/// A URL is structurally valid when it parses and carries a host
pub fn is_valid_stream_url(raw: &str) -> bool {
    match url::Url::parse(raw) {
        Ok(parsed) => !parsed.scheme().is_empty() && parsed.has_host(),
        Err(_) => false,
    }
}

/// Decode raw playlist bytes: UTF-8 first, Windows-1252 (Latin-1 superset) as fallback
pub fn decode_playlist(bytes: &[u8]) -> Result<String> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);

    match std::str::from_utf8(bytes) {
        Ok(text) => Ok(text.to_string()),
        Err(utf8_err) => {
            tracing::warn!("Playlist is not valid UTF-8 ({}), retrying as Windows-1252", utf8_err);
            encoding_rs::WINDOWS_1252
                .decode_without_bom_handling_and_without_replacement(bytes)
                .map(|text| text.into_owned())
                .ok_or_else(|| {
                    CatalogError::Decode(format!(
                        "neither UTF-8 ({}) nor Windows-1252",
                        utf8_err
                    ))
                })
        }
    }
}

/// Line-oriented M3U parser
///
/// Lenient: a URL is never dropped for lack of metadata, and a bad line is
/// logged and skipped. Only a missing `#EXTM3U` header aborts.
#[derive(Debug, Clone)]
pub struct M3UParser {
    /// Report progress every N lines
    progress_every: usize,
}

impl Default for M3UParser {
    fn default() -> Self {
        Self::new(10)
    }
}

impl M3UParser {
    pub fn new(progress_every: usize) -> Self {
        Self {
            progress_every: progress_every.max(1),
        }
    }

    /// Read a playlist file from disk and parse it
    pub async fn parse_file(&self, path: &Path, progress: Option<&ProgressSender>) -> Result<Catalog> {
        let bytes = tokio::fs::read(path).await?;
        tracing::info!("Loading playlist file {} ({} bytes)", path.display(), bytes.len());
        self.parse_bytes(&bytes, progress)
    }

    pub fn parse_bytes(&self, bytes: &[u8], progress: Option<&ProgressSender>) -> Result<Catalog> {
        let content = decode_playlist(bytes)?;
        self.parse(&content, progress)
    }

    /// Parse decoded playlist text into a fresh catalog
    pub fn parse(&self, content: &str, progress: Option<&ProgressSender>) -> Result<Catalog> {
        let body = content.trim_start_matches('\u{feff}').trim_start();
        if !body.starts_with(M3U_HEADER) {
            return Err(CatalogError::Format(format!(
                "missing {} header",
                M3U_HEADER
            )));
        }

        let lines: Vec<&str> = body.lines().collect();
        let total_lines = lines.len().max(1);

        let mut channels: Vec<Channel> = Vec::new();
        let mut pending: Option<ExtinfData> = None;
        let mut recovered = 0usize;
        let mut malformed = 0usize;
        let mut skipped = 0usize;

        report(progress, ProgressEvent::Parse { percent: 0.0, channels_found: 0 });

        for (index, raw) in lines.iter().enumerate() {
            let line_number = index + 1;

            if line_number % self.progress_every == 0 {
                report(
                    progress,
                    ProgressEvent::Parse {
                        percent: line_number as f64 / total_lines as f64 * 100.0,
                        channels_found: channels.len(),
                    },
                );
            }

            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            if line.starts_with(EXTINF_PREFIX) {
                match parse_extinf(line) {
                    Ok(extinf) => {
                        if pending.replace(extinf).is_some() {
                            tracing::debug!("EXTINF at line {} replaces one without URL", line_number);
                        }
                    }
                    Err(e) => {
                        skipped += 1;
                        tracing::warn!("Skipping line {}: {}", line_number, e);
                    }
                }
                continue;
            }

            // Other directives and comments (#EXTM3U, #EXTVLCOPT, ...)
            if line.starts_with('#') {
                continue;
            }

            if line.len() > MAX_LINE_BYTES {
                skipped += 1;
                tracing::warn!("Skipping line {}: URL exceeds {} bytes", line_number, MAX_LINE_BYTES);
                continue;
            }

            let mut channel = match pending.take() {
                Some(extinf) => build_channel(&extinf, line, channels.len() + 1),
                None if has_stream_scheme(line) => {
                    recovered += 1;
                    Channel::new(format!("Canal {}", channels.len() + 1), line, UNGROUPED)
                }
                None => {
                    skipped += 1;
                    tracing::warn!("Skipping line {}: not a stream URL", line_number);
                    continue;
                }
            };

            if !is_valid_stream_url(line) {
                malformed += 1;
                tracing::warn!("Malformed URL at line {}: {}", line_number, line);
                channel.mark_offline(Utc::now());
            }

            channels.push(channel);
        }

        let catalog = Catalog::from_channels(channels);

        report(
            progress,
            ProgressEvent::Parse {
                percent: 100.0,
                channels_found: catalog.len(),
            },
        );

        tracing::info!(
            "Playlist parsed: {} channels in {} groups ({} recovered, {} malformed, {} lines skipped)",
            catalog.len(),
            catalog.groups.len(),
            recovered,
            malformed,
            skipped
        );

        Ok(catalog)
    }
}

/// Turn EXTINF metadata plus its URL line into a channel
fn build_channel(extinf: &ExtinfData, url: &str, ordinal: usize) -> Channel {
    let name = extinf
        .attr("tvg-name")
        .map(normalize_text)
        .or_else(|| Some(normalize_text(&extinf.title)).filter(|t| !t.is_empty()))
        .unwrap_or_else(|| format!("Canal {}", ordinal));

    let group = extinf
        .attr("group-title")
        .map(normalize_text)
        .unwrap_or_else(|| UNGROUPED.to_string());

    let mut channel = Channel::new(name, url, group).with_logo(extinf.attr("tvg-logo").map(str::to_string));

    // Probe results written back by the playlist writer
    let last_check = extinf.attr("tvg-last-check").and_then(parse_timestamp);
    let status = extinf
        .attr("tvg-status")
        .and_then(|s| s.parse::<ChannelStatus>().ok());
    if let (Some(status), Some(checked_at)) = (status, last_check) {
        let response_time = extinf
            .attr("tvg-response-time")
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|t| *t >= 0.0);
        channel.record_probe(status, response_time, checked_at);
    }

    channel
}
