use chrono::SecondsFormat;
use std::path::Path;

use crate::error::Result;
use crate::models::{Catalog, Channel, ChannelStatus};
use crate::services::m3u_parser::{M3U_HEADER, QUOTE_ENTITY};

/// Attribute values cannot carry a raw double quote; the parser reads
/// `&quot;` back
fn attr_value(value: &str) -> String {
    value.replace('"', QUOTE_ENTITY)
}

/// Build the `#EXTINF` + URL pair for one channel, including probe results
pub fn channel_to_m3u(channel: &Channel) -> String {
    let mut line = format!("#EXTINF:-1 tvg-name=\"{}\"", attr_value(&channel.name));

    if let Some(logo) = channel.logo.as_deref().filter(|l| !l.is_empty()) {
        line.push_str(&format!(" tvg-logo=\"{}\"", attr_value(logo)));
    }
    if !channel.group.is_empty() {
        line.push_str(&format!(" group-title=\"{}\"", attr_value(&channel.group)));
    }
    if channel.status != ChannelStatus::Unknown {
        line.push_str(&format!(" tvg-status=\"{}\"", channel.status));
    }
    if let Some(rt) = channel.response_time {
        line.push_str(&format!(" tvg-response-time=\"{:.2}\"", rt));
    }
    if let Some(checked) = channel.last_check {
        line.push_str(&format!(
            " tvg-last-check=\"{}\"",
            checked.to_rfc3339_opts(SecondsFormat::Secs, true)
        ));
    }

    format!("{},{}\n{}\n", line, channel.name, channel.url)
}

pub fn render_playlist<'a>(channels: impl IntoIterator<Item = &'a Channel>) -> String {
    let mut out = String::from(M3U_HEADER);
    out.push('\n');
    for channel in channels {
        out.push_str(&channel_to_m3u(channel));
    }
    out
}

/// Write the whole catalog as a playlist; returns the number of channels written
pub async fn save_playlist(path: &Path, catalog: &Catalog) -> Result<usize> {
    tokio::fs::write(path, render_playlist(&catalog.channels)).await?;
    tracing::info!("Saved {} channels to {}", catalog.len(), path.display());
    Ok(catalog.len())
}

/// Write only online/slow channels. Nothing is written when there are none.
pub async fn save_working_channels(path: &Path, catalog: &Catalog) -> Result<usize> {
    let working = catalog.working_channels();
    if working.is_empty() {
        tracing::info!("No working channels found to save");
        return Ok(0);
    }

    tokio::fs::write(path, render_playlist(working.iter().copied())).await?;
    tracing::info!("Saved {} working channels to {}", working.len(), path.display());
    Ok(working.len())
}
