use serde::{Deserialize, Serialize};

use super::Channel;

/// Request to (re)load the catalog from a remote URL or a local file
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadRequest {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

/// Query parameters for the channels endpoint
#[derive(Debug, Deserialize)]
pub struct ChannelsQuery {
    #[serde(default)]
    pub group: Option<String>,
}

/// Query parameters for the export endpoint
#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    /// Only online/slow channels
    #[serde(default)]
    pub working: bool,
    /// Write into the download directory instead of returning the text
    #[serde(default)]
    pub save: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsResponse {
    pub channels: Vec<Channel>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupsResponse {
    pub groups: Vec<String>,
    pub total: usize,
}
