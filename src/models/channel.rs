use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Group label assigned to channels that carry no `group-title`
pub const UNGROUPED: &str = "Sin Grupo";

/// Liveness of a channel's stream, as seen by the last probe
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelStatus {
    #[default]
    Unknown,
    Online,
    Slow,
    Offline,
}

impl ChannelStatus {
    /// Merge priority, lower is better: online < slow < unknown < offline
    pub fn rank(self) -> u8 {
        match self {
            ChannelStatus::Online => 0,
            ChannelStatus::Slow => 1,
            ChannelStatus::Unknown => 2,
            ChannelStatus::Offline => 3,
        }
    }

    pub fn is_working(self) -> bool {
        matches!(self, ChannelStatus::Online | ChannelStatus::Slow)
    }
}

impl std::fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelStatus::Unknown => write!(f, "unknown"),
            ChannelStatus::Online => write!(f, "online"),
            ChannelStatus::Slow => write!(f, "slow"),
            ChannelStatus::Offline => write!(f, "offline"),
        }
    }
}

impl std::str::FromStr for ChannelStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unknown" => Ok(ChannelStatus::Unknown),
            "online" => Ok(ChannelStatus::Online),
            "slow" => Ok(ChannelStatus::Slow),
            "offline" => Ok(ChannelStatus::Offline),
            other => Err(format!("unknown channel status: {}", other)),
        }
    }
}

/// Accepts RFC 3339 and the naive `YYYY-mm-ddTHH:MM:SS[.f]` form (read as UTC)
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn default_group() -> String {
    UNGROUPED.to_string()
}

/// `null` or blank group labels fall back to the ungrouped label
fn deserialize_group<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let group = Option::<String>::deserialize(deserializer)?;
    Ok(group
        .map(|g| g.trim().to_string())
        .filter(|g| !g.is_empty())
        .unwrap_or_else(default_group))
}

/// Timestamps with or without offset; anything unreadable counts as never checked
fn deserialize_last_check<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}

/// Single playlist entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub name: String,
    pub url: String,
    #[serde(default = "default_group", deserialize_with = "deserialize_group")]
    pub group: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    #[serde(default)]
    pub status: ChannelStatus,
    /// Seconds, only present for online/slow channels
    #[serde(default, alias = "response_time", skip_serializing_if = "Option::is_none")]
    pub response_time: Option<f64>,
    #[serde(
        default,
        alias = "last_check",
        deserialize_with = "deserialize_last_check",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_check: Option<DateTime<Utc>>,
}

impl Channel {
    pub fn new(name: impl Into<String>, url: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            group: group.into(),
            logo: None,
            status: ChannelStatus::Unknown,
            response_time: None,
            last_check: None,
        }
    }

    pub fn with_logo(mut self, logo: Option<String>) -> Self {
        self.logo = logo;
        self
    }

    /// Store a probe outcome.
    ///
    /// `response_time` is dropped unless the status is online or slow, and
    /// `last_check` is always set.
    pub fn record_probe(
        &mut self,
        status: ChannelStatus,
        response_time: Option<f64>,
        checked_at: DateTime<Utc>,
    ) {
        self.status = status;
        self.response_time = if status.is_working() { response_time } else { None };
        self.last_check = Some(checked_at);
    }

    /// Mark the channel as unreachable without probing it; the check
    /// time is when that was decided
    pub fn mark_offline(&mut self, checked_at: DateTime<Utc>) {
        self.record_probe(ChannelStatus::Offline, None, checked_at);
    }

    pub fn is_working(&self) -> bool {
        self.status.is_working()
    }

    /// Bring a deserialized record back in line: no response time unless
    /// working, no status without a check time
    pub fn restore_invariants(&mut self) {
        if self.last_check.is_none() {
            self.status = ChannelStatus::Unknown;
        }
        if !self.status.is_working() {
            self.response_time = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_rank_order() {
        let mut statuses = vec![
            ChannelStatus::Offline,
            ChannelStatus::Unknown,
            ChannelStatus::Slow,
            ChannelStatus::Online,
        ];
        statuses.sort_by_key(|s| s.rank());
        assert_eq!(
            statuses,
            vec![
                ChannelStatus::Online,
                ChannelStatus::Slow,
                ChannelStatus::Unknown,
                ChannelStatus::Offline,
            ]
        );
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!("ONLINE".parse::<ChannelStatus>(), Ok(ChannelStatus::Online));
        assert_eq!(" slow ".parse::<ChannelStatus>(), Ok(ChannelStatus::Slow));
        assert!("broken".parse::<ChannelStatus>().is_err());
    }

    #[test]
    fn test_record_probe_drops_response_time_when_offline() {
        let mut channel = Channel::new("News", "http://x/1", UNGROUPED);
        let now = Utc::now();
        channel.record_probe(ChannelStatus::Offline, Some(1.2), now);

        assert_eq!(channel.status, ChannelStatus::Offline);
        assert_eq!(channel.response_time, None);
        assert_eq!(channel.last_check, Some(now));
    }

    #[test]
    fn test_deserialize_snake_case_fields() {
        let json = r#"{"name":"A","url":"http://a","status":"slow","response_time":2.5,"last_check":"2024-01-01T10:00:00Z"}"#;
        let channel: Channel = serde_json::from_str(json).unwrap();

        assert_eq!(channel.group, UNGROUPED);
        assert_eq!(channel.status, ChannelStatus::Slow);
        assert_eq!(channel.response_time, Some(2.5));
        assert!(channel.last_check.is_some());
    }

    #[test]
    fn test_deserialize_null_group_and_naive_timestamp() {
        let json = r#"{"name":"A","url":"http://a","group":null,"logo":null,"status":"online","response_time":0.4,"last_check":"2024-05-01T12:00:00.123456"}"#;
        let channel: Channel = serde_json::from_str(json).unwrap();

        assert_eq!(channel.group, UNGROUPED);
        assert_eq!(channel.logo, None);
        assert_eq!(
            channel.last_check.map(|t| t.to_rfc3339()),
            Some("2024-05-01T12:00:00.123456+00:00".to_string())
        );
    }

    #[test]
    fn test_restore_invariants() {
        let json = r#"{"name":"A","url":"http://a","status":"offline","response_time":3.1,"last_check":"garbage"}"#;
        let mut channel: Channel = serde_json::from_str(json).unwrap();
        assert_eq!(channel.last_check, None);

        channel.restore_invariants();
        assert_eq!(channel.status, ChannelStatus::Unknown);
        assert_eq!(channel.response_time, None);
    }

    #[test]
    fn test_missing_status_defaults_to_unknown() {
        assert_eq!(ChannelStatus::default(), ChannelStatus::Unknown);

        let channel: Channel = serde_json::from_str(r#"{"name":"A","url":"http://a"}"#).unwrap();
        assert_eq!(channel.status, ChannelStatus::Unknown);
        assert_eq!(channel.last_check, None);
    }
}
