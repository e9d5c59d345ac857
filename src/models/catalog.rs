use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::channel::{Channel, ChannelStatus, UNGROUPED};

/// Ordered channel collection plus the derived group labels
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub groups: Vec<String>,
}

/// Aggregate counts shown to the user after a load/probe/unify
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogStats {
    pub total: usize,
    pub online: usize,
    pub slow: usize,
    pub offline: usize,
    pub unknown: usize,
    pub group_count: usize,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog and derive its group labels
    pub fn from_channels(channels: Vec<Channel>) -> Self {
        let mut catalog = Self {
            channels,
            groups: Vec::new(),
        };
        catalog.rebuild_groups();
        catalog
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Recompute group labels: sorted, distinct, ungrouped label last
    pub fn rebuild_groups(&mut self) {
        let distinct: BTreeSet<&str> = self.channels.iter().map(|c| c.group.as_str()).collect();
        let has_ungrouped = distinct.contains(UNGROUPED);

        let mut groups: Vec<String> = distinct
            .into_iter()
            .filter(|g| *g != UNGROUPED)
            .map(str::to_string)
            .collect();
        if has_ungrouped {
            groups.push(UNGROUPED.to_string());
        }

        self.groups = groups;
    }

    /// Channels of one group, or every channel when `group` is `None`
    pub fn channels_by_group(&self, group: Option<&str>) -> Vec<&Channel> {
        match group {
            None => self.channels.iter().collect(),
            Some(group) => self.channels.iter().filter(|c| c.group == group).collect(),
        }
    }

    pub fn working_channels(&self) -> Vec<&Channel> {
        self.channels.iter().filter(|c| c.is_working()).collect()
    }

    pub fn stats(&self) -> CatalogStats {
        let mut stats = CatalogStats {
            total: self.channels.len(),
            group_count: self.groups.len(),
            ..Default::default()
        };

        for channel in &self.channels {
            match channel.status {
                ChannelStatus::Online => stats.online += 1,
                ChannelStatus::Slow => stats.slow += 1,
                ChannelStatus::Offline => stats.offline += 1,
                ChannelStatus::Unknown => stats.unknown += 1,
            }
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_groups_sorted_with_ungrouped_last() {
        let catalog = Catalog::from_channels(vec![
            Channel::new("a", "http://a", UNGROUPED),
            Channel::new("b", "http://b", "Sports"),
            Channel::new("c", "http://c", "Movies"),
            Channel::new("d", "http://d", "Sports"),
            // sorts after "Sin Grupo" alphabetically
            Channel::new("e", "http://e", "Zapping"),
        ]);

        assert_eq!(catalog.groups, vec!["Movies", "Sports", "Zapping", UNGROUPED]);
    }

    #[test]
    fn test_channels_by_group() {
        let catalog = Catalog::from_channels(vec![
            Channel::new("a", "http://a", "News"),
            Channel::new("b", "http://b", "Sports"),
        ]);

        assert_eq!(catalog.channels_by_group(None).len(), 2);
        let news = catalog.channels_by_group(Some("News"));
        assert_eq!(news.len(), 1);
        assert_eq!(news[0].name, "a");
        assert!(catalog.channels_by_group(Some("Missing")).is_empty());
    }

    #[test]
    fn test_stats_counts_statuses() {
        let mut online = Channel::new("a", "http://a", "G");
        online.status = ChannelStatus::Online;
        let mut offline = Channel::new("b", "http://b", "G");
        offline.status = ChannelStatus::Offline;
        let catalog = Catalog::from_channels(vec![online, offline, Channel::new("c", "http://c", "H")]);

        let stats = catalog.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.online, 1);
        assert_eq!(stats.offline, 1);
        assert_eq!(stats.unknown, 1);
        assert_eq!(stats.group_count, 2);
    }
}
