//! Channel unification
//!
//! Four passes over the catalog:
//! 1. bucket channels by exact URL
//! 2. merge each bucket into one channel (best status wins, canonical name)
//! 3. give channels whose coarse name key matches one shared display name
//! 4. sort by name (case-insensitive) and rebuild the group labels
//!
//! Pass 3 is a heuristic: two unrelated stations sharing their first three
//! words end up with the same display name. Their URLs are never touched,
//! so no playable entry is lost.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::borrow::Cow;
use std::collections::HashMap;

use crate::models::{report, Catalog, Channel, ProgressEvent, ProgressSender};

/// Shortest coarse key that is allowed to merge names
const MIN_KEY_LEN: usize = 3;
/// Words of the normalized name that make up the coarse key
const KEY_WORDS: usize = 3;

/// One textual rewrite applied while normalizing a channel name
pub struct NameRule {
    pub label: &'static str,
    pattern: Regex,
    replacement: &'static str,
}

impl NameRule {
    fn new(label: &'static str, pattern: &str, replacement: &'static str) -> Self {
        Self {
            label,
            pattern: Regex::new(pattern).unwrap(),
            replacement,
        }
    }

    pub fn apply<'a>(&self, input: &'a str) -> Cow<'a, str> {
        self.pattern.replace_all(input, self.replacement)
    }
}

lazy_static! {
    /// Ordered name rules, applied first to last
    pub static ref NAME_RULES: Vec<NameRule> = vec![
        NameRule::new("quality", r"(?i)\b(FHD|UHD|HD|SD|4K)\b", " "),
        NameRule::new("numeric_suffix", r"\s*[\(\[]\s*\d+\s*[\)\]]\s*$", ""),
        NameRule::new("plus_suffix", r"\s*\+\s*\d+\s*$", ""),
        NameRule::new("resolution", r"(?i)\s*\b\d{3,4}[pi]\s*$", ""),
        NameRule::new("tv_suffix", r"(?i)\s+(TV|TELEVISION)\s*$", ""),
        NameRule::new("spanish_article", r"(?i)^\s*(EL|LA|LOS|LAS)\s+", ""),
    ];

    static ref MULTI_SPACE_REGEX: Regex = Regex::new(r"\s+").unwrap();

    /// Letters, digits, space, `- + & ( ) [ ]` and accented Latin letters
    static ref CLEAN_NAME_REGEX: Regex =
        Regex::new(r"^[A-Za-z0-9 \-+&()\[\]\u{00C0}-\u{00D6}\u{00D8}-\u{00F6}\u{00F8}-\u{024F}]+$").unwrap();
}

fn collapse_whitespace(text: &str) -> String {
    MULTI_SPACE_REGEX.replace_all(text.trim(), " ").to_string()
}

/// Strip quality markers, index suffixes, trailing TV and leading articles
pub fn normalize_name(name: &str) -> String {
    let stripped = NAME_RULES
        .iter()
        .fold(name.to_string(), |acc, rule| rule.apply(&acc).into_owned());
    collapse_whitespace(&stripped)
}

/// Coarse grouping key: first words of the normalized, lower-cased name.
///
/// Returns `None` when the key is too short to be trusted.
pub fn unify_key(name: &str) -> Option<String> {
    let normalized = normalize_name(&name.to_lowercase());
    let alnum: String = normalized
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();

    let key = alnum
        .split_whitespace()
        .take(KEY_WORDS)
        .collect::<Vec<_>>()
        .join(" ");

    (key.chars().count() >= MIN_KEY_LEN).then_some(key)
}

/// Keep `candidates` matching `pred`, or all of them when none match
fn prefer<'a>(candidates: Vec<&'a str>, pred: impl Fn(&str) -> bool) -> Vec<&'a str> {
    let kept: Vec<&'a str> = candidates.iter().copied().filter(|c| pred(c)).collect();
    if kept.is_empty() {
        candidates
    } else {
        kept
    }
}

/// Pick the display name for a set of variants of the same station.
///
/// Prefers names of reasonable length, then names without decoration
/// characters, then names not ending in a digit, and finally the shortest
/// (first one on ties).
pub fn select_name<'a>(candidates: &[&'a str]) -> Option<&'a str> {
    let pool = candidates.to_vec();
    let pool = prefer(pool, |c| {
        let len = c.chars().count();
        len > 3 && len < 30
    });
    let pool = prefer(pool, |c| CLEAN_NAME_REGEX.is_match(c));
    let pool = prefer(pool, |c| !c.chars().last().is_some_and(|ch| ch.is_ascii_digit()));

    pool.into_iter().min_by_key(|c| c.chars().count())
}

/// What a unification run changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifyReport {
    pub before: usize,
    pub after: usize,
    pub duplicates_removed: usize,
    pub names_unified: usize,
}

/// Merge channels sharing a URL into one record
fn merge_bucket(members: Vec<Channel>) -> Channel {
    let names: Vec<&str> = members.iter().map(|c| c.name.as_str()).collect();
    let name = select_name(&names).map(str::to_string);

    let logo = members
        .iter()
        .filter_map(|c| c.logo.as_deref())
        .find(|l| !l.is_empty())
        .map(str::to_string);

    let best = members
        .iter()
        .enumerate()
        .min_by_key(|(_, c)| c.status.rank())
        .map(|(i, _)| i)
        .unwrap_or(0);

    let mut merged = members.into_iter().nth(best).unwrap_or_else(|| Channel::new("", "", ""));
    if let Some(name) = name {
        merged.name = name;
    }
    merged.logo = logo;
    merged
}

/// Deduplicate by URL, unify near-identical names, sort.
///
/// Running it again on its own output changes nothing.
pub fn unify(catalog: &mut Catalog, progress: Option<&ProgressSender>) -> UnifyReport {
    let before = catalog.len();

    // Pass 1: bucket by exact URL, first occurrence keeps its position
    report(
        progress,
        ProgressEvent::Unify {
            percent: 0.0,
            message: "Grouping channels by URL".to_string(),
        },
    );
    let mut buckets: Vec<Vec<Channel>> = Vec::new();
    let mut by_url: HashMap<String, usize> = HashMap::new();
    for channel in std::mem::take(&mut catalog.channels) {
        match by_url.get(&channel.url) {
            Some(&idx) => buckets[idx].push(channel),
            None => {
                by_url.insert(channel.url.clone(), buckets.len());
                buckets.push(vec![channel]);
            }
        }
    }

    // Pass 2: one channel per URL
    report(
        progress,
        ProgressEvent::Unify {
            percent: 25.0,
            message: "Merging duplicate URLs".to_string(),
        },
    );
    let mut channels: Vec<Channel> = buckets
        .into_iter()
        .map(|members| {
            if members.len() == 1 {
                members.into_iter().next().unwrap_or_else(|| Channel::new("", "", ""))
            } else {
                merge_bucket(members)
            }
        })
        .collect();
    let duplicates_removed = before - channels.len();

    // Pass 3: shared display name for channels with the same coarse key
    report(
        progress,
        ProgressEvent::Unify {
            percent: 50.0,
            message: "Unifying similar names".to_string(),
        },
    );
    let mut by_key: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, channel) in channels.iter().enumerate() {
        if let Some(key) = unify_key(&channel.name) {
            by_key.entry(key).or_default().push(idx);
        }
    }

    let mut names_unified = 0usize;
    for members in by_key.values().filter(|m| m.len() > 1) {
        let canonical = {
            let names: Vec<&str> = members.iter().map(|&i| channels[i].name.as_str()).collect();
            match select_name(&names) {
                Some(name) => name.to_string(),
                None => continue,
            }
        };
        for &i in members {
            if channels[i].name != canonical {
                tracing::debug!("Renaming '{}' to '{}'", channels[i].name, canonical);
                channels[i].name = canonical.clone();
                names_unified += 1;
            }
        }
    }

    // Pass 4: order and group labels
    report(
        progress,
        ProgressEvent::Unify {
            percent: 75.0,
            message: "Sorting channels".to_string(),
        },
    );
    channels.sort_by_cached_key(|c| c.name.to_lowercase());
    catalog.channels = channels;
    catalog.rebuild_groups();

    let summary = UnifyReport {
        before,
        after: catalog.len(),
        duplicates_removed,
        names_unified,
    };

    report(
        progress,
        ProgressEvent::Unify {
            percent: 100.0,
            message: format!(
                "{} duplicates removed, {} names unified",
                duplicates_removed, names_unified
            ),
        },
    );
    tracing::info!(
        "Unified catalog: {} -> {} channels ({} duplicates removed, {} names unified)",
        before,
        summary.after,
        duplicates_removed,
        names_unified
    );

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChannelStatus, UNGROUPED};
    use chrono::Utc;
    use std::collections::HashSet;

    fn rule(label: &str) -> &'static NameRule {
        NAME_RULES.iter().find(|r| r.label == label).unwrap()
    }

    fn ch(name: &str, url: &str, group: &str) -> Channel {
        Channel::new(name, url, group)
    }

    #[test]
    fn test_quality_rule() {
        assert_eq!(rule("quality").apply("News HD").trim(), "News");
        assert_eq!(rule("quality").apply("Cine fhd 4k").trim(), "Cine");
        // only whole tokens
        assert_eq!(rule("quality").apply("HDTV"), "HDTV");
    }

    #[test]
    fn test_numeric_suffix_rule() {
        assert_eq!(rule("numeric_suffix").apply("Canal 5 (1)"), "Canal 5");
        assert_eq!(rule("numeric_suffix").apply("Canal 5 [ 2 ]"), "Canal 5");
        assert_eq!(rule("numeric_suffix").apply("Canal (Sur)"), "Canal (Sur)");
    }

    #[test]
    fn test_plus_suffix_rule() {
        assert_eq!(rule("plus_suffix").apply("Movistar +1"), "Movistar");
        assert_eq!(rule("plus_suffix").apply("Canal+ 2"), "Canal");
    }

    #[test]
    fn test_resolution_rule() {
        assert_eq!(rule("resolution").apply("Sports 1080p"), "Sports");
        assert_eq!(rule("resolution").apply("Sports 720P"), "Sports");
        assert_eq!(rule("resolution").apply("Channel 1080 News"), "Channel 1080 News");
    }

    #[test]
    fn test_tv_suffix_rule() {
        assert_eq!(rule("tv_suffix").apply("Repetir TV"), "Repetir");
        assert_eq!(rule("tv_suffix").apply("Azteca Television"), "Azteca");
        assert_eq!(rule("tv_suffix").apply("TV"), "TV");
    }

    #[test]
    fn test_spanish_article_rule() {
        assert_eq!(rule("spanish_article").apply("La Sexta"), "Sexta");
        assert_eq!(rule("spanish_article").apply("los Simpson"), "Simpson");
        assert_eq!(rule("spanish_article").apply("Laser"), "Laser");
    }

    #[test]
    fn test_normalize_name_chain() {
        assert_eq!(normalize_name("El Canal HD (2)"), "Canal");
        assert_eq!(normalize_name("  News   HD  "), "News");
    }

    #[test]
    fn test_unify_key() {
        assert_eq!(unify_key("Repetir HD").as_deref(), Some("repetir"));
        assert_eq!(unify_key("REPETIR").as_deref(), Some("repetir"));
        assert_eq!(unify_key("Fox Sports Premium Extra!").as_deref(), Some("fox sports premium"));
        assert_eq!(unify_key("A1"), None);
        assert_eq!(unify_key("!!"), None);
    }

    #[test]
    fn test_select_name_steps() {
        assert_eq!(select_name(&["News HD", "News"]), Some("News"));
        // length window beats shortness
        assert_eq!(select_name(&["TV", "Telecinco"]), Some("Telecinco"));
        // decoration characters lose
        assert_eq!(select_name(&["Cuatro ★", "Cuatro HD"]), Some("Cuatro HD"));
        // trailing digits lose
        assert_eq!(select_name(&["Canal 1", "Canal 1 HD"]), Some("Canal 1 HD"));
        // ties keep first occurrence
        assert_eq!(select_name(&["Alpha", "Omega"]), Some("Alpha"));
        assert_eq!(select_name(&[]), None);
    }

    #[test]
    fn test_exact_url_duplicates_merge() {
        let mut catalog = Catalog::from_channels(vec![
            ch("News HD", "http://x/1", "Info"),
            ch("News", "http://x/1", "Info"),
        ]);

        let summary = unify(&mut catalog, None);

        assert_eq!(summary.duplicates_removed, 1);
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.channels[0].url, "http://x/1");
        assert_eq!(catalog.channels[0].name, "News");
    }

    #[test]
    fn test_merge_takes_best_status_and_first_logo() {
        let now = Utc::now();
        let mut offline = ch("Sport", "http://x/1", "A");
        offline.record_probe(ChannelStatus::Offline, None, now);
        let mut slow = ch("Sport HD", "http://x/1", "B");
        slow.record_probe(ChannelStatus::Slow, Some(2.5), now);
        let with_logo = ch("Sport 2", "http://x/1", "C").with_logo(Some("http://logo".into()));

        let mut catalog = Catalog::from_channels(vec![offline, slow, with_logo]);
        unify(&mut catalog, None);

        let merged = &catalog.channels[0];
        assert_eq!(merged.status, ChannelStatus::Slow);
        assert_eq!(merged.group, "B");
        assert_eq!(merged.response_time, Some(2.5));
        assert_eq!(merged.logo.as_deref(), Some("http://logo"));
        assert_eq!(merged.name, "Sport");
    }

    fn fixture() -> Catalog {
        Catalog::from_channels(vec![
            ch("Canal 1", "http://example.com/stream1", "Grupo 1"),
            ch("Canal 1 HD", "http://example.com/stream1", "Grupo 1"),
            ch("Canal 2", "http://example.com/stream2", "Grupo 2"),
            ch("Canal 2 FHD", "http://example.com/stream2", "Grupo 2"),
            ch("Canal 3", "http://example.com/stream3", "Grupo 1"),
            ch("Canal 4", "http://example.com/stream4", "Grupo 2"),
            ch("Canal 5", "http://example.com/stream5", "Grupo 3"),
            ch("Canal 5 (1)", "http://example.com/stream5", "Grupo 3"),
            ch("Repetir TV", "http://example.com/repetir1", "Grupo 1"),
            ch("Repetir HD", "http://example.com/repetir2", "Grupo 1"),
            ch("REPETIR", "http://example.com/repetir3", UNGROUPED),
        ])
    }

    #[test]
    fn test_urls_unique_and_sorted() {
        let mut catalog = fixture();
        let summary = unify(&mut catalog, None);

        assert_eq!(summary.before, 11);
        assert_eq!(summary.after, 8);
        assert_eq!(summary.duplicates_removed, 3);

        let urls: HashSet<&str> = catalog.channels.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(urls.len(), catalog.len());

        let names: Vec<String> = catalog.channels.iter().map(|c| c.name.to_lowercase()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);

        let repetir: Vec<&Channel> = catalog
            .channels
            .iter()
            .filter(|c| c.url.contains("repetir"))
            .collect();
        assert_eq!(repetir.len(), 3);
        assert!(repetir.iter().all(|c| c.name == "REPETIR"));

        assert_eq!(catalog.groups.last().map(String::as_str), Some(UNGROUPED));
    }

    #[test]
    fn test_unify_is_idempotent() {
        let mut catalog = fixture();
        unify(&mut catalog, None);
        let first = catalog.clone();

        let second = unify(&mut catalog, None);

        assert_eq!(second.duplicates_removed, 0);
        assert_eq!(second.names_unified, 0);
        assert_eq!(catalog, first);
    }

    #[test]
    fn test_short_keys_do_not_merge() {
        let mut catalog = Catalog::from_channels(vec![
            ch("A1", "http://x/1", UNGROUPED),
            ch("A1 HD", "http://x/2", UNGROUPED),
        ]);
        unify(&mut catalog, None);

        let names: HashSet<&str> = catalog.channels.iter().map(|c| c.name.as_str()).collect();
        assert!(names.contains("A1"));
        assert!(names.contains("A1 HD"));
    }

    #[test]
    fn test_progress_ends_at_100() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut catalog = fixture();
        unify(&mut catalog, Some(&tx));
        drop(tx);

        let mut last = None;
        while let Ok(event) = rx.try_recv() {
            last = Some(event);
        }
        assert!(matches!(last, Some(ProgressEvent::Unify { percent, .. }) if percent == 100.0));
    }
}
