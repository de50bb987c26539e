//! Enclosure topology inference from column names.
//!
//! Enclosure ids found in column names are grouped by inverter group, ordered
//! by their `BAT<n>` suffix and split between the group's two DC inputs.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::energy::types::ChannelKey;
use crate::schema::EnclosurePattern;

/// How many enclosures of a sorted group feed DC input 1 and DC input 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitRule {
    first: usize,
    second: usize,
}

impl SplitRule {
    /// Default split for six-enclosure groups.
    pub const SIX: Self = Self::new(3, 3);
    /// Default split for four-enclosure groups.
    pub const FOUR: Self = Self::new(2, 2);

    pub const fn new(first: usize, second: usize) -> Self {
        Self { first, second }
    }

    /// Midpoint split used for group sizes other than 6 and 4.
    ///
    /// Floor division puts the odd member on DC input 2.
    pub const fn midpoint(len: usize) -> Self {
        let first = len / 2;
        Self::new(first, len - first)
    }

    /// Splits a sorted slice into (DC input 1, DC input 2) members.
    pub fn apply<'a, T>(&self, sorted: &'a [T]) -> (&'a [T], &'a [T]) {
        let a = self.first.min(sorted.len());
        let b = (self.first + self.second).min(sorted.len());
        (&sorted[..a], &sorted[a..b])
    }
}

/// An enclosure id parsed against the fixed `<d><A|B><d>BAT<n>` shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnclosureId {
    pub id: String,
    /// Inverter group, e.g. `1A1`.
    pub group: String,
    /// Numeric `BAT` suffix; the sort key within a group.
    pub number: u64,
}

impl EnclosureId {
    /// Returns `None` for ids that do not have the fixed shape.
    pub fn parse(id: &str) -> Option<Self> {
        let group = id.get(..3)?;
        let suffix = id.get(3..)?.strip_prefix("BAT")?;
        let g = group.as_bytes();
        let group_ok =
            g[0].is_ascii_digit() && matches!(g[1], b'A' | b'B') && g[2].is_ascii_digit();
        if !group_ok || suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(Self {
            id: id.to_string(),
            group: group.to_string(),
            number: suffix.parse().ok()?,
        })
    }
}

/// `(inverter_group, dc_input) -> enclosure ids`, ascending by `BAT` number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopologyMapping {
    channels: BTreeMap<ChannelKey, Vec<String>>,
}

impl TopologyMapping {
    /// Enclosures sharing a channel; `None` if the channel is unknown.
    pub fn get(&self, channel: &ChannelKey) -> Option<&[String]> {
        self.channels.get(channel).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ChannelKey, &[String])> {
        self.channels.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Number of channels (including channels with no enclosures).
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Total enclosures across all channels.
    pub fn enclosure_count(&self) -> usize {
        self.channels.values().map(Vec::len).sum()
    }
}

impl FromIterator<(ChannelKey, Vec<String>)> for TopologyMapping {
    fn from_iter<I: IntoIterator<Item = (ChannelKey, Vec<String>)>>(iter: I) -> Self {
        Self {
            channels: iter.into_iter().collect(),
        }
    }
}

/// Result of topology inference.
#[derive(Debug, Clone, Default)]
pub struct TopologyReport {
    pub mapping: TopologyMapping,
    /// Matched ids that do not have the fixed enclosure shape, sorted.
    pub discarded: Vec<String>,
}

/// Builds the topology mapping from column names.
#[derive(Debug, Clone)]
pub struct TopologyInferrer {
    pattern: EnclosurePattern,
    split_6: SplitRule,
    split_4: SplitRule,
}

impl TopologyInferrer {
    pub fn new(pattern: EnclosurePattern, split_6: SplitRule, split_4: SplitRule) -> Self {
        Self {
            pattern,
            split_6,
            split_4,
        }
    }

    fn rule_for(&self, len: usize) -> SplitRule {
        match len {
            6 => self.split_6,
            4 => self.split_4,
            n => SplitRule::midpoint(n),
        }
    }

    /// Infers the mapping from the given column names.
    ///
    /// Never fails: no matching columns gives an empty mapping.
    pub fn infer<'a, I>(&self, columns: I) -> TopologyReport
    where
        I: IntoIterator<Item = &'a str>,
    {
        let ids: BTreeSet<&str> = columns
            .into_iter()
            .filter_map(|c| self.pattern.match_column(c))
            .collect();

        let mut groups: BTreeMap<String, Vec<EnclosureId>> = BTreeMap::new();
        let mut discarded = Vec::new();
        for id in ids {
            match EnclosureId::parse(id) {
                Some(parsed) => groups.entry(parsed.group.clone()).or_default().push(parsed),
                None => discarded.push(id.to_string()),
            }
        }
        if !discarded.is_empty() {
            warn!(
                count = discarded.len(),
                ids = ?discarded,
                "enclosure ids without <group>BAT<n> shape were discarded"
            );
        }

        let mut channels = BTreeMap::new();
        for (group, mut members) in groups {
            members.sort_by_key(|e| e.number);
            let rule = self.rule_for(members.len());
            if members.len() != 6 && members.len() != 4 {
                debug!(
                    group = %group,
                    size = members.len(),
                    "non-standard group size, splitting at midpoint"
                );
            }
            let (dc1, dc2) = rule.apply(&members);
            let to_ids = |slice: &[EnclosureId]| -> Vec<String> {
                slice.iter().map(|e| e.id.clone()).collect()
            };
            channels.insert(ChannelKey::new(group.clone(), 1), to_ids(dc1));
            channels.insert(ChannelKey::new(group, 2), to_ids(dc2));
        }

        let mapping = TopologyMapping { channels };
        debug!(
            channels = mapping.len(),
            enclosures = mapping.enclosure_count(),
            "inferred enclosure topology"
        );
        TopologyReport { mapping, discarded }
    }
}
