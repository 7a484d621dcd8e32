//! Record classification and counting.

use std::collections::BTreeMap;

use crate::flowlog::FlowRecord;
use crate::lookup::LookupTable;
use crate::protocol::ProtocolTable;

/// Tag given to records with no lookup entry unless configured otherwise.
pub const DEFAULT_UNTAGGED: &str = "Untagged";

/// Records per tag, ordered by tag.
pub type TagCounts = BTreeMap<String, u64>;

/// Records per (destination port, protocol name), ordered by port then name.
pub type PortProtocolCounts = BTreeMap<(u16, String), u64>;

/// Tag for `record`, or `untagged` when the lookup table has no entry for its
/// destination port and resolved protocol.
pub fn classify<'a>(
    record: &FlowRecord,
    lookup: &'a LookupTable,
    protocols: &ProtocolTable,
    untagged: &'a str,
) -> &'a str {
    let protocol = protocols.resolve(record.protocol);
    lookup.get(record.dst_port, &protocol).unwrap_or(untagged)
}

/// Final counts of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Counts {
    pub tags: TagCounts,
    pub port_protocols: PortProtocolCounts,
    pub records: u64,
}

/// Running counts for one pass over a flow log.
pub struct Aggregator<'a> {
    lookup: &'a LookupTable,
    protocols: &'a ProtocolTable,
    untagged: String,
    counts: Counts,
}

impl<'a> Aggregator<'a> {
    /// Every tag of `lookup` and the `untagged` tag start at zero so they are
    /// reported even when no record matches them.
    pub fn new(
        lookup: &'a LookupTable,
        protocols: &'a ProtocolTable,
        untagged: impl Into<String>,
    ) -> Self {
        let untagged = untagged.into();
        let mut tags: TagCounts = lookup.tags().into_iter().map(|t| (t.to_string(), 0)).collect();
        tags.insert(untagged.clone(), 0);

        Aggregator {
            lookup,
            protocols,
            untagged,
            counts: Counts {
                tags,
                ..Counts::default()
            },
        }
    }

    pub fn classify(&self, record: &FlowRecord) -> &str {
        classify(record, self.lookup, self.protocols, &self.untagged)
    }

    /// Count one record against its tag and its port/protocol pair.
    pub fn observe(&mut self, record: &FlowRecord) {
        let protocol = self.protocols.resolve(record.protocol);
        let tag = self
            .lookup
            .get(record.dst_port, &protocol)
            .unwrap_or(&self.untagged);

        match self.counts.tags.get_mut(tag) {
            Some(count) => *count += 1,
            None => {
                self.counts.tags.insert(tag.to_string(), 1);
            }
        }
        *self
            .counts
            .port_protocols
            .entry((record.dst_port, protocol.into_owned()))
            .or_insert(0) += 1;
        self.counts.records += 1;
    }

    pub fn counts(&self) -> &Counts {
        &self.counts
    }

    pub fn finish(self) -> Counts {
        self.counts
    }
}
