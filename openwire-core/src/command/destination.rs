//! Destinations (spec.md §3 "Destinations" + §6 legacy string forms).

use crate::command::ids::ConnectionId;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Queue(PhysicalDestination),
    Topic(PhysicalDestination),
    TempQueue(TemporaryDestination),
    TempTopic(TemporaryDestination),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalDestination {
    name: String,
    options: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemporaryDestination {
    physical: PhysicalDestination,
    owner: ConnectionId,
}

/// Per-connection counter that assigns the monotonic suffix of a temporary
/// destination's physical name, e.g. `ID:conn-1:42`.
#[derive(Debug, Default)]
pub struct TempDestinationCounter(AtomicU64);

impl TempDestinationCounter {
    pub fn next_suffix(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl PhysicalDestination {
    pub fn new(raw_name: impl Into<String>) -> Self {
        let raw_name = raw_name.into();
        let (name, options) = split_options(&raw_name);
        Self { name, options }
    }

    pub fn physical_name(&self) -> &str {
        &self.name
    }

    /// Producer-kernel-recognized keys consulted from the destination options
    /// suffix (spec.md §4.4): e.g. `consumer.prefetchSize`, or broker-specific
    /// routing hints. Unknown keys are ignored, same as unknown URL query keys.
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }
}

impl TemporaryDestination {
    pub fn new(raw_name: impl Into<String>, owner: ConnectionId) -> Self {
        Self {
            physical: PhysicalDestination::new(raw_name),
            owner,
        }
    }

    pub fn generate(prefix: &str, owner: ConnectionId, counter: &TempDestinationCounter) -> Self {
        let name = format!("{prefix}:{owner}:{}", counter.next_suffix());
        Self::new(name, owner)
    }

    pub fn physical_name(&self) -> &str {
        self.physical.physical_name()
    }

    pub fn owner(&self) -> &ConnectionId {
        &self.owner
    }

    /// Invariant: a temporary destination is valid only while its owning
    /// connection lives.
    pub fn is_valid_for(&self, connection_id: &ConnectionId) -> bool {
        &self.owner == connection_id
    }
}

impl Destination {
    pub fn physical_name(&self) -> &str {
        match self {
            Self::Queue(p) | Self::Topic(p) => p.physical_name(),
            Self::TempQueue(t) | Self::TempTopic(t) => t.physical_name(),
        }
    }

    pub fn is_topic(&self) -> bool {
        matches!(self, Self::Topic(_) | Self::TempTopic(_))
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self, Self::TempQueue(_) | Self::TempTopic(_))
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self {
            Self::Queue(_) => "queue://",
            Self::Topic(_) => "topic://",
            Self::TempQueue(_) => "temp-queue://",
            Self::TempTopic(_) => "temp-topic://",
        };
        write!(f, "{prefix}{}", self.physical_name())
    }
}

/// Legacy/interop textual form (spec.md §6): `/queue/foo`, `/topic/foo`, etc.
/// `/remote-temp-{queue,topic}/` parse as their local temp-destination
/// counterpart; the "remote" distinction only matters to the broker.
impl FromStr for Destination {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = s.strip_prefix("/queue/") {
            Ok(Self::Queue(PhysicalDestination::new(rest)))
        } else if let Some(rest) = s.strip_prefix("/topic/") {
            Ok(Self::Topic(PhysicalDestination::new(rest)))
        } else if s.strip_prefix("/temp-queue/").is_some()
            || s.strip_prefix("/remote-temp-queue/").is_some()
        {
            Err("temporary destinations cannot be parsed without an owning connection id; use Destination::TempQueue directly".to_string())
        } else if s.strip_prefix("/temp-topic/").is_some()
            || s.strip_prefix("/remote-temp-topic/").is_some()
        {
            Err("temporary destinations cannot be parsed without an owning connection id; use Destination::TempTopic directly".to_string())
        } else {
            Err(format!("unrecognized destination string form: {s}"))
        }
    }
}

fn split_options(raw_name: &str) -> (String, BTreeMap<String, String>) {
    match raw_name.split_once('?') {
        None => (raw_name.to_string(), BTreeMap::new()),
        Some((name, query)) => {
            let mut options = BTreeMap::new();
            for pair in query.split('&') {
                if pair.is_empty() {
                    continue;
                }
                match pair.split_once('=') {
                    Some((k, v)) => {
                        options.insert(k.to_string(), v.to_string());
                    }
                    None => {
                        options.insert(pair.to_string(), String::new());
                    }
                }
            }
            (name.to_string(), options)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_legacy_queue_form() {
        let dest: Destination = "/queue/orders".parse().unwrap();
        assert_eq!(dest.physical_name(), "orders");
        assert!(!dest.is_topic());
    }

    #[test]
    fn parses_destination_options_suffix() {
        let p = PhysicalDestination::new("orders?consumer.prefetchSize=10");
        assert_eq!(p.physical_name(), "orders");
        assert_eq!(p.option("consumer.prefetchSize"), Some("10"));
    }

    #[test]
    fn temp_destination_valid_only_for_owner() {
        let owner = ConnectionId::new("conn-1");
        let other = ConnectionId::new("conn-2");
        let counter = TempDestinationCounter::default();
        let temp = TemporaryDestination::generate("ID", owner.clone(), &counter);
        assert!(temp.is_valid_for(&owner));
        assert!(!temp.is_valid_for(&other));
    }
}
