use crate::error::Result;
use crate::table::{AsPath, Asn};
use serde::de::IgnoredAny;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/*
    One feed line, as emitted by the monitoring feed:

    { "type": "state" | "update" | ...,
      "neighbor": {
         "ip": "192.0.2.1",
         "state": "up",
         "message": { "update": {
             "attribute": { "as-path": [ 65001, 64500 ] },
             "announce":  { <afi>: { <nexthop>: { <prefix>: {}, ... } } },
             "withdraw":  { <afi>: { <nexthop>: { <prefix>: {}, ... } } }
         } }
      }
    }

    Absent sections decode as empty. Keys the feed adds beyond these are
    ignored.
*/
#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(rename = "type", default)]
    kind: String,
    neighbor: Option<RawNeighbor>,
}

#[derive(Debug, Deserialize)]
struct RawNeighbor {
    ip: String,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    message: RawBody,
}

#[derive(Debug, Default, Deserialize)]
struct RawBody {
    #[serde(default)]
    update: Option<RawUpdate>,
}

#[derive(Debug, Default, Deserialize)]
struct RawUpdate {
    #[serde(default)]
    attribute: RawAttribute,
    #[serde(default)]
    announce: Option<PrefixSection>,
    #[serde(default)]
    withdraw: Option<PrefixSection>,
}

#[derive(Debug, Default, Deserialize)]
struct RawAttribute {
    #[serde(rename = "as-path", default)]
    as_path: Vec<serde_json::Value>,
}

/// Prefixes grouped by address family, then next hop.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(transparent)]
pub struct PrefixSection(BTreeMap<String, BTreeMap<String, BTreeMap<String, IgnoredAny>>>);

impl PrefixSection {
    /// Walks every (afi, next hop, prefix) leaf.
    pub fn prefixes(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.0.iter().flat_map(|(afi, nexthops)| {
            nexthops.iter().flat_map(move |(nexthop, prefixes)| {
                prefixes
                    .keys()
                    .map(move |prefix| (afi.as_str(), nexthop.as_str(), prefix.as_str()))
            })
        })
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes().next().is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateMsg {
    pub neighbor: String,
    pub state: String,
}

#[derive(Debug, Clone)]
pub struct UpdateMsg {
    pub neighbor: String,
    pub as_path: Arc<AsPath>,
    pub announce: Option<PrefixSection>,
    pub withdraw: Option<PrefixSection>,
}

#[derive(Debug, Clone)]
pub enum Message {
    State(StateMsg),
    Update(UpdateMsg),
    /// Well-formed but of a type this collector does not consume.
    Other(String),
}

impl Message {
    pub fn decode(line: &str) -> Result<Message> {
        let RawMessage { kind, neighbor } = serde_json::from_str(line)?;
        let neighbor = match neighbor {
            Some(n) if kind == "state" || kind == "update" => n,
            _ => return Ok(Message::Other(kind)),
        };

        if kind == "state" {
            return Ok(Message::State(StateMsg {
                neighbor: neighbor.ip,
                state: neighbor.state.unwrap_or_default(),
            }));
        }

        let update = neighbor.message.update.unwrap_or_default();
        Ok(Message::Update(UpdateMsg {
            neighbor: neighbor.ip,
            as_path: Arc::new(as_path(&update.attribute.as_path)),
            announce: update.announce,
            withdraw: update.withdraw,
        }))
    }
}

// Entries that are not plain 32-bit ASNs (AS_SET groupings, for instance) are
// skipped.
fn as_path(values: &[serde_json::Value]) -> AsPath {
    values
        .iter()
        .filter_map(|v| v.as_u64())
        .filter_map(|v| Asn::try_from(v).ok())
        .collect::<Vec<_>>()
        .into()
}
