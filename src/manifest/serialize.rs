//! JSON form of the manifest
//!
//! Fields are written in a fixed order. Absent values, empty lists and agents
//! without any field are left out. Reading accepts any field order and skips
//! unknown fields.

use super::{Agent, Manifest, PathAnnotation, PathMetadata};
use crate::locator::Locator;
use crate::vfs::BundlePath;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// JSON-LD context of bundle manifests
pub const CONTEXT: &str = "https://w3id.org/bundle/context";

/// RFC 3339, UTC, millisecond precision
pub(crate) fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

struct Timestamp<'a>(&'a DateTime<Utc>);

impl Serialize for Timestamp<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_timestamp(self.0))
    }
}

pub(crate) mod optional_timestamp {
    use super::Timestamp;
    use chrono::{DateTime, Utc};
    use serde::Serializer;

    pub(crate) fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(timestamp) => serializer.serialize_some(&Timestamp(timestamp)),
            None => serializer.serialize_none(),
        }
    }
}

/// A single value is written bare, several as an array
pub(crate) fn serialize_one_or_many<S, T>(values: &[T], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: Serialize,
{
    match values {
        [single] => single.serialize(serializer),
        _ => {
            let mut seq = serializer.serialize_seq(Some(values.len()))?;
            for value in values {
                seq.serialize_element(value)?;
            }
            seq.end()
        }
    }
}

/// Accept either a bare value or an array of values
pub(crate) fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany<T> {
        One(T),
        Many(Vec<T>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) => vec![value],
        OneOrMany::Many(values) => values,
    })
}

pub(crate) fn agent_is_empty(agent: &Option<Agent>) -> bool {
    agent.as_ref().map_or(true, Agent::is_empty)
}

fn non_empty_agents(agents: &[Agent]) -> Vec<&Agent> {
    agents.iter().filter(|agent| !agent.is_empty()).collect()
}

fn path_strings(paths: &[BundlePath]) -> Vec<String> {
    paths.iter().map(|path| path.to_string()).collect()
}

impl Serialize for PathMetadata {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("uri", &self.uri)?;
        if let Some(mediatype) = &self.mediatype {
            map.serialize_entry("mediatype", mediatype)?;
        }
        if let Some(created_on) = &self.created_on {
            map.serialize_entry("createdOn", &Timestamp(created_on))?;
        }
        if !agent_is_empty(&self.created_by) {
            map.serialize_entry("createdBy", &self.created_by)?;
        }
        if let Some(authored_on) = &self.authored_on {
            map.serialize_entry("authoredOn", &Timestamp(authored_on))?;
        }
        let authored_by = non_empty_agents(&self.authored_by);
        if !authored_by.is_empty() {
            map.serialize_entry("authoredBy", &authored_by)?;
        }
        if let Some(retrieved_from) = &self.retrieved_from {
            map.serialize_entry("retrievedFrom", retrieved_from)?;
        }
        if let Some(retrieved_on) = &self.retrieved_on {
            map.serialize_entry("retrievedOn", &Timestamp(retrieved_on))?;
        }
        if !agent_is_empty(&self.retrieved_by) {
            map.serialize_entry("retrievedBy", &self.retrieved_by)?;
        }
        if let Some(conforms_to) = &self.conforms_to {
            map.serialize_entry("conformsTo", conforms_to)?;
        }
        if let Some(proxy) = &self.proxy {
            map.serialize_entry("proxy", proxy)?;
        }
        map.end()
    }
}

impl Serialize for Manifest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("@context", &[CONTEXT])?;
        map.serialize_entry("id", &self.id)?;

        let manifest = path_strings(&self.manifest);
        if !manifest.is_empty() {
            map.serialize_entry("manifest", &manifest)?;
        }
        if !self.conforms_to.is_empty() {
            map.serialize_entry("conformsTo", &self.conforms_to)?;
        }
        if let Some(created_on) = &self.created_on {
            map.serialize_entry("createdOn", &Timestamp(created_on))?;
        }
        if !agent_is_empty(&self.created_by) {
            map.serialize_entry("createdBy", &self.created_by)?;
        }
        if let Some(authored_on) = &self.authored_on {
            map.serialize_entry("authoredOn", &Timestamp(authored_on))?;
        }
        let authored_by = non_empty_agents(&self.authored_by);
        if !authored_by.is_empty() {
            map.serialize_entry("authoredBy", &authored_by)?;
        }
        if let Some(retrieved_from) = &self.retrieved_from {
            map.serialize_entry("retrievedFrom", retrieved_from)?;
        }
        if let Some(retrieved_on) = &self.retrieved_on {
            map.serialize_entry("retrievedOn", &Timestamp(retrieved_on))?;
        }
        if !agent_is_empty(&self.retrieved_by) {
            map.serialize_entry("retrievedBy", &self.retrieved_by)?;
        }

        let history = path_strings(&self.history);
        if !history.is_empty() {
            map.serialize_entry("history", &history)?;
        }
        if !self.aggregates.is_empty() {
            let aggregates: Vec<&PathMetadata> = self.aggregates.values().collect();
            map.serialize_entry("aggregates", &aggregates)?;
        }
        if !self.annotations.is_empty() {
            map.serialize_entry("annotations", &self.annotations)?;
        }
        if !self.graph.is_empty() {
            map.serialize_entry("@graph", &self.graph)?;
        }
        map.end()
    }
}

/// Manifest document as read, before it is bound to a filesystem
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct RawManifest {
    pub(crate) id: Option<Locator>,
    #[serde(deserialize_with = "one_or_many")]
    pub(crate) manifest: Vec<String>,
    #[serde(deserialize_with = "one_or_many")]
    pub(crate) conforms_to: Vec<Locator>,
    pub(crate) created_on: Option<DateTime<Utc>>,
    pub(crate) created_by: Option<Agent>,
    pub(crate) authored_on: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "one_or_many")]
    pub(crate) authored_by: Vec<Agent>,
    pub(crate) retrieved_from: Option<Locator>,
    pub(crate) retrieved_on: Option<DateTime<Utc>>,
    pub(crate) retrieved_by: Option<Agent>,
    #[serde(deserialize_with = "one_or_many")]
    pub(crate) history: Vec<String>,
    pub(crate) aggregates: Vec<RawAggregate>,
    pub(crate) annotations: Vec<PathAnnotation>,
    #[serde(rename = "@graph")]
    pub(crate) graph: Vec<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct RawAggregate {
    pub(crate) uri: Option<Locator>,
    /// Older manifests name bundle files by path instead of `uri`
    pub(crate) file: Option<String>,
    pub(crate) mediatype: Option<String>,
    pub(crate) created_on: Option<DateTime<Utc>>,
    pub(crate) created_by: Option<Agent>,
    pub(crate) authored_on: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "one_or_many")]
    pub(crate) authored_by: Vec<Agent>,
    pub(crate) retrieved_from: Option<Locator>,
    pub(crate) retrieved_on: Option<DateTime<Utc>>,
    pub(crate) retrieved_by: Option<Agent>,
    pub(crate) conforms_to: Option<Locator>,
    pub(crate) proxy: Option<Locator>,
}
