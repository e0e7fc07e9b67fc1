//! Kafka bootstrap address resolution
//!
//! Strimzi has reported `status.listeners` in several shapes over time:
//!
//! - `v1beta1`: entries keyed only by `type` (`plain`, `tls`, `external`)
//! - early `v1beta2`: entries with a `type` but no `name`; the requested
//!   listener name is mapped to its type through `spec.kafka.listeners`
//! - current `v1beta2`: entries with both `name` and `type`
//!
//! Newer releases also publish `bootstrapServers` on each entry, which is
//! used verbatim; otherwise the first element of `addresses` is formatted as
//! `host:port`. The resolver accepts all of these without being told which
//! one it is looking at.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use ssr_common::Error;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawListenerStatus {
    name: Option<String>,
    #[serde(rename = "type")]
    type_: Option<String>,
    bootstrap_servers: Option<String>,
    addresses: Vec<RawAddress>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawAddress {
    host: Option<String>,
    port: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawListenerSpec {
    name: String,
    #[serde(rename = "type")]
    type_: String,
}

/// Where a listener can be reached
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListenerEndpoint {
    /// `bootstrapServers` as published by Strimzi
    Bootstrap(String),
    /// First advertised address
    Address {
        /// Host name
        host: String,
        /// Port
        port: u16,
    },
}

impl std::fmt::Display for ListenerEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerEndpoint::Bootstrap(servers) => f.write_str(servers),
            ListenerEndpoint::Address { host, port } => write!(f, "{}:{}", host, port),
        }
    }
}

/// One usable entry of `status.listeners`
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListenerStatus {
    /// Entry carrying its listener name
    Named {
        /// Listener name
        name: String,
        /// Listener type, if reported
        type_: Option<String>,
        /// Endpoint
        endpoint: ListenerEndpoint,
    },
    /// Entry identified only by type
    Typed {
        /// Listener type
        type_: String,
        /// Endpoint
        endpoint: ListenerEndpoint,
    },
}

impl ListenerStatus {
    /// Reachable endpoint of this listener
    pub fn endpoint(&self) -> &ListenerEndpoint {
        match self {
            ListenerStatus::Named { endpoint, .. } | ListenerStatus::Typed { endpoint, .. } => {
                endpoint
            }
        }
    }

    /// Whether this entry is the requested listener.
    ///
    /// `mapped_type` is the type `spec.kafka.listeners` declares for the
    /// requested name, if any.
    fn matches(&self, requested: &str, mapped_type: Option<&str>) -> bool {
        match self {
            ListenerStatus::Named { name, .. } => name == requested,
            ListenerStatus::Typed { type_, .. } => {
                type_ == requested || mapped_type.is_some_and(|t| t == type_)
            }
        }
    }
}

fn parse_port(port: &Value) -> Option<u16> {
    match port {
        Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

impl RawListenerStatus {
    fn endpoint(&self) -> Option<ListenerEndpoint> {
        if let Some(servers) = &self.bootstrap_servers {
            return Some(ListenerEndpoint::Bootstrap(servers.clone()));
        }
        let first = self.addresses.first()?;
        Some(ListenerEndpoint::Address {
            host: first.host.clone()?,
            port: parse_port(first.port.as_ref()?)?,
        })
    }

    /// Name, or type for unnamed entries; used in error reports
    fn label(&self) -> Option<&str> {
        self.name.as_deref().or(self.type_.as_deref())
    }

    fn into_status(self) -> Option<ListenerStatus> {
        let endpoint = self.endpoint()?;
        match (self.name, self.type_) {
            (Some(name), type_) => Some(ListenerStatus::Named {
                name,
                type_,
                endpoint,
            }),
            (None, Some(type_)) => Some(ListenerStatus::Typed { type_, endpoint }),
            (None, None) => None,
        }
    }
}

/// Readable object entries of `status.listeners`, endpoint or not.
///
/// Returns `TemporaryUpstream` when the Kafka has no listener status yet.
fn listener_entries(kafka: &Value) -> Result<Vec<RawListenerStatus>, Error> {
    let entries = kafka
        .pointer("/status/listeners")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::temporary_upstream("Kafka has no status.listeners yet"))?;

    Ok(entries
        .iter()
        .filter_map(|entry| match RawListenerStatus::deserialize(entry) {
            Ok(raw) => Some(raw),
            Err(e) => {
                debug!(error = %e, "skipping unreadable listener status");
                None
            }
        })
        .collect())
}

/// Map of listener name to type from `spec.kafka.listeners`.
///
/// Only the list form (`v1beta2`) carries names; the `v1beta1` object form
/// yields an empty map.
pub fn listener_types(kafka: &Value) -> HashMap<String, String> {
    kafka
        .pointer("/spec/kafka/listeners")
        .and_then(Value::as_array)
        .map(|listeners| {
            listeners
                .iter()
                .filter_map(|l| RawListenerSpec::deserialize(l).ok())
                .map(|l| (l.name, l.type_))
                .collect()
        })
        .unwrap_or_default()
}

/// Resolve the `host:port` bootstrap address of a named listener.
///
/// The first matching status entry wins. Nothing matching yields the
/// retryable `ListenerNotFound`, listing every listener the status did
/// contain, including those without an address yet.
pub fn resolve_bootstrap_server(kafka: &Value, listener: &str) -> Result<String, Error> {
    let types = listener_types(kafka);
    let mapped_type = types.get(listener).map(String::as_str);
    let entries = listener_entries(kafka)?;
    let available: Vec<String> = entries
        .iter()
        .filter_map(RawListenerStatus::label)
        .map(str::to_string)
        .collect();

    entries
        .into_iter()
        .filter_map(RawListenerStatus::into_status)
        .find(|status| status.matches(listener, mapped_type))
        .map(|status| status.endpoint().to_string())
        .ok_or_else(|| Error::ListenerNotFound {
            listener: listener.to_string(),
            available,
        })
}
