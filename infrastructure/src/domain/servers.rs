//! Server discovery labels.
//!
//! Servers are published as flat `org.eclipse.che.server.<name>.<field>`
//! entries on container labels (Docker) or service annotations (Kubernetes).
//! Consumers rebuild the server map from those entries.

use std::collections::BTreeMap;

use crate::domain::environment::ServerConfig;

const SERVER_PREFIX: &str = "org.eclipse.che.server.";

const PORT: &str = "port";
const PROTOCOL: &str = "protocol";
const PATH: &str = "path";
const ATTRIBUTES: &str = "attributes";

/// Annotation naming the server a gateway route leads to.
pub const GATEWAY_TARGET_ANNOTATION: &str = "org.eclipse.che.gateway.target";

/// Key of a single server field.
#[must_use]
pub fn server_key(server: &str, field: &str) -> String {
    format!("{SERVER_PREFIX}{server}.{field}")
}

/// Flat entries describing `server`.
///
/// # Errors
///
/// Returns an error if the attribute map cannot be encoded as JSON.
pub fn server_labels(
    name: &str,
    server: &ServerConfig,
) -> Result<BTreeMap<String, String>, serde_json::Error> {
    let mut labels = BTreeMap::new();
    labels.insert(server_key(name, PORT), server.port.clone());
    if let Some(protocol) = &server.protocol {
        labels.insert(server_key(name, PROTOCOL), protocol.clone());
    }
    if let Some(path) = &server.path {
        labels.insert(server_key(name, PATH), path.clone());
    }
    if !server.attributes.is_empty() {
        labels.insert(
            server_key(name, ATTRIBUTES),
            serde_json::to_string(&server.attributes)?,
        );
    }
    Ok(labels)
}

/// Rebuild servers from labels. Entries outside the server namespace are
/// ignored, as are servers without a port.
#[must_use]
pub fn servers_from_labels(labels: &BTreeMap<String, String>) -> BTreeMap<String, ServerConfig> {
    let mut servers: BTreeMap<String, ServerConfig> = BTreeMap::new();
    for (key, value) in labels {
        let Some(rest) = key.strip_prefix(SERVER_PREFIX) else {
            continue;
        };
        let Some((name, field)) = rest.rsplit_once('.') else {
            continue;
        };
        let server = servers.entry(name.to_string()).or_default();
        match field {
            PORT => server.port.clone_from(value),
            PROTOCOL => server.protocol = Some(value.clone()),
            PATH => server.path = Some(value.clone()),
            ATTRIBUTES => {
                if let Ok(attributes) = serde_json::from_str(value) {
                    server.attributes = attributes;
                } else {
                    tracing::warn!(server = name, "ignoring malformed server attributes label");
                }
            }
            _ => {}
        }
    }
    servers.retain(|_, server| !server.port.is_empty());
    servers
}
