//! Key shapes and path parsing shared by the models.
//!
//! Key schema (all rooted at the store namespace):
//!
//! ```text
//! <ns>/node/<hostname>/meta                      NodeMeta
//! <ns>/node/<hostname>/status                    NodeStatus
//! <ns>/node/<hostname>/pod/<self_link>           PodNodeSpec
//! <ns>/manifest/node/<hostname>/pod/<self_link>  PodManifest
//! <ns>/manifest/node/<hostname>/volume/<link>    VolumeManifest
//! <ns>/manifest/endpoint/<name>                  EndpointManifest
//! <ns>/manifest/subnet/<encoded-cidr>            NetworkState
//! ```

use stevedore_store::keys::segments;

pub const NODE: &str = "node";
pub const MANIFEST: &str = "manifest";
pub const POD: &str = "pod";
pub const VOLUME: &str = "volume";
pub const ENDPOINT: &str = "endpoint";
pub const SUBNET: &str = "subnet";
pub const META: &str = "meta";
pub const STATUS: &str = "status";

/// Identity parsed out of an event's key path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventScope {
    pub name: String,
    pub node: Option<String>,
    pub self_link: String,
}

/// Parse `<ns>/manifest/node/<host>/<kind>/<self_link>`.
pub fn parse_node_scoped(key: &str, kind: &str) -> Option<EventScope> {
    let segs = segments(key);
    let n = segs.len();
    if n < 5 || segs[n - 5] != MANIFEST || segs[n - 4] != NODE || segs[n - 2] != kind {
        return None;
    }
    Some(EventScope {
        name: segs[n - 1].to_string(),
        node: Some(segs[n - 3].to_string()),
        self_link: segs[n - 1].to_string(),
    })
}

/// Parse `<ns>/manifest/<kind>/<name>`.
pub fn parse_named(key: &str, kind: &str) -> Option<EventScope> {
    let segs = segments(key);
    let n = segs.len();
    if n < 3 || segs[n - 3] != MANIFEST || segs[n - 2] != kind {
        return None;
    }
    Some(EventScope {
        name: segs[n - 1].to_string(),
        node: None,
        self_link: segs[n - 1].to_string(),
    })
}

/// Parse `<ns>/node/<hostname>/status`.
pub fn parse_node_status(key: &str) -> Option<EventScope> {
    let segs = segments(key);
    let n = segs.len();
    if n < 3 || segs[n - 3] != NODE || segs[n - 1] != STATUS {
        return None;
    }
    Some(EventScope {
        name: segs[n - 2].to_string(),
        node: Some(segs[n - 2].to_string()),
        self_link: segs[n - 2].to_string(),
    })
}

/// CIDRs contain `/`, which collides with the key delimiter; encode the
/// prefix length with `-` inside the key segment.
pub fn encode_cidr(cidr: &str) -> String {
    cidr.replace('/', "-")
}

pub fn decode_cidr(segment: &str) -> String {
    match segment.rsplit_once('-') {
        Some((addr, len)) => format!("{addr}/{len}"),
        None => segment.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_scoped_keys_parse() {
        let scope = parse_node_scoped("cluster/manifest/node/h1/pod/p1", POD).unwrap();
        assert_eq!(scope.node.as_deref(), Some("h1"));
        assert_eq!(scope.self_link, "p1");

        // Wrong kind or shape yields nothing.
        assert!(parse_node_scoped("cluster/manifest/node/h1/volume/v1", POD).is_none());
        assert!(parse_node_scoped("cluster/node/h1/meta", POD).is_none());
    }

    #[test]
    fn named_keys_parse() {
        let scope = parse_named("cluster/manifest/endpoint/web", ENDPOINT).unwrap();
        assert_eq!(scope.name, "web");
        assert!(scope.node.is_none());

        assert!(parse_named("cluster/manifest/subnet/10.0.0.0-24", ENDPOINT).is_none());
    }

    #[test]
    fn node_status_keys_parse() {
        let scope = parse_node_status("cluster/node/h1/status").unwrap();
        assert_eq!(scope.name, "h1");
        assert!(parse_node_status("cluster/node/h1/meta").is_none());
        assert!(parse_node_status("cluster/node/h1/pod/p1").is_none());
    }

    #[test]
    fn cidr_round_trips_through_key_segment() {
        assert_eq!(encode_cidr("10.0.0.0/24"), "10.0.0.0-24");
        assert_eq!(decode_cidr("10.0.0.0-24"), "10.0.0.0/24");
        assert_eq!(decode_cidr("plain"), "plain");
    }
}
