//! Deterministic hierarchical key construction.
//!
//! All keys are slash-delimited and rooted at a namespace:
//! `<namespace>/node/<hostname>/meta`, `<namespace>/subnet/<cidr>`, ...

/// Builds store keys under a fixed namespace.
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    namespace: String,
}

impl KeyBuilder {
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Join the namespace and the given path parts into a key.
    pub fn key(&self, parts: &[&str]) -> String {
        let mut out = self.namespace.clone();
        for part in parts {
            out.push('/');
            out.push_str(part);
        }
        out
    }
}

/// Split a key into its path segments.
pub fn segments(key: &str) -> Vec<&str> {
    key.split('/').filter(|s| !s.is_empty()).collect()
}

/// Whether `key` lies under `prefix`, respecting segment boundaries
/// (`a/b` is under `a`, `a/bc` is not).
pub fn under_prefix(key: &str, prefix: &str) -> bool {
    match key.strip_prefix(prefix) {
        Some("") => true,
        Some(rest) => rest.starts_with('/'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_joins_parts() {
        let kb = KeyBuilder::new("cluster");
        assert_eq!(kb.key(&["node", "host-1", "meta"]), "cluster/node/host-1/meta");
        assert_eq!(kb.key(&[]), "cluster");
    }

    #[test]
    fn segments_split() {
        assert_eq!(
            segments("cluster/node/host-1/meta"),
            vec!["cluster", "node", "host-1", "meta"]
        );
    }

    #[test]
    fn prefix_respects_segment_boundaries() {
        assert!(under_prefix("cluster/node/h/meta", "cluster/node"));
        assert!(under_prefix("cluster/node", "cluster/node"));
        assert!(!under_prefix("cluster/nodes/h", "cluster/node"));
        assert!(!under_prefix("other/node/h", "cluster/node"));
    }
}
