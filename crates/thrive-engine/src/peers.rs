//! Peer-group assignment.
//!
//! Standardization is relative to a peer group, so the grouping strategy is
//! a seam: the default assigns every region to its own singleton group
//! (each region is its own benchmark), and a config-driven table strategy
//! lets several regions share a comparison pool. Strategies are pure
//! functions of the region list; they cannot fail.

use std::collections::BTreeMap;

use thrive_types::PeerAssignment;

// ---------------------------------------------------------------------------
// PeerStrategy
// ---------------------------------------------------------------------------

pub trait PeerStrategy: Send + Sync {
    fn name(&self) -> &str;
    fn assign(&self, region_ids: &[String]) -> Vec<PeerAssignment>;
}

// ---------------------------------------------------------------------------
// IdentityPeers
// ---------------------------------------------------------------------------

/// Every region forms its own singleton peer group.
pub struct IdentityPeers;

impl PeerStrategy for IdentityPeers {
    fn name(&self) -> &str {
        "identity"
    }

    fn assign(&self, region_ids: &[String]) -> Vec<PeerAssignment> {
        region_ids
            .iter()
            .map(|id| PeerAssignment::identity(id))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// TablePeers
// ---------------------------------------------------------------------------

/// Explicit region → group table; unlisted regions fall back to identity.
pub struct TablePeers {
    table: BTreeMap<String, String>,
}

impl TablePeers {
    pub fn new(table: BTreeMap<String, String>) -> Self {
        Self { table }
    }
}

impl PeerStrategy for TablePeers {
    fn name(&self) -> &str {
        "table"
    }

    fn assign(&self, region_ids: &[String]) -> Vec<PeerAssignment> {
        region_ids
            .iter()
            .map(|id| match self.table.get(id) {
                Some(group) => PeerAssignment {
                    region_id: id.clone(),
                    peer_group: group.clone(),
                },
                None => PeerAssignment::identity(id),
            })
            .collect()
    }
}

/// Pick the strategy the config calls for: an explicit peer table when one
/// is present, identity otherwise.
pub fn from_config(peers: &BTreeMap<String, String>) -> Box<dyn PeerStrategy> {
    if peers.is_empty() {
        Box::new(IdentityPeers)
    } else {
        Box::new(TablePeers::new(peers.clone()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn identity_assigns_each_region_to_itself() {
        let assignments = IdentityPeers.assign(&ids(&["river", "gulf"]));
        assert_eq!(assignments.len(), 2);
        assert_eq!(assignments[0].region_id, "river");
        assert_eq!(assignments[0].peer_group, "river");
        assert_eq!(assignments[1].peer_group, "gulf");
    }

    #[test]
    fn table_groups_listed_regions() {
        let table = BTreeMap::from([
            ("river".to_string(), "small_metro".to_string()),
            ("gulf".to_string(), "small_metro".to_string()),
        ]);
        let assignments = TablePeers::new(table).assign(&ids(&["river", "gulf", "plains"]));
        assert_eq!(assignments[0].peer_group, "small_metro");
        assert_eq!(assignments[1].peer_group, "small_metro");
        // Unlisted region falls back to a singleton group.
        assert_eq!(assignments[2].peer_group, "plains");
    }

    #[test]
    fn from_config_picks_identity_for_empty_table() {
        let strategy = from_config(&BTreeMap::new());
        assert_eq!(strategy.name(), "identity");

        let table = BTreeMap::from([("a".to_string(), "g".to_string())]);
        let strategy = from_config(&table);
        assert_eq!(strategy.name(), "table");
    }

    #[test]
    fn assignment_preserves_region_order() {
        let assignments = IdentityPeers.assign(&ids(&["z", "a", "m"]));
        let order: Vec<&str> = assignments.iter().map(|a| a.region_id.as_str()).collect();
        assert_eq!(order, vec!["z", "a", "m"]);
    }
}
