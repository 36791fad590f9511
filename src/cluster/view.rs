//! Cluster membership view
//!
//! A view is the ordered, deduplicated list of live member ids, stamped with
//! an epoch that increases on every membership change. Members are ordered by
//! join time, so the coordinator (first element) is a pure function of the
//! view and every member that holds the same view agrees on it.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterView {
    pub epoch: u64,
    pub members: Vec<String>,
}

impl ClusterView {
    pub fn new(epoch: u64, members: Vec<String>) -> Self {
        Self { epoch, members }
    }

    pub fn size(&self) -> usize {
        self.members.len()
    }

    /// The coordinator is the first member by join order.
    pub fn coordinator(&self) -> Option<&str> {
        self.members.first().map(|s| s.as_str())
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.members.iter().any(|m| m == node_id)
    }

    /// Acknowledgements expected for a mutation originated by a member of
    /// this view: every other current member.
    pub fn expected_acks(&self) -> usize {
        self.members.len().saturating_sub(1)
    }
}

impl std::fmt::Display for ClusterView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}|{}] {:?}", self.epoch, self.members.len(), self.members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinator_is_first_member() {
        let view = ClusterView::new(3, vec!["n1".into(), "n2".into(), "n3".into()]);
        assert_eq!(view.coordinator(), Some("n1"));
        assert_eq!(view.size(), 3);
        assert_eq!(view.expected_acks(), 2);
    }

    #[test]
    fn test_empty_view() {
        let view = ClusterView::new(0, vec![]);
        assert_eq!(view.coordinator(), None);
        assert_eq!(view.expected_acks(), 0);
    }

    #[test]
    fn test_single_member_expects_no_acks() {
        let view = ClusterView::new(1, vec!["n1".into()]);
        assert_eq!(view.expected_acks(), 0);
        assert!(view.contains("n1"));
        assert!(!view.contains("n2"));
    }
}
