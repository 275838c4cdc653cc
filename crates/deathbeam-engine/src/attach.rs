//! Who is attached to whom.
//!
//! Every parent owns one ordered chain of attached children. The first child
//! is towed by the parent itself; each later child is towed by the child
//! attached just before it, so a towing line forms a conga chain rather than
//! a star. Chains are doubly linked through [`Link::prev`] and [`Link::next`]:
//! unlinking a child re-anchors the one behind it to the one ahead (or to the
//! parent) in constant time.
//!
//! Mounted children ([`AttachMode::Mount`]) stay out of the chain: they ride
//! the parent directly and do not count toward [`AttachmentGraph::tow_count`].
//!
//! The graph only tracks links. Hooks, physics mode switches and gravity
//! scaling are sequenced by the simulation around [`AttachmentGraph::link`]
//! and [`AttachmentGraph::unlink`].

use std::collections::HashMap;

use deathbeam_ecs::entity::EntityId;
use serde::{Deserialize, Serialize};

/// Rejected attachment.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttachError {
    #[error("entity {entity} cannot attach to itself")]
    SelfAttach { entity: EntityId },

    #[error("attaching {child} to {parent} would form a cycle")]
    Cycle { child: EntityId, parent: EntityId },

    #[error("entity {entity} does not exist")]
    StaleEntity { entity: EntityId },

    #[error("entity {child} is already attached to {parent}")]
    AlreadyAttached { child: EntityId, parent: EntityId },
}

/// How a child hangs off its parent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachMode {
    /// Joins the tail of the parent's towing chain.
    #[default]
    Tow,
    /// Rides the parent directly, outside the chain.
    Mount,
}

/// A child's place in its parent's chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub parent: EntityId,
    pub mode: AttachMode,
    /// Towed child attached just before this one.
    pub prev: Option<EntityId>,
    /// Towed child attached just after this one.
    pub next: Option<EntityId>,
}

#[derive(Debug, Clone, Copy)]
struct Chain {
    head: EntityId,
    tail: EntityId,
    len: usize,
}

/// Result of removing a child from its chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unlinked {
    pub parent: EntityId,
    /// The child that was behind the removed one and now tows from its
    /// predecessor.
    pub relinked: Option<EntityId>,
}

/// Parent/child links with per-parent conga chains.
#[derive(Debug, Clone, Default)]
pub struct AttachmentGraph {
    links: HashMap<EntityId, Link>,
    chains: HashMap<EntityId, Chain>,
    mounts: HashMap<EntityId, Vec<EntityId>>,
}

impl AttachmentGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn link_of(&self, child: EntityId) -> Option<&Link> {
        self.links.get(&child)
    }

    pub fn parent_of(&self, child: EntityId) -> Option<EntityId> {
        self.links.get(&child).map(|link| link.parent)
    }

    pub fn is_attached(&self, child: EntityId) -> bool {
        self.links.contains_key(&child)
    }

    /// The entity `child` is physically towed by: its predecessor in the
    /// chain, or the parent for the first towed child and for mounts.
    pub fn tow_anchor(&self, child: EntityId) -> Option<EntityId> {
        self.links.get(&child).map(|link| link.prev.unwrap_or(link.parent))
    }

    pub fn mode_of(&self, child: EntityId) -> Option<AttachMode> {
        self.links.get(&child).map(|link| link.mode)
    }

    /// Number of children towed by `parent`. Mounts are not counted.
    pub fn tow_count(&self, parent: EntityId) -> usize {
        self.chains.get(&parent).map_or(0, |chain| chain.len)
    }

    /// Towed children of `parent` in chain order.
    pub fn towed(&self, parent: EntityId) -> Vec<EntityId> {
        let mut out = Vec::with_capacity(self.tow_count(parent));
        let mut cursor = self.chains.get(&parent).map(|chain| chain.head);
        while let Some(child) = cursor {
            out.push(child);
            cursor = self.links.get(&child).and_then(|link| link.next);
        }
        out
    }

    /// Mounted children of `parent` in attach order.
    pub fn mounted(&self, parent: EntityId) -> &[EntityId] {
        self.mounts.get(&parent).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every child of `parent`: the towing chain, then the mounts.
    pub fn children(&self, parent: EntityId) -> Vec<EntityId> {
        let mut out = self.towed(parent);
        out.extend_from_slice(self.mounted(parent));
        out
    }

    /// Whether attaching `child` to `parent` would make `child` its own
    /// ancestor.
    pub fn would_cycle(&self, child: EntityId, parent: EntityId) -> bool {
        let mut cursor = Some(parent);
        let mut steps = 0;
        while let Some(node) = cursor {
            if node == child {
                return true;
            }
            // A longer ancestry than there are links means a corrupt graph.
            steps += 1;
            if steps > self.links.len() + 1 {
                return true;
            }
            cursor = self.parent_of(node);
        }
        false
    }

    /// Append `child` to the tail of `parent`'s chain, or to its mounts.
    ///
    /// # Errors
    ///
    /// [`AttachError::SelfAttach`], [`AttachError::Cycle`], or
    /// [`AttachError::AlreadyAttached`] when `child` must be unlinked first.
    pub fn link(&mut self, child: EntityId, parent: EntityId, mode: AttachMode) -> Result<(), AttachError> {
        if child == parent {
            return Err(AttachError::SelfAttach { entity: child });
        }
        if let Some(existing) = self.parent_of(child) {
            return Err(AttachError::AlreadyAttached {
                child,
                parent: existing,
            });
        }
        if self.would_cycle(child, parent) {
            return Err(AttachError::Cycle { child, parent });
        }

        if mode == AttachMode::Mount {
            self.mounts.entry(parent).or_default().push(child);
            self.links.insert(
                child,
                Link {
                    parent,
                    mode,
                    prev: None,
                    next: None,
                },
            );
            return Ok(());
        }

        let prev = match self.chains.get_mut(&parent) {
            Some(chain) => {
                let prev = chain.tail;
                chain.tail = child;
                chain.len += 1;
                Some(prev)
            }
            None => {
                self.chains.insert(
                    parent,
                    Chain {
                        head: child,
                        tail: child,
                        len: 1,
                    },
                );
                None
            }
        };
        if let Some(prev) = prev {
            if let Some(link) = self.links.get_mut(&prev) {
                link.next = Some(child);
            }
        }
        self.links.insert(
            child,
            Link {
                parent,
                mode,
                prev,
                next: None,
            },
        );
        Ok(())
    }

    /// Take `child` out of its chain. `None` if it was not attached.
    pub fn unlink(&mut self, child: EntityId) -> Option<Unlinked> {
        let link = self.links.remove(&child)?;

        if link.mode == AttachMode::Mount {
            if let Some(riders) = self.mounts.get_mut(&link.parent) {
                riders.retain(|&rider| rider != child);
                if riders.is_empty() {
                    self.mounts.remove(&link.parent);
                }
            }
            return Some(Unlinked {
                parent: link.parent,
                relinked: None,
            });
        }

        if let Some(prev) = link.prev {
            if let Some(prev_link) = self.links.get_mut(&prev) {
                prev_link.next = link.next;
            }
        }
        if let Some(next) = link.next {
            if let Some(next_link) = self.links.get_mut(&next) {
                next_link.prev = link.prev;
            }
        }

        let mut emptied = false;
        if let Some(chain) = self.chains.get_mut(&link.parent) {
            if chain.head == child {
                if let Some(next) = link.next {
                    chain.head = next;
                }
            }
            if chain.tail == child {
                if let Some(prev) = link.prev {
                    chain.tail = prev;
                }
            }
            chain.len -= 1;
            emptied = chain.len == 0;
        }
        if emptied {
            self.chains.remove(&link.parent);
        }

        Some(Unlinked {
            parent: link.parent,
            relinked: link.next,
        })
    }

    /// Every `(child, parent)` pair, ordered by child id.
    pub fn pairs(&self) -> Vec<(EntityId, EntityId)> {
        let mut pairs: Vec<_> = self.links.iter().map(|(&child, link)| (child, link.parent)).collect();
        pairs.sort_unstable();
        pairs
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn ids<const N: usize>() -> [EntityId; N] {
        std::array::from_fn(|i| EntityId::new(i as u32, 0))
    }

    // -- 1. Chain building --------------------------------------------------

    #[test]
    fn first_link_on_empty_graph_succeeds() {
        let [parent, a] = ids();
        let mut graph = AttachmentGraph::new();
        assert!(!graph.would_cycle(a, parent));
        assert_eq!(graph.link(a, parent, AttachMode::Tow), Ok(()));
        assert_eq!(graph.parent_of(a), Some(parent));
        assert_eq!(graph.tow_anchor(a), Some(parent));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn long_chain_of_parents_is_not_a_cycle() {
        let chain: [EntityId; 6] = ids();
        let mut graph = AttachmentGraph::new();
        for pair in chain.windows(2) {
            graph.link(pair[1], pair[0], AttachMode::Tow).unwrap();
        }
        let [.., outsider] = ids::<7>();
        assert!(!graph.would_cycle(outsider, chain[5]));
        assert!(graph.would_cycle(chain[0], chain[5]));
    }

    #[test]
    fn second_child_tows_from_first() {
        let [parent, a, c] = ids();
        let mut graph = AttachmentGraph::new();
        graph.link(a, parent, AttachMode::Tow).unwrap();
        graph.link(c, parent, AttachMode::Tow).unwrap();

        assert_eq!(graph.tow_anchor(a), Some(parent));
        assert_eq!(graph.tow_anchor(c), Some(a));
        assert_eq!(graph.parent_of(c), Some(parent));
        assert_eq!(graph.children(parent), vec![a, c]);
        assert_eq!(graph.tow_count(parent), 2);
    }

    #[test]
    fn self_attach_and_double_link_are_rejected() {
        let [parent, a] = ids();
        let mut graph = AttachmentGraph::new();
        assert_eq!(graph.link(a, a, AttachMode::Tow), Err(AttachError::SelfAttach { entity: a }));
        graph.link(a, parent, AttachMode::Tow).unwrap();
        assert_eq!(
            graph.link(a, parent, AttachMode::Mount),
            Err(AttachError::AlreadyAttached { child: a, parent })
        );
    }

    #[test]
    fn cycles_are_rejected() {
        let [a, b, c] = ids();
        let mut graph = AttachmentGraph::new();
        graph.link(b, a, AttachMode::Tow).unwrap();
        graph.link(c, b, AttachMode::Tow).unwrap();
        assert_eq!(graph.link(a, c, AttachMode::Tow), Err(AttachError::Cycle { child: a, parent: c }));
        assert!(!graph.is_attached(a));
    }

    #[test]
    fn mounts_ride_the_parent_outside_the_chain() {
        let [parent, towed, rider] = ids();
        let mut graph = AttachmentGraph::new();
        graph.link(towed, parent, AttachMode::Tow).unwrap();
        graph.link(rider, parent, AttachMode::Mount).unwrap();

        assert_eq!(graph.tow_anchor(rider), Some(parent));
        assert_eq!(graph.mode_of(rider), Some(AttachMode::Mount));
        assert_eq!(graph.tow_count(parent), 1);
        assert_eq!(graph.towed(parent), vec![towed]);
        assert_eq!(graph.children(parent), vec![towed, rider]);

        // A later towed child still chains behind the towed one.
        let [.., late] = ids::<4>();
        graph.link(late, parent, AttachMode::Tow).unwrap();
        assert_eq!(graph.tow_anchor(late), Some(towed));

        let unlinked = graph.unlink(rider).unwrap();
        assert_eq!(unlinked.relinked, None);
        assert!(graph.mounted(parent).is_empty());
        assert_eq!(graph.tow_count(parent), 2);
    }

    // -- 2. Relinking -------------------------------------------------------

    #[test]
    fn unlinking_head_reanchors_next_to_parent() {
        let [parent, a, c] = ids();
        let mut graph = AttachmentGraph::new();
        graph.link(a, parent, AttachMode::Tow).unwrap();
        graph.link(c, parent, AttachMode::Tow).unwrap();

        let unlinked = graph.unlink(a).unwrap();
        assert_eq!(unlinked.parent, parent);
        assert_eq!(unlinked.relinked, Some(c));
        assert_eq!(graph.tow_anchor(c), Some(parent));
        assert_eq!(graph.children(parent), vec![c]);
    }

    #[test]
    fn unlinking_interior_link_joins_neighbours() {
        let [parent, a, b, c] = ids();
        let mut graph = AttachmentGraph::new();
        for child in [a, b, c] {
            graph.link(child, parent, AttachMode::Tow).unwrap();
        }

        graph.unlink(b).unwrap();
        assert_eq!(graph.tow_anchor(c), Some(a));
        assert_eq!(graph.children(parent), vec![a, c]);

        // New children still append behind the tail.
        let [.., d] = ids::<5>();
        graph.link(d, parent, AttachMode::Tow).unwrap();
        assert_eq!(graph.tow_anchor(d), Some(c));
    }

    #[test]
    fn unlinking_last_child_drops_the_chain() {
        let [parent, a] = ids();
        let mut graph = AttachmentGraph::new();
        graph.link(a, parent, AttachMode::Tow).unwrap();
        assert_eq!(graph.unlink(a).map(|u| u.relinked), Some(None));
        assert_eq!(graph.tow_count(parent), 0);
        assert!(graph.children(parent).is_empty());
        assert!(graph.is_empty());
    }

    #[test]
    fn unlinking_unattached_child_is_none() {
        let [a] = ids();
        let mut graph = AttachmentGraph::new();
        assert_eq!(graph.unlink(a), None);
    }
}
