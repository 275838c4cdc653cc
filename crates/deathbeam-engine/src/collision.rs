//! Actor-vs-actor contact detection.
//!
//! [`find_contacts`] scans the partners an entity is interested in and
//! returns the overlapping ones, together with whether the partner wants to
//! hear about it. Candidates come from the per-type index when the entity
//! declares an allow-list, otherwise from every live entity in spawn order.
//!
//! [`PairSet`] remembers which unordered pairs were already notified during
//! the current tick, so a contact seen again from the partner's own step is
//! not delivered twice.

use std::collections::HashSet;

use deathbeam_ecs::entity::EntityId;
use deathbeam_ecs::registry::EntityRegistry;

use crate::actor::{ActorFilter, Entity};

/// One overlapping partner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Contact {
    pub other: EntityId,
    /// The partner's own filter accepts the scanning entity.
    pub notify_other: bool,
}

/// Overlapping partners of `id`, in candidate order.
///
/// Returns nothing when `id` is gone or has actor collision switched off.
/// Partners with collision switched off are skipped.
pub fn find_contacts(entities: &EntityRegistry<Entity>, id: EntityId) -> Vec<Contact> {
    let Some(me) = entities.get(id) else {
        return Vec::new();
    };
    let filter = &me.descriptor.collide_with_actors;
    if !filter.enabled() {
        return Vec::new();
    }
    let my_tag = me.descriptor.type_tag;

    let candidates: Vec<EntityId> = match filter {
        ActorFilter::Only(tags) => tags.iter().flat_map(|&tag| entities.by_type(tag).iter().copied()).collect(),
        _ => entities.ids().to_vec(),
    };

    candidates
        .into_iter()
        .filter(|&other| other != id)
        .filter_map(|other| {
            let partner = entities.get(other)?;
            let theirs = &partner.descriptor.collide_with_actors;
            if !theirs.enabled() || !me.body.overlaps(&partner.body) {
                return None;
            }
            Some(Contact {
                other,
                notify_other: theirs.accepts(my_tag),
            })
        })
        .collect()
}

/// Unordered entity pairs already handled this tick.
#[derive(Debug, Default)]
pub struct PairSet {
    seen: HashSet<(EntityId, EntityId)>,
}

impl PairSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the pair. Returns `false` if it was already recorded.
    pub fn insert(&mut self, a: EntityId, b: EntityId) -> bool {
        let key = if a <= b { (a, b) } else { (b, a) };
        self.seen.insert(key)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::ActorDescriptor;
    use deathbeam_ecs::registry::TypeTag;

    const PLAYER: TypeTag = TypeTag(1);
    const CIVILIAN: TypeTag = TypeTag(2);
    const ROCK: TypeTag = TypeTag(3);

    fn spawn(reg: &mut EntityRegistry<Entity>, descriptor: ActorDescriptor, x: f64, y: f64) -> EntityId {
        reg.spawn(descriptor.type_tag, Entity::new(descriptor, x, y, 0.0))
    }

    #[test]
    fn unrestricted_entity_sees_every_overlap() {
        let mut reg = EntityRegistry::new();
        let me = spawn(&mut reg, ActorDescriptor::tagged(PLAYER), 0.0, 0.0);
        let near = spawn(&mut reg, ActorDescriptor::tagged(ROCK), 2.0, 2.0);
        let _far = spawn(&mut reg, ActorDescriptor::tagged(ROCK), 20.0, 0.0);

        assert_eq!(
            find_contacts(&reg, me),
            vec![Contact {
                other: near,
                notify_other: true
            }]
        );
    }

    #[test]
    fn allow_list_restricts_candidates() {
        let mut reg = EntityRegistry::new();
        let civ = spawn(
            &mut reg,
            ActorDescriptor::tagged(CIVILIAN).with_filter(ActorFilter::Only(vec![PLAYER])),
            0.0,
            0.0,
        );
        let player = spawn(&mut reg, ActorDescriptor::tagged(PLAYER), 1.0, 0.0);
        let _rock = spawn(&mut reg, ActorDescriptor::tagged(ROCK), 1.0, 0.0);

        let contacts = find_contacts(&reg, civ);
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].other, player);
    }

    #[test]
    fn partner_excluding_self_is_not_notified() {
        let mut reg = EntityRegistry::new();
        let rock = spawn(&mut reg, ActorDescriptor::tagged(ROCK), 0.0, 0.0);
        let civ = spawn(
            &mut reg,
            ActorDescriptor::tagged(CIVILIAN).with_filter(ActorFilter::Only(vec![PLAYER])),
            1.0,
            1.0,
        );

        assert_eq!(
            find_contacts(&reg, rock),
            vec![Contact {
                other: civ,
                notify_other: false
            }]
        );
    }

    #[test]
    fn disabled_collision_on_either_side_yields_nothing() {
        let mut reg = EntityRegistry::new();
        let ghost = spawn(
            &mut reg,
            ActorDescriptor::tagged(ROCK).with_filter(ActorFilter::None),
            0.0,
            0.0,
        );
        let rock = spawn(&mut reg, ActorDescriptor::tagged(ROCK), 0.0, 0.0);
        assert!(find_contacts(&reg, ghost).is_empty());
        assert!(find_contacts(&reg, rock).is_empty());
    }

    #[test]
    fn pair_set_is_unordered() {
        let a = EntityId::new(0, 0);
        let b = EntityId::new(1, 0);
        let mut pairs = PairSet::new();
        assert!(pairs.insert(b, a));
        assert!(!pairs.insert(a, b));
        pairs.clear();
        assert!(pairs.insert(a, b));
    }
}
