use rand::{thread_rng, Rng};

use crate::error::VkError;
use crate::hash::{Slot, SLOT_COUNT};

/// The node identities owning one slot (or a whole slot-set query), as
/// resolved by [`SlotMap::lookup`]/[`SlotMap::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardNodeIds {
    pub primary: String,
    pub replicas: Vec<String>,
}

/// A dense 16384-entry routing table mapping slot to owning shard (spec
/// §4.5, "slot map"). `update` replaces the table wholesale from a fresh
/// topology; there is no incremental patching.
pub struct SlotMap {
    owners: Vec<Option<usize>>,
    shards: Vec<ShardNodeIds>,
}

impl SlotMap {
    pub fn empty() -> Self {
        Self {
            owners: vec![None; SLOT_COUNT as usize],
            shards: Vec::new(),
        }
    }

    /// Rebuilds the table from `shards`, each given as `(slot ranges,
    /// primary id, replica ids)`.
    pub fn update(&mut self, shards: Vec<(Vec<std::ops::RangeInclusive<u16>>, ShardNodeIds)>) {
        let mut owners = vec![None; SLOT_COUNT as usize];
        let mut table = Vec::with_capacity(shards.len());
        for (index, (ranges, nodes)) in shards.into_iter().enumerate() {
            for range in ranges {
                for slot in range {
                    owners[slot as usize] = Some(index);
                }
            }
            table.push(nodes);
        }
        self.owners = owners;
        self.shards = table;
    }

    pub fn lookup(&self, slot: Slot) -> Option<&ShardNodeIds> {
        let index = slot.get();
        if index >= SLOT_COUNT {
            return None;
        }
        self.owners[index as usize].map(|i| &self.shards[i])
    }

    /// Resolves a multi-key operation's slot set to the single shard that
    /// owns all of them, per spec §4.5: an empty set routes to a random
    /// live shard (or `ClusterHasNoNodes` if there are none), a single
    /// shard's keys resolve normally, keys spanning more than one shard
    /// fail with `KeysInCommandRequireMultipleNodes` (the cluster layer's
    /// own `CrossSlot` is a distinct, earlier-stage error for keys that
    /// straddle shards at key-parse time, spec §4.6), and an unassigned
    /// slot fails with `ClusterIsMissingSlotAssignment`.
    pub fn resolve(&self, slots: &[Slot]) -> Result<&ShardNodeIds, VkError> {
        if slots.is_empty() {
            if self.shards.is_empty() {
                return Err(VkError::ClusterHasNoNodes);
            }
            let index = thread_rng().gen_range(0..self.shards.len());
            return Ok(&self.shards[index]);
        }
        let mut owner: Option<usize> = None;
        for slot in slots {
            let index = slot.get();
            if index >= SLOT_COUNT {
                return Err(VkError::ClusterIsMissingSlotAssignment(index));
            }
            let this_owner = self.owners[index as usize]
                .ok_or(VkError::ClusterIsMissingSlotAssignment(index))?;
            match owner {
                None => owner = Some(this_owner),
                Some(o) if o == this_owner => {}
                Some(_) => return Err(VkError::KeysInCommandRequireMultipleNodes),
            }
        }
        Ok(&self.shards[owner.expect("non-empty slots always assign an owner")])
    }

    /// Returns a copy of this table with `slot` reassigned to `node`,
    /// without touching anything else — the targeted patch a `MOVED`
    /// redirect applies (spec §6, scenario 6), as opposed to `update`'s
    /// wholesale rebuild from a fresh topology.
    ///
    /// If `node` doesn't already own a shard here, it is appended as a new
    /// single-node shard; this only matters until the next topology
    /// refresh folds it back into the real table.
    pub fn with_reassigned_slot(&self, slot: Slot, node: ShardNodeIds) -> Self {
        let mut owners = self.owners.clone();
        let mut shards = self.shards.clone();
        let index = match shards.iter().position(|s| s.primary == node.primary) {
            Some(index) => index,
            None => {
                shards.push(node);
                shards.len() - 1
            }
        };
        owners[slot.get() as usize] = Some(index);
        Self { owners, shards }
    }
}

impl Default for SlotMap {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(primary: &str) -> ShardNodeIds {
        ShardNodeIds {
            primary: primary.into(),
            replicas: vec![],
        }
    }

    #[test]
    fn lookup_before_update_is_unassigned() {
        let map = SlotMap::empty();
        assert_eq!(map.lookup(Slot::new(0)), None);
    }

    #[test]
    fn lookup_after_update_resolves_owner() {
        let mut map = SlotMap::empty();
        map.update(vec![
            (vec![0..=100], nodes("a")),
            (vec![101..=16383], nodes("b")),
        ]);
        assert_eq!(map.lookup(Slot::new(50)).map(|n| n.primary.as_str()), Some("a"));
        assert_eq!(map.lookup(Slot::new(200)).map(|n| n.primary.as_str()), Some("b"));
    }

    #[test]
    fn resolve_empty_slot_set_with_no_shards_has_no_nodes() {
        let map = SlotMap::empty();
        assert!(matches!(map.resolve(&[]).unwrap_err(), VkError::ClusterHasNoNodes));
    }

    #[test]
    fn resolve_empty_slot_set_picks_a_live_shard() {
        let mut map = SlotMap::empty();
        map.update(vec![(vec![0..=16383], nodes("a"))]);
        let resolved = map.resolve(&[]).unwrap();
        assert_eq!(resolved.primary, "a");
    }

    #[test]
    fn resolve_single_shard_keys_succeeds() {
        let mut map = SlotMap::empty();
        map.update(vec![(vec![0..=16383], nodes("a"))]);
        let resolved = map.resolve(&[Slot::new(1), Slot::new(2)]).unwrap();
        assert_eq!(resolved.primary, "a");
    }

    #[test]
    fn resolve_cross_shard_keys_is_rejected() {
        let mut map = SlotMap::empty();
        map.update(vec![
            (vec![0..=100], nodes("a")),
            (vec![101..=16383], nodes("b")),
        ]);
        let err = map.resolve(&[Slot::new(1), Slot::new(200)]).unwrap_err();
        assert!(matches!(err, VkError::KeysInCommandRequireMultipleNodes));
    }

    #[test]
    fn resolve_unassigned_slot_is_rejected() {
        let mut map = SlotMap::empty();
        map.update(vec![(vec![0..=100], nodes("a"))]);
        let err = map.resolve(&[Slot::new(200)]).unwrap_err();
        assert!(matches!(err, VkError::ClusterIsMissingSlotAssignment(200)));
    }
}
