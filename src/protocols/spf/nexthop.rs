use std::net::Ipv4Addr;

use crate::model::topology::IfId;

pub const MAX_NXT_HOPS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NexthopId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nexthop {
    pub oif: IfId,
    pub gateway: Ipv4Addr,
}

#[derive(Debug)]
struct PoolSlot {
    nexthop: Nexthop,
    ref_count: u32,
}

/// Fixed-capacity set of owned nexthop references. Occupied slots are always
/// packed from index 0, so the first empty slot ends the set.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct NexthopSet {
    slots: [Option<NexthopId>; MAX_NXT_HOPS],
}

impl NexthopSet {
    pub fn iter(&self) -> impl Iterator<Item = NexthopId> + '_ {
        self.slots.iter().map_while(|slot| *slot)
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots[0].is_none()
    }

    pub fn is_full(&self) -> bool {
        self.first_free().is_none()
    }

    fn first_free(&self) -> Option<usize> {
        self.slots.iter().position(Option::is_none)
    }
}

/// Owner of every live nexthop. Sets hold ids into the pool and each stored id
/// accounts for exactly one reference; a nexthop is freed when its last
/// reference is flushed.
#[derive(Debug, Default)]
pub struct NexthopPool {
    slots: Vec<Option<PoolSlot>>,
    free: Vec<usize>,
}

impl NexthopPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, oif: IfId, gateway: Ipv4Addr) -> NexthopId {
        let slot = PoolSlot {
            nexthop: Nexthop { oif, gateway },
            ref_count: 0,
        };
        match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(slot);
                NexthopId(idx)
            }
            None => {
                self.slots.push(Some(slot));
                NexthopId(self.slots.len() - 1)
            }
        }
    }

    pub fn get(&self, id: NexthopId) -> Option<&Nexthop> {
        self.slot(id).map(|slot| &slot.nexthop)
    }

    pub fn ref_count(&self, id: NexthopId) -> Option<u32> {
        self.slot(id).map(|slot| slot.ref_count)
    }

    pub fn live_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn total_refs(&self) -> u64 {
        self.slots
            .iter()
            .flatten()
            .map(|slot| u64::from(slot.ref_count))
            .sum()
    }

    // On false the caller still owns `id`.
    pub fn insert(&mut self, set: &mut NexthopSet, id: NexthopId) -> bool {
        let Some(idx) = set.first_free() else {
            return false;
        };
        self.retain(id);
        set.slots[idx] = Some(id);
        true
    }

    pub fn contains(&self, set: &NexthopSet, id: NexthopId) -> bool {
        let Some(probe) = self.get(id) else {
            return false;
        };
        set.iter()
            .filter_map(|held| self.get(held))
            .any(|held| held.oif == probe.oif)
    }

    pub fn union_into(&mut self, src: &NexthopSet, dst: &mut NexthopSet) -> usize {
        let mut copied = 0;
        for id in src.iter() {
            if dst.is_full() {
                break;
            }
            if self.contains(dst, id) {
                continue;
            }
            if self.insert(dst, id) {
                copied += 1;
            }
        }
        copied
    }

    pub fn flush(&mut self, set: &mut NexthopSet) {
        for slot in set.slots.iter_mut() {
            if let Some(id) = slot.take() {
                self.release(id);
            }
        }
    }

    pub fn reclaim(&mut self, id: NexthopId) {
        let slot = self.slot(id).expect("reclaim of a freed nexthop");
        assert_eq!(slot.ref_count, 0, "reclaim of a referenced nexthop");
        self.slots[id.0] = None;
        self.free.push(id.0);
    }

    fn retain(&mut self, id: NexthopId) {
        let slot = self.slot_mut(id).expect("reference to a freed nexthop");
        slot.ref_count += 1;
    }

    fn release(&mut self, id: NexthopId) {
        let slot = self.slot_mut(id).expect("release of a freed nexthop");
        assert!(slot.ref_count > 0, "nexthop reference count underflow");
        slot.ref_count -= 1;
        if slot.ref_count == 0 {
            self.slots[id.0] = None;
            self.free.push(id.0);
        }
    }

    fn slot(&self, id: NexthopId) -> Option<&PoolSlot> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    fn slot_mut(&mut self, id: NexthopId) -> Option<&mut PoolSlot> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }
}
