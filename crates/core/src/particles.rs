//! Index-based arena of noise particles.
//!
//! Slots live in parallel arrays. Live slots are threaded through one of two
//! intrusive singly linked lists: `current` holds the particles that make up
//! this frame's input texture, `new` collects particles created during the
//! frame until [`ParticleArena::merge_new`] splices them onto `current`.
//! Unused slots sit on an explicit free stack. Every slot is in exactly one
//! of the three at all times.

use glam::DVec2;

use crate::error::FlowError;
use crate::prng::Xorshift64;

const NIL: u32 = u32::MAX;

/// Opaque handle to an arena slot. Valid until the particle is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParticleId(u32);

/// A noise sample: field-space position and signed intensity in `[-1, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub position: DVec2,
    pub intensity: f64,
}

#[derive(Debug, Clone, Copy)]
struct List {
    head: u32,
    tail: u32,
    len: usize,
}

impl List {
    const EMPTY: List = List {
        head: NIL,
        tail: NIL,
        len: 0,
    };
}

#[derive(Debug, Clone)]
pub struct ParticleArena {
    x: Vec<f64>,
    y: Vec<f64>,
    intensity: Vec<f64>,
    next: Vec<u32>,
    /// `true` for slots on the current or new list.
    live: Vec<bool>,
    current: List,
    new: List,
    free: Vec<u32>,
    scratch: Vec<u32>,
}

impl Default for ParticleArena {
    fn default() -> Self {
        Self::new()
    }
}

impl ParticleArena {
    /// An empty arena with no slots.
    pub fn new() -> Self {
        Self {
            x: Vec::new(),
            y: Vec::new(),
            intensity: Vec::new(),
            next: Vec::new(),
            live: Vec::new(),
            current: List::EMPTY,
            new: List::EMPTY,
            free: Vec::new(),
            scratch: Vec::new(),
        }
    }

    /// Total slots, live or free.
    pub fn capacity(&self) -> usize {
        self.x.len()
    }

    /// Live particles on either list.
    pub fn len(&self) -> usize {
        self.current.len + self.new.len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn current_len(&self) -> usize {
        self.current.len
    }

    pub fn new_len(&self) -> usize {
        self.new.len
    }

    pub fn free_len(&self) -> usize {
        self.free.len()
    }

    /// Grows the arena to at least `total` slots. Existing particles keep
    /// their slots and handles; the arena never shrinks.
    pub fn reserve_total(&mut self, total: usize) -> Result<(), FlowError> {
        let old = self.capacity();
        if total <= old {
            return Ok(());
        }
        if total > NIL as usize {
            return Err(FlowError::ArenaExhausted { capacity: old });
        }
        self.x.resize(total, 0.0);
        self.y.resize(total, 0.0);
        self.intensity.resize(total, 0.0);
        self.next.resize(total, NIL);
        self.live.resize(total, false);
        // Pushed high to low so the lowest new slot is handed out first.
        self.free.extend((old as u32..total as u32).rev());
        self.scratch.reserve(total - old);
        Ok(())
    }

    /// Stores a particle at the tail of the new list.
    ///
    /// Returns `FlowError::ArenaExhausted` when no free slot remains.
    pub fn insert(&mut self, position: DVec2, intensity: f64) -> Result<ParticleId, FlowError> {
        let i = self.free.pop().ok_or(FlowError::ArenaExhausted {
            capacity: self.capacity(),
        })?;
        let k = i as usize;
        self.x[k] = position.x;
        self.y[k] = position.y;
        self.intensity[k] = intensity;
        self.next[k] = NIL;
        self.live[k] = true;
        if self.new.tail == NIL {
            self.new.head = i;
        } else {
            self.next[self.new.tail as usize] = i;
        }
        self.new.tail = i;
        self.new.len += 1;
        Ok(ParticleId(i))
    }

    /// The particle in slot `id`, if that slot is live.
    pub fn get(&self, id: ParticleId) -> Option<Particle> {
        let k = id.0 as usize;
        match self.live.get(k) {
            Some(true) => Some(self.particle(k)),
            _ => None,
        }
    }

    #[inline]
    fn particle(&self, k: usize) -> Particle {
        Particle {
            position: DVec2::new(self.x[k], self.y[k]),
            intensity: self.intensity[k],
        }
    }

    /// Walks the current list in order.
    pub fn iter_current(&self) -> CurrentIter<'_> {
        CurrentIter {
            arena: self,
            cursor: self.current.head,
        }
    }

    /// Keeps the current particles for which `keep` returns `true`, freeing
    /// the rest. Order of the survivors is preserved. Returns the number
    /// removed.
    pub fn retain_current<P: FnMut(&Particle) -> bool>(&mut self, mut keep: P) -> usize {
        let mut removed = 0;
        let mut prev = NIL;
        let mut cur = self.current.head;
        while cur != NIL {
            let k = cur as usize;
            let after = self.next[k];
            if keep(&self.particle(k)) {
                prev = cur;
            } else {
                if prev == NIL {
                    self.current.head = after;
                } else {
                    self.next[prev as usize] = after;
                }
                if after == NIL {
                    self.current.tail = prev;
                }
                self.next[k] = NIL;
                self.live[k] = false;
                self.free.push(cur);
                self.current.len -= 1;
                removed += 1;
            }
            cur = after;
        }
        removed
    }

    /// Replaces each current particle's position with `step(position)`.
    pub fn advect_current<S: FnMut(DVec2) -> DVec2>(&mut self, mut step: S) {
        let mut cur = self.current.head;
        while cur != NIL {
            let k = cur as usize;
            let p = step(DVec2::new(self.x[k], self.y[k]));
            self.x[k] = p.x;
            self.y[k] = p.y;
            cur = self.next[k];
        }
    }

    /// Shuffles the new list uniformly and appends it to the current list.
    pub fn merge_new(&mut self, rng: &mut Xorshift64) {
        if self.new.len == 0 {
            return;
        }
        self.scratch.clear();
        let mut cur = self.new.head;
        while cur != NIL {
            self.scratch.push(cur);
            cur = self.next[cur as usize];
        }
        rng.shuffle(&mut self.scratch);

        for pair in self.scratch.windows(2) {
            self.next[pair[0] as usize] = pair[1];
        }
        let (first, last) = match (self.scratch.first(), self.scratch.last()) {
            (Some(&f), Some(&l)) => (f, l),
            _ => return,
        };
        self.next[last as usize] = NIL;
        if self.current.tail == NIL {
            self.current.head = first;
        } else {
            self.next[self.current.tail as usize] = first;
        }
        self.current.tail = last;
        self.current.len += self.new.len;
        self.new = List::EMPTY;
    }

    /// Frees every particle. Capacity is kept.
    pub fn clear(&mut self) {
        let n = self.capacity() as u32;
        self.next.fill(NIL);
        self.live.fill(false);
        self.free.clear();
        self.free.extend((0..n).rev());
        self.current = List::EMPTY;
        self.new = List::EMPTY;
    }
}

/// Iterator over the current list, see [`ParticleArena::iter_current`].
pub struct CurrentIter<'a> {
    arena: &'a ParticleArena,
    cursor: u32,
}

impl Iterator for CurrentIter<'_> {
    type Item = Particle;

    fn next(&mut self) -> Option<Particle> {
        if self.cursor == NIL {
            return None;
        }
        let k = self.cursor as usize;
        self.cursor = self.arena.next[k];
        Some(self.arena.particle(k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walk(arena: &ParticleArena, head: u32) -> Vec<u32> {
        let mut out = Vec::new();
        let mut cur = head;
        while cur != NIL {
            out.push(cur);
            cur = arena.next[cur as usize];
        }
        out
    }

    /// Every slot appears exactly once across current, new and free.
    fn assert_partition(arena: &ParticleArena) {
        let current = walk(arena, arena.current.head);
        let new = walk(arena, arena.new.head);
        assert_eq!(current.len(), arena.current_len());
        assert_eq!(new.len(), arena.new_len());
        assert_eq!(current.last().copied().unwrap_or(NIL), arena.current.tail);
        assert_eq!(new.last().copied().unwrap_or(NIL), arena.new.tail);
        for &i in current.iter().chain(&new) {
            assert!(arena.live[i as usize], "listed slot {i} not marked live");
        }
        for &i in &arena.free {
            assert!(!arena.live[i as usize], "free slot {i} marked live");
        }
        let mut all: Vec<u32> = current.into_iter().chain(new).chain(arena.free.iter().copied()).collect();
        all.sort_unstable();
        let expected: Vec<u32> = (0..arena.capacity() as u32).collect();
        assert_eq!(all, expected);
    }

    fn at(x: f64) -> DVec2 {
        DVec2::new(x, -x)
    }

    // -- Allocation --

    #[test]
    fn empty_arena_rejects_insert() {
        let mut arena = ParticleArena::new();
        assert!(matches!(
            arena.insert(DVec2::ZERO, 0.0),
            Err(FlowError::ArenaExhausted { capacity: 0 })
        ));
    }

    #[test]
    fn insert_fills_capacity_then_fails() {
        let mut arena = ParticleArena::new();
        arena.reserve_total(3).unwrap();
        for i in 0..3 {
            arena.insert(at(i as f64), 0.5).unwrap();
        }
        assert_eq!(arena.new_len(), 3);
        assert_eq!(arena.free_len(), 0);
        assert!(matches!(
            arena.insert(DVec2::ZERO, 0.0),
            Err(FlowError::ArenaExhausted { capacity: 3 })
        ));
        assert_partition(&arena);
    }

    #[test]
    fn growth_preserves_existing_particles() {
        let mut arena = ParticleArena::new();
        arena.reserve_total(2).unwrap();
        let a = arena.insert(at(1.0), 0.25).unwrap();
        let b = arena.insert(at(2.0), -0.75).unwrap();
        arena.reserve_total(10).unwrap();
        assert_eq!(arena.capacity(), 10);
        assert_eq!(arena.free_len(), 8);
        assert_eq!(arena.get(a), Some(Particle { position: at(1.0), intensity: 0.25 }));
        assert_eq!(arena.get(b), Some(Particle { position: at(2.0), intensity: -0.75 }));
        arena.insert(at(3.0), 0.0).unwrap();
        assert_partition(&arena);
    }

    #[test]
    fn reserve_never_shrinks() {
        let mut arena = ParticleArena::new();
        arena.reserve_total(8).unwrap();
        arena.reserve_total(4).unwrap();
        assert_eq!(arena.capacity(), 8);
    }

    // -- Lists --

    #[test]
    fn merge_moves_new_onto_current_tail() {
        let mut arena = ParticleArena::new();
        arena.reserve_total(6).unwrap();
        let mut rng = Xorshift64::new(3);
        for i in 0..3 {
            arena.insert(at(i as f64), 0.0).unwrap();
        }
        arena.merge_new(&mut rng);
        let first: Vec<DVec2> = arena.iter_current().map(|p| p.position).collect();
        for i in 3..6 {
            arena.insert(at(i as f64), 0.0).unwrap();
        }
        arena.merge_new(&mut rng);
        assert_eq!(arena.new_len(), 0);
        assert_eq!(arena.current_len(), 6);
        let all: Vec<DVec2> = arena.iter_current().map(|p| p.position).collect();
        assert_eq!(&all[..3], &first[..]);
        let mut tail: Vec<f64> = all[3..].iter().map(|p| p.x).collect();
        tail.sort_by(f64::total_cmp);
        assert_eq!(tail, vec![3.0, 4.0, 5.0]);
        assert_partition(&arena);
    }

    #[test]
    fn merge_of_empty_new_list_is_noop() {
        let mut arena = ParticleArena::new();
        arena.reserve_total(2).unwrap();
        arena.merge_new(&mut Xorshift64::new(1));
        assert_eq!(arena.current_len(), 0);
        assert_partition(&arena);
    }

    #[test]
    fn merge_shuffles() {
        let mut arena = ParticleArena::new();
        arena.reserve_total(64).unwrap();
        for i in 0..64 {
            arena.insert(at(i as f64), 0.0).unwrap();
        }
        arena.merge_new(&mut Xorshift64::new(17));
        let order: Vec<f64> = arena.iter_current().map(|p| p.position.x).collect();
        let sorted: Vec<f64> = (0..64).map(f64::from).collect();
        assert_ne!(order, sorted);
    }

    #[test]
    fn retain_removes_from_head_middle_and_tail() {
        let mut arena = ParticleArena::new();
        arena.reserve_total(5).unwrap();
        for i in 0..5 {
            arena.insert(at(i as f64), i as f64).unwrap();
        }
        arena.merge_new(&mut Xorshift64::new(1));
        let removed = arena.retain_current(|p| p.intensity == 2.0);
        assert_eq!(removed, 4);
        assert_eq!(arena.current_len(), 1);
        assert_eq!(arena.iter_current().next().map(|p| p.intensity), Some(2.0));
        assert_partition(&arena);

        arena.retain_current(|_| false);
        assert_eq!(arena.current_len(), 0);
        assert_eq!(arena.free_len(), 5);
        assert_partition(&arena);
    }

    #[test]
    fn freed_slots_are_reused() {
        let mut arena = ParticleArena::new();
        arena.reserve_total(1).unwrap();
        let id = arena.insert(at(1.0), 0.0).unwrap();
        arena.merge_new(&mut Xorshift64::new(1));
        arena.retain_current(|_| false);
        assert_eq!(arena.get(id), None);
        let again = arena.insert(at(2.0), 0.0).unwrap();
        assert_eq!(again, id);
    }

    #[test]
    fn advect_moves_only_current() {
        let mut arena = ParticleArena::new();
        arena.reserve_total(4).unwrap();
        arena.insert(at(1.0), 0.0).unwrap();
        arena.merge_new(&mut Xorshift64::new(1));
        let pending = arena.insert(at(5.0), 0.0).unwrap();
        arena.advect_current(|p| p + DVec2::X);
        let moved: Vec<DVec2> = arena.iter_current().map(|p| p.position).collect();
        assert_eq!(moved, vec![DVec2::new(2.0, -1.0)]);
        assert_eq!(arena.get(pending).map(|p| p.position), Some(at(5.0)));
    }

    #[test]
    fn clear_frees_everything() {
        let mut arena = ParticleArena::new();
        arena.reserve_total(4).unwrap();
        for i in 0..3 {
            arena.insert(at(i as f64), 0.0).unwrap();
        }
        arena.merge_new(&mut Xorshift64::new(1));
        arena.insert(at(9.0), 0.0).unwrap();
        arena.clear();
        assert!(arena.is_empty());
        assert_eq!(arena.free_len(), 4);
        assert!((0..4).all(|i| arena.get(ParticleId(i)).is_none()));
        assert_partition(&arena);
    }

    #[test]
    fn get_tracks_liveness() {
        let mut arena = ParticleArena::new();
        arena.reserve_total(3).unwrap();
        let ids: Vec<ParticleId> = (0..3).map(|i| arena.insert(at(i as f64), 0.0).unwrap()).collect();
        arena.merge_new(&mut Xorshift64::new(2));
        arena.retain_current(|p| p.position.x != 1.0);
        assert!(arena.get(ids[0]).is_some());
        assert_eq!(arena.get(ids[1]), None);
        assert!(arena.get(ids[2]).is_some());
        assert_eq!(arena.get(ParticleId(7)), None, "slot beyond capacity");
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Insert(f64),
            Merge,
            Retain(f64),
            Grow(usize),
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                4 => (-1.0_f64..1.0).prop_map(Op::Insert),
                1 => Just(Op::Merge),
                1 => (-1.0_f64..1.0).prop_map(Op::Retain),
                1 => (0_usize..16).prop_map(Op::Grow),
            ]
        }

        proptest! {
            #[test]
            fn slots_stay_partitioned(ops in prop::collection::vec(op(), 1..80), seed in any::<u64>()) {
                let mut arena = ParticleArena::new();
                let mut rng = Xorshift64::new(seed);
                arena.reserve_total(8).unwrap();
                for op in ops {
                    match op {
                        Op::Insert(c) => {
                            let before = arena.len();
                            match arena.insert(DVec2::splat(c), c) {
                                Ok(_) => prop_assert_eq!(arena.len(), before + 1),
                                Err(_) => prop_assert_eq!(arena.free_len(), 0),
                            }
                        }
                        Op::Merge => arena.merge_new(&mut rng),
                        Op::Retain(t) => {
                            arena.retain_current(|p| p.intensity < t);
                            prop_assert!(arena.iter_current().all(|p| p.intensity < t));
                        }
                        Op::Grow(extra) => {
                            let cap = arena.capacity();
                            arena.reserve_total(cap + extra).unwrap();
                        }
                    }
                    assert_partition(&arena);
                }
            }
        }
    }
}
