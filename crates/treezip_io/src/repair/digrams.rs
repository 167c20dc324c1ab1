//! The digram index: for every active digram, a doubly-linked list of
//! non-overlapping occurrences, plus a max-heap keyed by occurrence
//! count with FIFO tie-breaking on discovery order.
//!
//! The heap is lazy: every count change pushes a fresh entry, and stale
//! entries (whose recorded count no longer matches the live count) are
//! skipped on pop. Occurrence lists support O(1) removal from the
//! middle, which the substitution pass relies on when it invalidates
//! the digrams of a rewritten node.

use crate::repair::tree::{Counter, GenericCounter, Label, NodeIndex, Tree};

use std::collections::{BinaryHeap, HashMap};

/// A labelled parent-child edge: the atomic pattern mined by TreeRePair.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Debug)]
pub struct Digram {
    /// The parent label. It will be replaced by a new, per-digram,
    /// generated label.
    pub parent: Label,
    /// The index of the child of the parent to replace.
    pub position: usize,
    /// The child label. It will be replaced by its own children.
    pub child: Label,
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub struct DigramId(usize);
impl Counter for DigramId {
    fn internal_make(value: usize) -> Self {
        DigramId(value)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct OccIndex(usize);

struct Occurrence {
    /// The node standing as digram parent.
    node: NodeIndex,
    position: usize,
    digram: DigramId,
    prev: Option<OccIndex>,
    next: Option<OccIndex>,
    active: bool,
}

struct DigramEntry {
    digram: Digram,
    head: Option<OccIndex>,
    tail: Option<OccIndex>,
    len: usize,
}

#[derive(PartialEq, Eq)]
struct HeapEntry {
    count: usize,
    /// The digram, which doubles as its discovery sequence; among equal
    /// counts the earliest-discovered digram wins.
    digram: DigramId,
}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.count
            .cmp(&other.count)
            .then_with(|| other.digram.cmp(&self.digram))
    }
}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// A digram only gets a nonterminal if it occurs at least this often.
pub const MINIMAL_NUMBER_OF_INSTANCES: usize = 2;

pub struct DigramIndex {
    by_digram: HashMap<Digram, DigramId>,
    entries: Vec<DigramEntry>,
    occurrences: Vec<Occurrence>,
    heap: BinaryHeap<HeapEntry>,
    seq: GenericCounter<DigramId>,
    /// For each node, the occurrence in which it stands as digram
    /// parent, per child position. Indexed by `NodeIndex`.
    registered: Vec<Vec<Option<OccIndex>>>,
}

impl DigramIndex {
    pub fn new() -> Self {
        DigramIndex {
            by_digram: HashMap::new(),
            entries: vec![],
            occurrences: vec![],
            heap: BinaryHeap::new(),
            seq: GenericCounter::new(),
            registered: vec![],
        }
    }

    /// Register the digrams of every node reachable from `root`,
    /// in preorder, so that overlapping occurrences of a same-label
    /// chain are resolved in favor of the earlier node.
    pub fn build(&mut self, tree: &Tree, root: NodeIndex) {
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            for position in 0..tree.children(node).len() {
                self.register_edge(tree, node, position);
            }
            stack.extend(tree.children(node).iter().rev());
        }
        debug!(target: "repair", "Startup index: {} distinct digrams over {} occurrences",
            self.entries.len(), self.occurrences.len());
    }

    pub fn digram(&self, id: DigramId) -> &Digram {
        &self.entries[id.0].digram
    }

    pub fn count(&self, id: DigramId) -> usize {
        self.entries[id.0].len
    }

    pub fn is_active(&self, occurrence: OccIndex) -> bool {
        self.occurrences[occurrence.0].active
    }

    pub fn site(&self, occurrence: OccIndex) -> (NodeIndex, usize) {
        let occ = &self.occurrences[occurrence.0];
        (occ.node, occ.position)
    }

    /// The current occurrence list of a digram, in registration order.
    pub fn snapshot(&self, id: DigramId) -> Vec<OccIndex> {
        let mut result = Vec::with_capacity(self.entries[id.0].len);
        let mut cursor = self.entries[id.0].head;
        while let Some(occurrence) = cursor {
            result.push(occurrence);
            cursor = self.occurrences[occurrence.0].next;
        }
        result
    }

    /// Pop the most frequent digram with at least
    /// `MINIMAL_NUMBER_OF_INSTANCES` occurrences, if any.
    pub fn pop(&mut self) -> Option<DigramId> {
        while let Some(top) = self.heap.pop() {
            let entry = &self.entries[top.digram.0];
            if entry.len != top.count {
                // Stale: the count changed since this entry was pushed.
                continue;
            }
            if entry.len < MINIMAL_NUMBER_OF_INSTANCES {
                continue;
            }
            return Some(top.digram);
        }
        None
    }

    /// Register the digram at `(node, position)`, unless it would
    /// overlap an existing occurrence of the same digram.
    pub fn register_edge(&mut self, tree: &Tree, node: NodeIndex, position: usize) {
        let child = tree.child(node, position);
        let digram = Digram {
            parent: tree.label(node).clone(),
            position,
            child: tree.label(child).clone(),
        };
        let same_labels = digram.parent == digram.child;

        let id = match self.by_digram.get(&digram) {
            Some(id) => *id,
            None => {
                let id = self.seq.next();
                debug_assert_eq!(id.0, self.entries.len());
                self.by_digram.insert(digram.clone(), id);
                self.entries.push(DigramEntry {
                    digram,
                    head: None,
                    tail: None,
                    len: 0,
                });
                id
            }
        };

        if same_labels {
            // Only identical parent and child labels can share a node
            // between two occurrences; keep the one registered first.
            if self.covered_as_child(tree, node, id) || self.heads_occurrence(child, id) {
                return;
            }
        }

        let occurrence = OccIndex(self.occurrences.len());
        let tail = self.entries[id.0].tail;
        self.occurrences.push(Occurrence {
            node,
            position,
            digram: id,
            prev: tail,
            next: None,
            active: true,
        });
        match tail {
            Some(tail) => self.occurrences[tail.0].next = Some(occurrence),
            None => self.entries[id.0].head = Some(occurrence),
        }
        let entry = &mut self.entries[id.0];
        entry.tail = Some(occurrence);
        entry.len += 1;

        self.grow(node);
        let slots = &mut self.registered[node.0];
        if slots.len() <= position {
            slots.resize(position + 1, None);
        }
        debug_assert!(slots[position].is_none());
        slots[position] = Some(occurrence);

        let len = self.entries[id.0].len;
        self.heap.push(HeapEntry {
            count: len,
            digram: id,
        });
    }

    /// True if `node` is the child half of an active occurrence of `id`.
    fn covered_as_child(&self, tree: &Tree, node: NodeIndex, id: DigramId) -> bool {
        if let Some((parent, position)) = tree.parent(node) {
            if let Some(slots) = self.registered.get(parent.0) {
                if let Some(Some(occurrence)) = slots.get(position) {
                    let occ = &self.occurrences[occurrence.0];
                    return occ.active && occ.digram == id;
                }
            }
        }
        false
    }

    /// True if `node` is the parent half of an active occurrence of `id`.
    fn heads_occurrence(&self, node: NodeIndex, id: DigramId) -> bool {
        if let Some(slots) = self.registered.get(node.0) {
            for slot in slots {
                if let Some(occurrence) = slot {
                    let occ = &self.occurrences[occurrence.0];
                    if occ.active && occ.digram == id {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Remove one occurrence: unlink it from its digram's list, clear
    /// its registration slot and reprioritize the digram.
    pub fn remove(&mut self, occurrence: OccIndex) {
        let (node, position, digram, prev, next) = {
            let occ = &mut self.occurrences[occurrence.0];
            if !occ.active {
                return;
            }
            occ.active = false;
            (occ.node, occ.position, occ.digram, occ.prev, occ.next)
        };

        match prev {
            Some(prev) => self.occurrences[prev.0].next = next,
            None => self.entries[digram.0].head = next,
        }
        match next {
            Some(next) => self.occurrences[next.0].prev = prev,
            None => self.entries[digram.0].tail = prev,
        }
        self.entries[digram.0].len -= 1;

        if let Some(slots) = self.registered.get_mut(node.0) {
            if let Some(slot) = slots.get_mut(position) {
                if *slot == Some(occurrence) {
                    *slot = None;
                }
            }
        }

        let len = self.entries[digram.0].len;
        self.heap.push(HeapEntry { count: len, digram });
    }

    /// Remove every occurrence in which `node` stands as digram parent.
    pub fn remove_parent_roles(&mut self, node: NodeIndex) {
        if let Some(slots) = self.registered.get(node.0) {
            let occurrences: Vec<_> = slots.iter().filter_map(|slot| *slot).collect();
            for occurrence in occurrences {
                self.remove(occurrence);
            }
        }
    }

    /// Remove the occurrence (if any) in which `node` stands as digram
    /// child, i.e. the one registered at its parent for its position.
    pub fn remove_child_role(&mut self, tree: &Tree, node: NodeIndex) {
        let occurrence = match tree.parent(node) {
            Some((parent, position)) => self
                .registered
                .get(parent.0)
                .and_then(|slots| slots.get(position))
                .and_then(|slot| *slot),
            None => None,
        };
        if let Some(occurrence) = occurrence {
            self.remove(occurrence);
        }
    }

    /// Reset the registration slots of `node` for a new child list.
    pub fn reset_slots(&mut self, node: NodeIndex, arity: usize) {
        self.grow(node);
        let slots = &mut self.registered[node.0];
        debug_assert!(slots.iter().all(Option::is_none));
        slots.clear();
        slots.resize(arity, None);
    }

    fn grow(&mut self, node: NodeIndex) {
        if self.registered.len() <= node.0 {
            self.registered.resize_with(node.0 + 1, Vec::new);
        }
    }
}
