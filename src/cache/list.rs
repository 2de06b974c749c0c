//! Slot List Module
//!
//! Doubly linked list whose nodes live in a slot vector and link to each
//! other by index. Handles stay stable until the node is removed, so a
//! side index (`HashMap<K, usize>`) can move or unlink any node in O(1).
//!
//! ```text
//!   head ─► [3] ◄──► [0] ◄──► [5] ◄── tail
//! ```

// == Node ==
#[derive(Debug)]
struct Node<T> {
    value: T,
    prev: Option<usize>,
    next: Option<usize>,
}

// == Slot List ==
/// Index-linked doubly linked list with a free-slot stack.
#[derive(Debug)]
pub struct SlotList<T> {
    slots: Vec<Option<Node<T>>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl<T> Default for SlotList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SlotList<T> {
    // == Constructor ==
    /// Creates an empty list.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    // == Length ==
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    // == Accessors ==
    /// Handle of the head node.
    pub fn front_index(&self) -> Option<usize> {
        self.head
    }

    /// Handle of the tail node.
    pub fn back_index(&self) -> Option<usize> {
        self.tail
    }

    pub fn front(&self) -> Option<&T> {
        self.head.and_then(|idx| self.get(idx))
    }

    pub fn back(&self) -> Option<&T> {
        self.tail.and_then(|idx| self.get(idx))
    }

    pub fn get(&self, idx: usize) -> Option<&T> {
        self.slots
            .get(idx)
            .and_then(|slot| slot.as_ref())
            .map(|node| &node.value)
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut T> {
        self.slots
            .get_mut(idx)
            .and_then(|slot| slot.as_mut())
            .map(|node| &mut node.value)
    }

    /// Handle of the node after `idx`, towards the tail.
    pub fn next_index(&self, idx: usize) -> Option<usize> {
        self.node(idx).and_then(|node| node.next)
    }

    // == Insertion ==
    /// Inserts a value at the head and returns its handle.
    pub fn push_front(&mut self, value: T) -> usize {
        let idx = self.allocate(value);
        self.attach_front(idx);
        idx
    }

    /// Inserts a value at the tail and returns its handle.
    pub fn push_back(&mut self, value: T) -> usize {
        let idx = self.allocate(value);
        self.attach_back(idx);
        idx
    }

    // == Removal ==
    /// Unlinks a node and frees its slot, re-linking its neighbours.
    pub fn remove(&mut self, idx: usize) -> Option<T> {
        self.node(idx)?;
        self.detach(idx);
        let node = self.slots[idx].take()?;
        self.free.push(idx);
        self.len -= 1;
        Some(node.value)
    }

    pub fn pop_front(&mut self) -> Option<T> {
        let idx = self.head?;
        self.remove(idx)
    }

    pub fn pop_back(&mut self) -> Option<T> {
        let idx = self.tail?;
        self.remove(idx)
    }

    // == Reordering ==
    /// Moves a node to the head. Unknown handles are ignored.
    pub fn move_to_front(&mut self, idx: usize) {
        if self.node(idx).is_none() || self.head == Some(idx) {
            return;
        }
        self.detach(idx);
        self.attach_front(idx);
    }

    /// Moves a node to the tail. Unknown handles are ignored.
    pub fn move_to_back(&mut self, idx: usize) {
        if self.node(idx).is_none() || self.tail == Some(idx) {
            return;
        }
        self.detach(idx);
        self.attach_back(idx);
    }

    // == Clear ==
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
        self.len = 0;
    }

    // == Iteration ==
    /// Iterates values from head to tail.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            current: self.head,
        }
    }

    // == Internals ==
    fn node(&self, idx: usize) -> Option<&Node<T>> {
        self.slots.get(idx).and_then(|slot| slot.as_ref())
    }

    fn node_mut(&mut self, idx: usize) -> Option<&mut Node<T>> {
        self.slots.get_mut(idx).and_then(|slot| slot.as_mut())
    }

    fn allocate(&mut self, value: T) -> usize {
        let node = Node {
            value,
            prev: None,
            next: None,
        };
        self.len += 1;
        match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(node);
                idx
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        }
    }

    fn detach(&mut self, idx: usize) {
        let (prev, next) = match self.node(idx) {
            Some(node) => (node.prev, node.next),
            None => return,
        };

        match prev {
            Some(p) => {
                if let Some(node) = self.node_mut(p) {
                    node.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(node) = self.node_mut(n) {
                    node.prev = prev;
                }
            }
            None => self.tail = prev,
        }

        if let Some(node) = self.node_mut(idx) {
            node.prev = None;
            node.next = None;
        }
    }

    fn attach_front(&mut self, idx: usize) {
        let old_head = self.head;
        if let Some(node) = self.node_mut(idx) {
            node.prev = None;
            node.next = old_head;
        }
        match old_head {
            Some(h) => {
                if let Some(node) = self.node_mut(h) {
                    node.prev = Some(idx);
                }
            }
            None => self.tail = Some(idx),
        }
        self.head = Some(idx);
    }

    fn attach_back(&mut self, idx: usize) {
        let old_tail = self.tail;
        if let Some(node) = self.node_mut(idx) {
            node.next = None;
            node.prev = old_tail;
        }
        match old_tail {
            Some(t) => {
                if let Some(node) = self.node_mut(t) {
                    node.next = Some(idx);
                }
            }
            None => self.head = Some(idx),
        }
        self.tail = Some(idx);
    }
}

// == Iterator ==
pub struct Iter<'a, T> {
    list: &'a SlotList<T>,
    current: Option<usize>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.current?;
        let node = self.list.node(idx)?;
        self.current = node.next;
        Some(&node.value)
    }
}
