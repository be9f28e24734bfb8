//! Node storage for the task queue.
//!
//! A fixed number of slots is carved into a freelist on first use. When the
//! freelist is empty nodes are allocated one by one on the heap. Every node
//! is addressed by a [`NodeId`] tag that names its storage, so release never
//! has to guess where a node came from.

use super::task::Task;
use crate::error::{Error, Result};
use std::alloc::{alloc, dealloc, Layout};
use std::ptr::{self, NonNull};

/// Number of nodes held without dynamic allocation.
pub const DEFAULT_ARENA_CAPACITY: usize = 1024;

pub(crate) struct Node {
    pub(crate) task: Option<Task>,
    pub(crate) next: Option<NodeId>,
}

impl Node {
    const fn vacant() -> Self {
        Node {
            task: None,
            next: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeId {
    Slot(usize),
    Heap(NonNull<Node>),
}

pub(crate) struct NodeArena {
    slots: Vec<Node>,
    capacity: usize,
    initialized: bool,
    free: Option<usize>,
    free_len: usize,
    heap_allocated: u64,
    heap_released: u64,
}

// SAFETY: heap nodes are uniquely owned through the NodeIds held by the
// arena's owner and are only touched through `&mut NodeArena`.
unsafe impl Send for NodeArena {}

impl NodeArena {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            capacity,
            initialized: false,
            free: None,
            free_len: 0,
            heap_allocated: 0,
            heap_released: 0,
        }
    }

    /// Hand out a vacant node: freelist first, then the lazily built arena,
    /// then the heap.
    pub fn acquire(&mut self) -> Result<NodeId> {
        if let Some(index) = self.free {
            self.free = match self.slots[index].next.take() {
                Some(NodeId::Slot(next)) => Some(next),
                _ => None,
            };
            self.free_len -= 1;
            return Ok(NodeId::Slot(index));
        }

        if !self.initialized && self.capacity > 0 && self.initialize() {
            return Ok(NodeId::Slot(0));
        }

        self.allocate_heap()
    }

    /// Carve the slots, keep slot 0 for the caller and chain the rest.
    fn initialize(&mut self) -> bool {
        if self.slots.try_reserve_exact(self.capacity).is_err() {
            return false;
        }

        self.slots.extend((0..self.capacity).map(|_| Node::vacant()));
        for i in 1..self.capacity - 1 {
            self.slots[i].next = Some(NodeId::Slot(i + 1));
        }
        self.free = if self.capacity > 1 { Some(1) } else { None };
        self.free_len = self.capacity - 1;
        self.initialized = true;
        true
    }

    fn allocate_heap(&mut self) -> Result<NodeId> {
        let layout = Layout::new::<Node>();
        // SAFETY: Node is not zero-sized.
        let raw = unsafe { alloc(layout) }.cast::<Node>();
        let node = NonNull::new(raw)
            .ok_or_else(|| Error::resource_exhausted("task node allocation failed"))?;

        // SAFETY: freshly allocated with Node's layout.
        unsafe { ptr::write(node.as_ptr(), Node::vacant()) };
        self.heap_allocated += 1;
        Ok(NodeId::Heap(node))
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
        match id {
            NodeId::Slot(index) => &mut self.slots[index],
            // SAFETY: heap ids are live until `release` and owned by this
            // arena's caller, which holds `&mut self`.
            NodeId::Heap(node) => unsafe { &mut *node.as_ptr() },
        }
    }

    /// Return a node to the storage its tag names. The node's task must
    /// already have been taken out.
    pub fn release(&mut self, id: NodeId) {
        match id {
            NodeId::Slot(index) => {
                let node = &mut self.slots[index];
                debug_assert!(node.task.is_none());
                node.next = self.free.map(NodeId::Slot);
                self.free = Some(index);
                self.free_len += 1;
            }
            NodeId::Heap(node) => {
                // SAFETY: allocated by `allocate_heap` and released once,
                // because the id is consumed from the queue before release.
                unsafe {
                    ptr::drop_in_place(node.as_ptr());
                    dealloc(node.as_ptr().cast(), Layout::new::<Node>());
                }
                self.heap_released += 1;
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn free_slots(&self) -> usize {
        self.free_len
    }

    pub fn heap_allocated(&self) -> u64 {
        self.heap_allocated
    }

    pub fn heap_released(&self) -> u64 {
        self.heap_released
    }
}
