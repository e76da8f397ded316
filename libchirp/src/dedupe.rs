//! Bounded memory of post ids the bot already replied to

use std::collections::{HashSet, VecDeque};

use crate::types::PostId;

/// Insertion-ordered set that forgets its oldest entry once full.
///
/// Lives for the process only; after a restart the platform's own duplicate
/// rejection is the last line of defence.
#[derive(Debug, Clone)]
pub struct RecentIds {
    capacity: usize,
    order: VecDeque<PostId>,
    members: HashSet<PostId>,
}

impl RecentIds {
    /// A capacity of zero is treated as one
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            members: HashSet::with_capacity(capacity),
        }
    }

    pub fn contains(&self, id: &PostId) -> bool {
        self.members.contains(id)
    }

    /// Remember `id`. Returns `false` if it was already present.
    pub fn insert(&mut self, id: PostId) -> bool {
        if self.members.contains(&id) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }
        self.members.insert(id.clone());
        self.order.push_back(id);
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
