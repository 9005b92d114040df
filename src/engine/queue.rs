use std::collections::{HashMap, VecDeque};

use crate::conversation::OrderTerms;
use crate::entries::prelude::*;

/// A paid order waiting for its turn in the buyer's queue.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedOrder {
    pub order_id: OrderId,
    pub chat: MarketChat,
    pub buyer_username: String,
    pub terms: OrderTerms,
    /// Target taken from the order form, if the lot has one.
    pub prefill: Option<String>,
}

/// Per-buyer FIFO of orders. Only the head of a queue has a conversation.
#[derive(Default)]
pub struct BuyerQueues {
    queues: HashMap<BuyerId, VecDeque<QueuedOrder>>,
}

impl BuyerQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `order` and returns its 1-based position. Duplicates keep
    /// their original place.
    pub fn push(&mut self, buyer: BuyerId, order: QueuedOrder) -> usize {
        let queue = self.queues.entry(buyer).or_default();

        if let Some(index) = queue.iter().position(|o| o.order_id == order.order_id) {
            return index + 1;
        }

        queue.push_back(order);
        queue.len()
    }

    pub fn head(&self, buyer: BuyerId) -> Option<&QueuedOrder> {
        self.queues.get(&buyer).and_then(|q| q.front())
    }

    pub fn position(&self, buyer: BuyerId, order_id: &str) -> Option<usize> {
        self.queues
            .get(&buyer)?
            .iter()
            .position(|o| o.order_id == order_id)
            .map(|i| i + 1)
    }

    /// Drops the head when it is `order_id` and returns the new head. An
    /// order that is no longer the head advances nothing.
    pub fn finish(&mut self, buyer: BuyerId, order_id: &str) -> Option<QueuedOrder> {
        let queue = self.queues.get_mut(&buyer)?;

        if queue.front().map_or(true, |o| o.order_id != order_id) {
            return None;
        }
        queue.pop_front();

        let next = queue.front().cloned();
        if queue.is_empty() {
            self.queues.remove(&buyer);
        }
        next
    }

    /// Removes `order_id` wherever it is queued. Returns the buyer and
    /// whether it was at the head.
    pub fn remove(&mut self, order_id: &str) -> Option<(BuyerId, bool)> {
        let (buyer, index) = self.queues.iter().find_map(|(buyer, queue)| {
            queue
                .iter()
                .position(|o| o.order_id == order_id)
                .map(|i| (*buyer, i))
        })?;

        if let Some(queue) = self.queues.get_mut(&buyer) {
            queue.remove(index);
            if queue.is_empty() {
                self.queues.remove(&buyer);
            }
        }
        Some((buyer, index == 0))
    }

    pub fn len(&self, buyer: BuyerId) -> usize {
        self.queues.get(&buyer).map_or(0, |q| q.len())
    }
}
