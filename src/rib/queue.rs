// RibCore: routing daemon RIB core written in Rust
// Copyright 2022-2024 Tibor Schneider <sctibor@ethz.ch>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The meta-queue: strict-priority batching of route-node work.
//!
//! Route nodes touched by protocol input are not reprocessed immediately;
//! they are appended to one of five FIFO sub-queues, chosen by the protocol
//! that caused the change:
//!
//! * sub-queue 0: connected, kernel
//! * sub-queue 1: static
//! * sub-queue 2: RIP, RIPng, OSPF, OSPFv3, IS-IS
//! * sub-queue 3: iBGP, eBGP
//! * sub-queue 4: any other origin
//!
//! Draining always empties sub-queue 0 before touching sub-queue 1, and so
//! on. Starvation of the lower sub-queues is fine: kernel and connected
//! updates are inherently bounded in arrival rate, and it is exactly this
//! ordering that keeps cross-protocol processing deterministic.
//!
//! Each route node carries one queued bit per sub-queue (a
//! [`SubQueueMask`]); a set bit suppresses duplicate enqueues while still
//! allowing the same node to be serviced once per interested sub-queue.

use crate::types::{Safi, VrfId};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Number of meta-queue sub-queues.
pub const MQ_SIZE: usize = 5;

/// Identifies a route node across all VRFs and address families.
pub(crate) type NodeKey = (VrfId, Safi, IpNet);

/// Per-node bitset recording the sub-queues the node is currently enqueued
/// on. A set bit means "already queued there"; enqueueing is skipped.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubQueueMask(u8);

impl SubQueueMask {
    /// Whether the bit for sub-queue `i` is set.
    pub fn is_set(&self, i: usize) -> bool {
        self.0 & (1 << i) != 0
    }

    /// Set the bit for sub-queue `i`.
    pub fn set(&mut self, i: usize) {
        self.0 |= 1 << i;
    }

    /// Clear the bit for sub-queue `i`.
    pub fn clear(&mut self, i: usize) {
        self.0 &= !(1 << i);
    }

    /// Whether any bit is set.
    pub fn any(&self) -> bool {
        self.0 != 0
    }
}

/// The meta-queue itself: an array of FIFO sub-queues over route-node keys.
#[derive(Debug)]
pub(crate) struct MetaQueue {
    subq: [VecDeque<NodeKey>; MQ_SIZE],
}

impl Default for MetaQueue {
    fn default() -> Self {
        Self {
            subq: std::array::from_fn(|_| VecDeque::new()),
        }
    }
}

impl MetaQueue {
    /// Append a node key to sub-queue `sub`. The caller is responsible for
    /// checking and setting the node's queued bit first.
    pub(crate) fn push(&mut self, sub: usize, key: NodeKey) {
        self.subq[sub].push_back(key);
    }

    /// Pop the next node, always from the lowest non-empty sub-queue.
    /// Returns the sub-queue index along with the key. Scanning restarts at
    /// sub-queue 0 on every call, so freshly arrived high-priority work
    /// preempts the rest of a lower-priority batch.
    pub(crate) fn pop(&mut self) -> Option<(usize, NodeKey)> {
        for (i, q) in self.subq.iter_mut().enumerate() {
            if let Some(key) = q.pop_front() {
                return Some((i, key));
            }
        }
        None
    }

    /// Sum of the lengths of all sub-queues.
    pub(crate) fn len(&self) -> usize {
        self.subq.iter().map(VecDeque::len).sum()
    }

    /// Drop all queued work.
    pub(crate) fn clear(&mut self) {
        self.subq.iter_mut().for_each(VecDeque::clear);
    }
}
