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

#![deny(missing_docs, missing_debug_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! # RibCore
//!
//! The core data structures of a routing daemon: the Routing Information
//! Base with its per-VRF prefix tables and best-route selection, the
//! meta-queue that batches and orders route processing, static route
//! configuration, the nexthop model, and a reference-counted, hash-interned
//! attribute layer with the BGP communities attribute built on top of it.
//!
//! This crate does not talk to the outside world. Kernel FIB programming,
//! interface discovery, protocol peering and the operator terminal are
//! external collaborators: they feed routes in through [`rib::Rib`] and the
//! typed command handlers in [`cmd`], and consume FIB updates through a
//! [`rib::FibSink`].
//!
//! ## Main concepts
//!
//! A [`rib::Rib`] holds everything one daemon process owns: the VRFs with
//! their per-AFI/SAFI tables, the interface view, the meta-queue, and the
//! process-wide [`intern::Store`] for shared attributes. Protocols call
//! [`rib::Rib::rib_add`] and [`rib::Rib::rib_delete`]; nothing takes effect
//! until the meta-queue is drained with [`rib::Rib::process_queue`], which
//! runs nexthop activation and best-route selection per touched node and
//! emits FIB instructions for changed selections.
//!
//! Everything runs on one thread, cooperatively. There are no locks on the
//! hot path; an operation is atomic simply because nothing preempts it.
//!
//! ## Example usage
//!
//! The following example brings up one interface, learns its connected
//! network, and configures a static route through a neighbor on it:
//!
//! ```
//! use ribcore::prelude::*;
//!
//! fn main() -> Result<(), CmdWarning> {
//!     let mut rib = Rib::new();
//!     rib.if_add("eth0", 1, true);
//!
//!     // the connected network of eth0
//!     rib.rib_add(
//!         RouteType::Connect,
//!         RouteFlags::default(),
//!         "192.0.2.0/24".parse().unwrap(),
//!         None,
//!         None,
//!         1,
//!         VrfId::DEFAULT,
//!         0,
//!         0,
//!     )
//!     .unwrap();
//!
//!     // the operator configures a static route through a neighbor
//!     ip_route(&mut rib, "10.0.0.0/8", "192.0.2.1", None)?;
//!
//!     // nothing takes effect until the meta-queue is drained
//!     let mut fib = RecordingFib::default();
//!     rib.process_queue(&mut fib);
//!
//!     let (prefix, best) = rib.rib_match("10.1.2.3".parse().unwrap()).unwrap();
//!     assert_eq!(prefix, "10.0.0.0/8".parse().unwrap());
//!     assert_eq!(best.rtype, RouteType::Static);
//!     assert!(fib.updates.len() >= 2);
//!
//!     Ok(())
//! }
//! ```
//!
//! Communities attached to routes are never allocated directly: they are
//! acquired from the store, which deduplicates equal values and counts
//! references:
//!
//! ```
//! use ribcore::community::Community;
//! use ribcore::intern::Store;
//!
//! let store: Store<Community> = Store::new();
//! let a = store.intern("no-export 65001:100".parse::<Community>().unwrap().into());
//! let b = store.intern("no-export 65001:100".parse::<Community>().unwrap().into());
//! assert!(a.ptr_eq(&b));
//! assert_eq!(store.num_cached(), 1);
//! assert_eq!(a.refcnt(), 2);
//! ```

pub mod cmd;
pub mod community;
pub mod intern;
pub mod nexthop;
pub mod prelude;
pub mod rib;
pub mod types;

#[cfg(test)]
mod test;
