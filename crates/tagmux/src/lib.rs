//! tagmux - Tag-Based, Level-Multiplexed Message Exchange
//!
//! An in-memory rendezvous service for cooperating threads. A thread
//! reserves a *tag* (an opaque descriptor), other threads open the same tag
//! by a shared key, and messages travel on one of a fixed number of
//! *levels* per tag. Sends are non-blocking best-effort deliveries;
//! receives block until a send lands on the same level or a tag-wide
//! wake-up is issued.
//!
//! # Key Features
//!
//! - Bounded descriptor space with lowest-free reuse
//! - Key directory for sharing tags between unrelated threads, with an
//!   anonymous mode for descriptor-only tags
//! - Single-slot-per-epoch delivery: every registered receiver of an epoch
//!   observes the one committed payload; late receivers roll the level
//!   into the next epoch
//! - Tag-wide wake-up that releases every waiting receiver without payload
//! - Owner-only or open permission per tag, with a privileged override
//! - Read-only status report of the live (tag, level) population
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::thread;
//! use tagmux::{Config, Permission, ReceiveOutcome, SendOutcome, TagCommand, TagExchange};
//!
//! let exchange = Arc::new(TagExchange::new(Config::default()));
//! let descriptor = exchange
//!     .tag_get(42, TagCommand::Create, Permission::Any, 1000)
//!     .unwrap();
//!
//! let receiver = {
//!     let exchange = Arc::clone(&exchange);
//!     thread::spawn(move || {
//!         let mut buf = [0u8; 16];
//!         match exchange.tag_receive(descriptor, 7, &mut buf, 1000).unwrap() {
//!             ReceiveOutcome::Delivered(n) => buf[..n].to_vec(),
//!             ReceiveOutcome::Woken => Vec::new(),
//!         }
//!     })
//! };
//!
//! // Sends are best-effort: retry until the receiver is registered.
//! while exchange.tag_send(descriptor, 7, b"ping", 1000).unwrap() == SendOutcome::Discarded {
//!     thread::yield_now();
//! }
//!
//! assert_eq!(receiver.join().unwrap(), b"ping");
//! ```

mod bitmask;
mod config;
mod directory;
mod error;
mod exchange;
mod invariants;
mod level;
mod status;
mod tag;

pub use config::{Config, ANONYMOUS_KEY, COMPACT_CONFIG, WIDE_CONFIG};
pub use error::TagError;
pub use exchange::{
    CtlCommand, CtlOutcome, ReceiveOutcome, SendOutcome, TagCommand, TagExchange,
};
pub use tag::Permission;
