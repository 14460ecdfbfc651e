//! # Events Module
//!
//! Progress and outcome reporting for front ends.
//!
//! The engine never prints. Everything a front end may want to show
//! (files found, hash progress, sets collapsed or deferred, moves,
//! restores) is sent as an [`Event`]; the CLI turns them into a
//! progress bar, tests assert on them.
//!
//! ## Example
//! ```rust,ignore
//! let (sender, receiver) = EventChannel::new();
//!
//! std::thread::spawn(move || {
//!     for event in receiver.iter() {
//!         match event {
//!             Event::Hash(HashEvent::Progress(p)) => println!("Hashed {}/{}", p.completed, p.total),
//!             Event::Quarantine(QuarantineEvent::Moved { from, .. }) => println!("Moved {}", from.display()),
//!             _ => {}
//!         }
//!     }
//! });
//!
//! let engine = DedupEngine::open(config)?.with_events(sender);
//! ```

mod channel;
mod types;

pub use channel::{null_sender, EventChannel, EventReceiver, EventSender};
pub use types::*;
