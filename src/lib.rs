//! actor-sync: Actor concurrency core for a language runtime
//!
//! This crate provides the synchronization layer of an actor system:
//! isolated actors that exchange values through mailboxes and rendezvous
//! points, plus a process-wide lock with a stop-the-world barrier.
//!
//! # Architecture
//!
//! - **Actors**: Isolated units with identity, owned threads, a mailbox and
//!   a waiting list of takers
//! - **Baskets**: Transfer envelopes recording how a value crosses actors
//!   (shared, copied, moved, or raised as an exception)
//! - **Mailbox**: `send` / `recv` / `recv_if` over the incoming port
//! - **Rendezvous**: `yield` / `take` over the outgoing port
//! - **Select**: wait on several receives, takes and one yield at once
//! - **Runtime**: registry, Runtime Lock and barrier
//!
//! # Serialization
//!
//! Values that are neither immediate nor shareable are deep-copied when
//! they cross actors. The copy walks the object graph once, so cycles and
//! shared children survive; leaf bodies are rebuilt through bincode. This
//! is an internal format that never leaves the process.
//!
//! # Usage
//!
//! ```rust,no_run
//! use actor_sync::{Runtime, RuntimeConfig, Value};
//!
//! let rt = Runtime::new(RuntimeConfig::default());
//! let worker = rt
//!     .create_actor(Some("doubler"), vec![], |ctx, _| {
//!         let n = ctx.recv()?.as_int().unwrap_or(0);
//!         Ok(Value::Int(n * 2))
//!     })
//!     .unwrap();
//!
//! worker.send(Value::Int(21)).unwrap();
//! assert_eq!(worker.take().unwrap(), Value::Int(42));
//! rt.shutdown().unwrap();
//! ```

pub mod actor;
pub mod basket;
pub mod context;
pub mod error;
mod mailbox;
pub mod runtime;
pub mod select;
pub mod serialize;
pub mod value;
pub mod wait;
mod waiting;

// Re-exports
pub use actor::{Actor, ActorId, ActorRef, ActorStatus};
pub use basket::{Basket, BasketKind};
pub use context::ActorContext;
pub use error::{ActorError, Port, Result};
pub use runtime::{current_actor, BarrierView, Runtime, RuntimeConfig, RuntimeGuard};
pub use select::{Action, Offer, Selector, Source};
pub use serialize::{DefaultObjectModel, ObjectModel};
pub use value::{FileHandle, MapKey, ObjRef, Object, Value};
pub use wait::{WaitStatus, Wakeup};
