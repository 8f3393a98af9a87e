//! Actor runtime for supervised, serially-scheduled workers.
//!
//! Every actor owns a bounded [`Mailbox`] drained one message at a time on a
//! Tokio task. Spawning runs the actor's prelaunch hook before a reference is
//! handed out, so a failed prelaunch never yields a live address. Actors are
//! stopped with [`ActorRef::kill`] and report their exit to an optional
//! watcher as a [`Terminated`] notice.

mod address;
mod class;
mod error;
mod mailbox;
mod panic;
mod runtime;
mod spawn;
mod supervisor;

pub use address::Address;
pub use class::TaskClass;
pub use error::{SendError, SpawnError};
pub use mailbox::{Mailbox, MailboxReceiver, MailboxSender};
pub use panic::{join_error_panic_message, panic_message};
pub use runtime::ActorRuntime;
pub use spawn::{runtime_handle, spawn, spawn_named_thread};
pub use supervisor::{DEFAULT_MAILBOX_CAPACITY, Actor, ActorContext, ActorExit, ActorExitKind, ActorFlow, ActorRef, ActorSpec, KillMode, Terminated};
