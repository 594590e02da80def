#![warn(missing_docs)]
//! Wire protocol and transport substrates for the chromabound solver.
//!
//! The engine talks to the process group through four narrow traits, one per
//! thread and direction (see [`group`]). Two substrates implement them: an
//! in-memory channel group for tests and single-process runs, and a
//! multi-process group over pipes for real distributed runs. Frames on the
//! byte-stream substrate are length-prefixed with fixed integer payloads
//! (see [`framing`]).

mod channel;
mod framing;
mod group;
mod messages;
#[cfg(unix)]
mod process;

pub use channel::{channel_group, ChannelBoundFeed, ChannelCoordinator, ChannelWorker};
pub use framing::{FrameError, FrameReader, FrameWriter, MAX_FRAME_SIZE};
pub use group::{BoundFeed, CoordinatorFeed, CoordinatorLink, Rank, TransportError, WorkerLink};
pub use messages::{Frame, Report, Tag, TERMINATE};
#[cfg(unix)]
pub use process::{
    spawn_group, worker_from_env, ProcessChildren, ProcessCoordinator, ProcessWorker,
    IPC_FDS_ENV, WORKER_FLAG,
};
