//! The sink folder: layout, path resolution, import, and relocation.

pub mod layout;
pub mod mover;
pub mod pipeline;
pub mod queue;
pub mod resolver;
pub mod worker;

pub use layout::SinkLayout;
pub use mover::{MovedFile, OutcomeMover};
pub use pipeline::{Disposition, SinkPipeline};
pub use queue::{Claim, FsWorkQueue, MemoryWorkQueue, WorkQueue};
pub use resolver::{IgnoreReason, InvalidFile, PathResolver, Rejection, SportDirPolicy};
pub use worker::ImportWorker;
