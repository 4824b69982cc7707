pub mod outcome;
pub mod request;
pub mod workout;

pub use outcome::{ErrorKind, ImportFailure, ImportOutcome};
pub use request::ImportRequest;
pub use workout::{SportId, UserId, WorkoutExtension, WorkoutId};
