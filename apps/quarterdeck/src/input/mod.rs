pub mod completion;
pub mod shadow;

pub use completion::{CompletionCoordinator, CompletionOutcome};
pub use shadow::{ShadowLineBuffer, ShadowTracker, TrackedInput};
