pub mod post;

pub use post::{Decision, PostId, TrackedState, Verdict};
