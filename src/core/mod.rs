//! Core data model: platforms, lifecycle stages, and the build context.

pub mod context;
pub mod platform;
pub mod stage;

pub use context::{AppIdentity, BuildContext, Roots};
pub use platform::{OutputFormat, Platform, TargetPair};
pub use stage::{Stage, StageDag};
