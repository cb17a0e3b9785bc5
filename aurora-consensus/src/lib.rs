pub mod engine;
pub mod stage;

pub use engine::{Engine, Outbound, SharedState};
pub use stage::{Role, Stage};
