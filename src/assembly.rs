//! Element-local assembly of weak form contributions.
pub mod local;
