//! Route handlers.

pub mod echo;
pub mod system;
