//! Application runtime composition modules.

pub(crate) mod cache_commands;
pub(crate) mod progress_manager;
pub(crate) mod runtime;
pub(crate) mod terminal;
