/*
 * Kiln - Confined Tool-Calling Agent
 * File Path: src/lib.rs
 * Responsibility: Shared library modules
 */

pub mod actions;
pub mod agent_loop;
pub mod audit;
pub mod config;
pub mod dispatch;
pub mod guard;
pub mod init;
pub mod llm;
pub mod registry;
pub mod repl;

pub use dispatch::Dispatcher;
pub use guard::{Workspace, is_within};
pub use registry::Registry;
