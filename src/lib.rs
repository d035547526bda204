pub mod backend;
pub mod catalog;
pub mod classify;
pub mod compiler;
pub mod engine;
pub mod error;
pub mod i18n;
pub mod report;
pub mod runner;
pub mod submission;
pub mod toolchain;
pub mod types;
pub mod workspace;

// Re-export the message catalog lookups
pub use crate::i18n::{t, t_with_args};
