//! # Agent Harness Core
//!
//! Pure, I/O-free logic shared by the `ah` usage exporter: the
//! block-expansion scanner and the trigger-marker pass that feeds it.
//!
//! This crate contains no tokio, filesystem, or network code. Every
//! function is a pure function of its inputs and is safe to call
//! concurrently for independent files.

pub mod markers;
pub mod scan;
