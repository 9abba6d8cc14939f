//! # Agent Harness
//!
//! Developer tooling around a graph database codebase and a local AI agent
//! server.
//!
//! Two halves share one binary (`ah`):
//!
//! - **Usage export** walks a source tree, finds database call sites, expands
//!   each into a self-contained block with the scanner from
//!   `agent-harness-core`, and writes grouped plain-text bundles (plus the
//!   live database schema) for AI assistants and documentation.
//! - **Agent tools** send a prompt to a named agent on a local agent server,
//!   starting the server when needed, and print the reply with a session id
//!   for follow-ups.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────────┐
//! │   walk   │──▶│  scan +  │──▶│   export     │──▶ exports/*.txt
//! │ (files)  │   │ markers  │   │  (bundles)   │
//! └──────────┘   └──────────┘   └──────────────┘
//!
//! ┌──────────┐   ┌──────────┐   ┌──────────────┐
//! │  tools   │──▶│  agent   │──▶│ agent server │
//! │ (prompt) │   │  client  │   │   (HTTP)     │
//! └──────────┘   └──────────┘   └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`walk`] | Source tree traversal |
//! | [`export`] | Usage block and bundle export |
//! | [`progress`] | Export progress reporting |
//! | [`schema`] | Database schema export |
//! | [`agent`] | Agent server backend, lifecycle, and client |
//! | [`prompt`] | Prompt input and decoration |
//! | [`session_log`] | Per-session transcripts |
//! | [`tools`] | The agent-backed tools |

pub mod agent;
pub mod config;
pub mod export;
pub mod models;
pub mod progress;
pub mod prompt;
pub mod schema;
pub mod session_log;
pub mod tools;
pub mod walk;
