//! Outreach agents
//!
//! Turns a list of company names into researched profiles, contacts and draft
//! outreach emails by chaining remote ag.dev agents, with Arcade used to save
//! the emails as Gmail drafts.
//!
//! # Modules
//!
//! - [`agdev`]: transport, run orchestration and batching for ag.dev agents
//! - [`arcade`]: tool authorization and execution against Arcade
//! - [`pipeline`]: the fixed profile/contacts/email stage graph
//! - [`config`]: CLI, file and environment configuration
//! - [`companies`]: company list loading
//! - [`snapshot`]: timestamped JSON snapshots

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]

pub mod agdev;
pub mod arcade;
pub mod companies;
pub mod config;
pub mod pipeline;
pub mod snapshot;
