//! Client for the ag.dev agent API.
//!
//! The client is layered leaf-first:
//!
//! - [`client`]: authenticated JSON transport behind the [`Transport`] trait
//! - [`agents`]: agent definitions, runs, and the run polling loop
//! - [`batch`]: ordered fan-out/fan-in of many runs over one agent
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use outreach_agents::agdev::{AgentsApi, HttpTransport, TransportConfig, WaitOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = HttpTransport::new(TransportConfig::new("https://api.ag.dev", "key"))?;
//! let api = AgentsApi::new(Arc::new(transport));
//!
//! let profile = api.agent("agent_123");
//! let result = profile
//!     .run(&serde_json::json!({ "company_name": "Acme" }), WaitOptions::default())
//!     .await?;
//! println!("{:?}", result.result_data);
//! # Ok(())
//! # }
//! ```

pub mod agents;
pub mod batch;
pub mod client;
pub mod error;
pub mod types;

pub use agents::{Agent, AgentsApi, WaitOptions};
pub use batch::{BatchItem, BatchOptions, BatchOutcome};
pub use client::{
    AuthScheme, DEFAULT_REQUEST_TIMEOUT, HttpTransport, Transport, TransportConfig, TransportExt,
    encode_query, encode_segment,
};
pub use error::{Error, Result};
pub use types::*;
