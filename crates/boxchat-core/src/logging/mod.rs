//! JSONL logging
//!
//! Each client process appends to its own file, one JSON object per line:
//!
//! ```text
//! logs/
//! ├── 2026-10-18_cli.jsonl
//! └── 2026-10-18_alice.jsonl
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use boxchat_core::logging::JsonlLayer;
//! use tracing_subscriber::prelude::*;
//!
//! let jsonl = JsonlLayer::new("./logs", "cli")?;
//! tracing_subscriber::registry()
//!     .with(jsonl)
//!     .with(tracing_subscriber::fmt::layer())
//!     .init();
//! ```
//!
//! ```bash
//! # Everything the sync engine absorbed
//! jq 'select(.level == "warn" and (.target | startswith("boxchat_core::sync")))' logs/*.jsonl
//! ```

pub mod entry;
pub mod layer;

pub use entry::LogEntry;
pub use layer::JsonlLayer;
