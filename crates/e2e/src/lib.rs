//! nbcloud E2E Test Harness
//!
//! This crate drives the CasperJS browser suites for the nbcloud notebook
//! extension against a live Jupyter notebook server:
//! - Provisions an isolated home/config environment per test section
//! - Installs and enables the extension inside that environment
//! - Spawns the notebook server and waits for its runtime descriptor
//! - Runs `casperjs test` against the server URL
//! - Captures all subprocess output for post-mortem logging
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  JS Test Runner (Rust)                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  JsTestRunner                                               │
//! │    └── one TestController per section {auth, noauth}        │
//! │          ├── setup()                                        │
//! │          │     ├── IsolatedEnv (home/config/ipython/nb)     │
//! │          │     ├── jupyter nbextension / serverextension    │
//! │          │     ├── auth posture (token copy | patched ext)  │
//! │          │     └── NotebookServer (descriptor poll -> port) │
//! │          ├── launch()  -> casperjs test ... --url=...       │
//! │          ├── wait()    -> section exit code                 │
//! │          └── cleanup() -> shared log block, dirs removed    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod capture;
pub mod casper;
pub mod controller;
pub mod env;
pub mod error;
pub mod extension;
pub mod runner;
pub mod section;
pub mod server;

pub use controller::TestController;
pub use error::{E2eError, E2eResult};
pub use runner::JsTestRunner;
pub use section::TestSection;
