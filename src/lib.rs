//! # 8-bit Simulator Backend
//!
//! Backend service for an educational 8-bit computer simulator. It serves
//! read-only reference data (the instruction set and example programs) and
//! tracks anonymous per-visitor simulator sessions, each carrying a
//! JSON-structured log of every code snippet the visitor executed.
//!
//! The CPU emulation itself runs client-side; this service only records
//! what was executed. Sessions are keyed by unguessable random ids, stored
//! in SQLite, and reclaimed by a retention sweeper once they exceed a
//! configurable age (10 days by default).
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use eightbit_backend::session::SessionManager;
//! use eightbit_backend::store::SessionStore;
//!
//! let store = Arc::new(SessionStore::in_memory().unwrap());
//! let manager = SessionManager::new(store.clone());
//!
//! let session = manager.start_session("1.2.3.4").unwrap();
//! let entries = manager.append_code(&session.id, Some("LDA 5".to_string())).unwrap();
//!
//! assert_eq!(entries, 1);
//! ```

pub mod config;
pub mod history;
pub mod metrics;
pub mod reference;
pub mod server;
pub mod session;
pub mod store;
pub mod sweeper;

pub use session::{Session, SessionManager};
pub use store::{SessionStore, StoreError};
