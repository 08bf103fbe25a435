//! Storage subsystem.
//!
//! # Data Flow
//! ```text
//! validated upload
//!     → naming.rs (random token, display name)
//!     → layout.rs (raw / preprocessed / output paths per engine)
//!     → orchestrator writes files
//!     → retention.rs (background deletion after the retention age)
//! ```

pub mod layout;
pub mod naming;
pub mod retention;

pub use layout::StorageLayout;
pub use naming::FileIdentity;
pub use retention::{RetentionSweeper, SweepReport};
