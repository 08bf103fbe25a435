//! Upload intake.
//!
//! Everything a client sends as a file passes through [`validator`] before
//! any byte touches disk.

pub mod validator;

pub use validator::{UploadEnvelope, UploadRejection, UploadValidator};
