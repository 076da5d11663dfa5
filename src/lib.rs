// src/lib.rs

pub mod acp;

pub use acp::error::{AcpError, Result};
pub use acp::ids::generate_short_id;
