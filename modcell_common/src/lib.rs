//! Modcell Common Library
//!
//! Shared configuration, I/O contract and code tables for the modular cell
//! station controller.
//!
//! # Module Structure
//!
//! - [`config`] - Configuration loading traits and types
//! - [`consts`] - System-wide constants
//! - [`io`] - Role-based I/O configuration and the process-image contract
//! - [`station`] - Station configuration and error/message code tables
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use modcell_common::prelude::*;
//! use modcell_common::station::codes::ErrorCode;
//! ```

pub mod config;
pub mod consts;
pub mod io;
pub mod prelude;
pub mod station;
