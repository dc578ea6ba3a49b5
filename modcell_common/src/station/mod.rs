//! Station-level shared definitions.
//!
//! - [`config`] - The station file (`[station]`, `[timing]`, `[racks]`, ...)
//! - [`codes`] - Error and message code tables published on the station topics

pub mod codes;
pub mod config;
