//! Role-based I/O abstraction.
//!
//! Station wiring is described once in the `[io]` section of the station
//! file. Devices never see pin names directly: the builder resolves roles
//! through [`registry::IoRegistry`] and hands each device the lines it owns
//! on the shared [`image::ProcessImage`].

pub mod config;
pub mod image;
pub mod registry;
pub mod role;
pub mod sim;
