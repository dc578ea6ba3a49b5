//! # Modcell Control Library
//!
//! Event-driven controller for modular cell workstations. Every device,
//! composite, service and the station supervisor runs as an active object:
//! a tokio task that owns a bounded inbox and a hierarchical state machine,
//! and talks to its peers only through posted events and published topics.
//!
//! ## Layers
//!
//! 1. **Runtime**: active objects, topic publishers, HSM engine, timers
//! 2. **Devices**: sensors, motors, clamp, status LED, blinker, force sensor, NFC
//! 3. **Composites**: carriage, press, dice-half rack, plate racks
//! 4. **Services**: jobs the supervisory system can run
//! 5. **Station**: supervisor, LED policy, control loop and assembly

pub mod composite;
pub mod device;
pub mod error;
pub mod runtime;
pub mod service;
pub mod station;
