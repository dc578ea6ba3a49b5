//! Integration tests for the modcell station controller.
//!
//! Every test builds a complete station from the sample configurations over
//! the simulated process image and drives it with station inputs, the way
//! the supervisory system would. Time is paused, so motor travel and
//! timeouts run in virtual time.

mod integration;
