pub mod common;

mod carriage_timeout;
mod cold_start;
mod dicehalf_jobs;
mod estop;
mod press_force;
mod rack_refill;
