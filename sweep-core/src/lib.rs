#![no_std]

// Shared logic for the synchronized servo sweep controller.
//
// This crate stays portable across host tooling and embedded shells by
// avoiding the Rust standard library; embedders supply the bus transport
// and packet-protocol plumbing behind the traits in [`bus`].

pub mod bus;
pub mod codec;
pub mod config;
pub mod poll;
pub mod sequencer;
pub mod sync_write;
pub mod telemetry;
pub mod torque;
