//! Test helper modules for trigdeck-player integration tests
//!
//! Provides a simulated rig: manual clock, pin bank, simulated audio
//! sources and a queue transport wired into a [`Controller`].

#![allow(dead_code)]

pub mod rig;

pub use rig::{input, RigBuilder, TestRig};
