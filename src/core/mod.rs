//! Bundle engine internals
//!
//! Layered bottom-up: [`path`] and [`vfs`] address and store entries,
//! [`sniff`] and [`container`] deal with the archive on disk, and
//! [`manifest`] and [`ports`] give the tree its meaning.

pub mod config;
pub mod container;
pub mod copy;
pub mod error;
pub mod manifest;
pub mod path;
pub mod ports;
pub mod sniff;
pub mod validation;
pub mod vfs;


pub use container::Bundle;
