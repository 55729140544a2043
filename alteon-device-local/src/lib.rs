//! A local stand-in for an Alteon device.
//!
//! Configuration tables live in a JSON document. Changes are buffered until
//! commit, which appends them as one event to a journal file.

pub mod device;
pub mod journal;

pub use device::LocalDevice;
