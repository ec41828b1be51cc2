//! Pure-Rust client for the `adb` host server wire protocols.
//!
//! Speaks host services (device enumeration and tracking), the file-sync
//! protocol (push/pull/stat/list), shell v2 (multiplexed remote command
//! I/O) and framebuffer capture over a plain TCP connection — no `adb`
//! binary, no native library.

pub mod device;
pub mod error;
pub mod host;
pub mod sync;

mod framebuffer;
mod shell;
mod wire;

pub use device::{DeviceRecord, DeviceState};
pub use error::{AdbError, Result};
pub use host::{DeviceEvents, HostClient};
pub use sync::{StatEntry, SyncClient};

// The decoded framebuffer type, so callers need not name the image crate.
pub use image::RgbaImage;


#[cfg(test)]
mod framebuffer_test;
