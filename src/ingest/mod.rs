//! Frame source.
//!
//! A `CaptureSession` drives one `CaptureDevice` and delivers each captured frame, stamped
//! with the device orientation at capture time, to a single consumer callback. Frames
//! arriving while the consumer is busy are discarded rather than queued.
//!
//! The ingestion layer MUST NOT:
//! - Block the capture thread on downstream work
//! - Log raw frame content

pub mod device;
pub mod orientation;
pub mod session;
pub mod synthetic;

pub use device::{discover, CaptureDevice, DevicePosition, DeviceType, SessionPreset};
pub use orientation::OrientationSensor;
pub use session::{CaptureSession, CaptureStats, SessionConfig};
pub use synthetic::SyntheticCamera;
