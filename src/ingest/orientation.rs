use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::frame::DeviceOrientation;

/// Latest device orientation, shared between whoever observes rotation and the capture
/// context that stamps it on each frame.
#[derive(Clone, Debug, Default)]
pub struct OrientationSensor {
    current: Arc<AtomicU8>,
}

impl OrientationSensor {
    pub fn new(initial: DeviceOrientation) -> Self {
        Self {
            current: Arc::new(AtomicU8::new(initial.to_u8())),
        }
    }

    pub fn set(&self, orientation: DeviceOrientation) {
        let previous = self.current.swap(orientation.to_u8(), Ordering::SeqCst);
        if previous != orientation.to_u8() {
            log::debug!(
                "device orientation {:?} -> {:?}",
                DeviceOrientation::from_u8(previous),
                orientation
            );
        }
    }

    pub fn current(&self) -> DeviceOrientation {
        DeviceOrientation::from_u8(self.current.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_orientation() {
        let sensor = OrientationSensor::new(DeviceOrientation::Portrait);
        let observer = sensor.clone();
        sensor.set(DeviceOrientation::LandscapeLeft);
        assert_eq!(observer.current(), DeviceOrientation::LandscapeLeft);
    }
}
