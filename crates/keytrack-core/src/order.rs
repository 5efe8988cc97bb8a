//! Shape-order counters
//!
//! The frame-sequence coordinator owns a monotonically increasing draw
//! order per (camera, frame). The core draws from the same counter when
//! interpolation inserts frames, so the handle is shared and cloneable.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::{CameraId, FrameIndex};

/// Shared handle to the per-(camera, frame) "next shape order" counters
#[derive(Debug, Clone, Default)]
pub struct ShapeOrders {
    counters: Arc<Mutex<HashMap<(CameraId, FrameIndex), u32>>>,
}

impl ShapeOrders {
    pub fn new() -> Self {
        ShapeOrders::default()
    }

    /// Take the next order for a (camera, frame)
    pub fn next(&self, camera: &CameraId, frame: FrameIndex) -> u32 {
        let mut counters = self.counters.lock();
        let counter = counters.entry((camera.clone(), frame)).or_insert(0);
        let order = *counter;
        *counter += 1;
        order
    }

    /// The order `next` would hand out, without consuming it
    pub fn peek(&self, camera: &CameraId, frame: FrameIndex) -> u32 {
        self.counters
            .lock()
            .get(&(camera.clone(), frame))
            .copied()
            .unwrap_or(0)
    }

    /// Make sure later orders stay above one that already exists
    pub fn observe(&self, camera: &CameraId, frame: FrameIndex, order: u32) {
        let mut counters = self.counters.lock();
        let counter = counters.entry((camera.clone(), frame)).or_insert(0);
        *counter = (*counter).max(order.saturating_add(1));
    }

    pub fn reset(&self) {
        self.counters.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_per_slot() {
        let orders = ShapeOrders::new();
        let front = CameraId::from("front");
        let rear = CameraId::from("rear");

        assert_eq!(orders.next(&front, 0), 0);
        assert_eq!(orders.next(&front, 0), 1);
        assert_eq!(orders.next(&front, 1), 0);
        assert_eq!(orders.next(&rear, 0), 0);
        assert_eq!(orders.peek(&front, 0), 2);
    }

    #[test]
    fn test_shared_between_clones() {
        let orders = ShapeOrders::new();
        let coordinator = orders.clone();
        let front = CameraId::from("front");

        orders.next(&front, 3);
        assert_eq!(coordinator.next(&front, 3), 1);
    }

    #[test]
    fn test_observe_never_moves_backwards() {
        let orders = ShapeOrders::new();
        let front = CameraId::from("front");

        orders.observe(&front, 0, 4);
        assert_eq!(orders.peek(&front, 0), 5);
        orders.observe(&front, 0, 1);
        assert_eq!(orders.next(&front, 0), 5);

        orders.reset();
        assert_eq!(orders.peek(&front, 0), 0);
    }
}
