//! The per-frame render object queue.

use crate::error::CapacityError;
use crate::objects::RenderObject;

/// Objects submitted for the current frame, in submission order.
///
/// Past its capacity the queue keeps the earliest submissions and drops new
/// ones. The first drop of a frame is logged; later ones are only counted.
#[derive(Debug)]
pub struct RenderQueue {
    objects: Vec<RenderObject>,
    capacity: usize,
    dropped: usize,
}

impl RenderQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            objects: Vec::new(),
            capacity,
            dropped: 0,
        }
    }

    pub fn add(&mut self, object: RenderObject) -> Result<(), CapacityError> {
        if self.objects.len() >= self.capacity {
            if self.dropped == 0 {
                log::warn!(
                    "Render queue limit of {} reached; dropping {} object and later submissions this frame",
                    self.capacity,
                    object.kind()
                );
            }
            self.dropped += 1;
            return Err(CapacityError {
                what: "render queue",
                capacity: self.capacity,
            });
        }
        self.objects.push(object);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Submissions refused this frame.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn objects(&self) -> &[RenderObject] {
        &self.objects
    }

    /// Take every queued object and the drop count, leaving the queue empty.
    pub fn drain(&mut self) -> (Vec<RenderObject>, usize) {
        let dropped = std::mem::take(&mut self.dropped);
        (std::mem::take(&mut self.objects), dropped)
    }

    /// Discard this frame's submissions.
    pub fn clear(&mut self) {
        self.objects.clear();
        self.dropped = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn point(x: f32) -> RenderObject {
        RenderObject::Point {
            position: Vec3::new(x, 0.0, 0.0),
            size: 1.0,
            color: Vec3::ONE,
        }
    }

    #[test]
    fn test_overflow_keeps_earliest() {
        let mut queue = RenderQueue::new(3);
        for i in 0..5 {
            let result = queue.add(point(i as f32));
            assert_eq!(result.is_ok(), i < 3);
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.dropped(), 2);
        let (objects, dropped) = queue.drain();
        assert_eq!(dropped, 2);
        let xs: Vec<f32> = objects
            .iter()
            .map(|o| match o {
                RenderObject::Point { position, .. } => position.x,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(xs, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_drain_leaves_queue_empty() {
        let mut queue = RenderQueue::new(8);
        queue.add(point(0.0)).unwrap();
        let _ = queue.drain();
        assert!(queue.is_empty());
        assert_eq!(queue.dropped(), 0);
    }

    #[test]
    fn test_clear_discards_submissions() {
        let mut queue = RenderQueue::new(1);
        queue.add(point(0.0)).unwrap();
        assert!(queue.add(point(1.0)).is_err());
        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.add(point(2.0)).is_ok());
    }
}
