//! Frame-level deltas
//!
//! A leaf delta pairs the before and after value of every frame slot a
//! single operation touched. `None` means the slot was empty.

use std::collections::BTreeMap;

use crate::{Attributes, FrameIndex, FrameRecord};

/// Before/after values per touched frame slot
#[derive(Debug, Clone, PartialEq)]
pub struct LeafDelta<T> {
    pub before: BTreeMap<FrameIndex, Option<T>>,
    pub after: BTreeMap<FrameIndex, Option<T>>,
}

/// Delta of one camera track's frame records
pub type TrackDelta = LeafDelta<FrameRecord>;

/// Delta of an instance's dynamic attributes on one camera
pub type DynamicDelta = LeafDelta<Attributes>;

impl<T> Default for LeafDelta<T> {
    fn default() -> Self {
        Self {
            before: BTreeMap::new(),
            after: BTreeMap::new(),
        }
    }
}

impl<T: Clone + PartialEq> LeafDelta<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a transition of `frame`
    ///
    /// The first recorded before-value of a slot wins; the after-value is
    /// always the latest. Slots that end where they started are dropped.
    pub fn record(&mut self, frame: FrameIndex, before: Option<T>, after: Option<T>) {
        let before = self.before.entry(frame).or_insert(before);
        if *before == after {
            self.before.remove(&frame);
            self.after.remove(&frame);
        } else {
            self.after.insert(frame, after);
        }
    }

    /// Fold a later delta into this one
    pub fn merge(&mut self, mut later: LeafDelta<T>) {
        for (frame, before) in later.before {
            let after = later.after.remove(&frame).unwrap_or(None);
            self.record(frame, before, after);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.after.is_empty()
    }

    pub fn len(&self) -> usize {
        self.after.len()
    }

    /// Touched frame indices in ascending order
    pub fn frames(&self) -> impl Iterator<Item = FrameIndex> + '_ {
        self.after.keys().copied()
    }

    /// Frames this delta removed
    pub fn removed(&self) -> impl Iterator<Item = FrameIndex> + '_ {
        self.after
            .iter()
            .filter(|(_, value)| value.is_none())
            .map(|(frame, _)| *frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_before_wins() {
        let mut delta: LeafDelta<u32> = LeafDelta::new();
        delta.record(1, None, Some(10));
        delta.record(1, Some(10), Some(20));

        assert_eq!(delta.before[&1], None);
        assert_eq!(delta.after[&1], Some(20));
    }

    #[test]
    fn test_round_trip_slot_is_dropped() {
        let mut delta: LeafDelta<u32> = LeafDelta::new();
        delta.record(1, Some(5), Some(6));
        delta.record(1, Some(6), Some(5));
        assert!(delta.is_empty());
        assert!(delta.before.is_empty());

        delta.record(2, Some(1), Some(1));
        assert!(delta.is_empty());
    }

    #[test]
    fn test_merge_and_removed() {
        let mut first: LeafDelta<u32> = LeafDelta::new();
        first.record(1, Some(1), Some(2));

        let mut second: LeafDelta<u32> = LeafDelta::new();
        second.record(1, Some(2), None);
        second.record(3, None, Some(9));

        first.merge(second);
        assert_eq!(first.len(), 2);
        assert_eq!(first.before[&1], Some(1));
        assert_eq!(first.removed().collect::<Vec<_>>(), vec![1]);
        assert_eq!(first.frames().collect::<Vec<_>>(), vec![1, 3]);
    }
}
