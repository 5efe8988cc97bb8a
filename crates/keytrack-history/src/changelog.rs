//! Bounded undo/redo stack

use std::collections::VecDeque;

use tracing::{debug, trace};

use crate::{CommitState, PreserveToken, Replay};

/// Change log configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeLogConfig {
    /// Maximum number of entries kept; the oldest is evicted beyond this
    pub capacity: usize,
}

impl Default for ChangeLogConfig {
    fn default() -> Self {
        Self { capacity: 20 }
    }
}

impl ChangeLogConfig {
    /// Keep every entry (replay tooling, fuzzing)
    pub fn unbounded() -> Self {
        Self { capacity: usize::MAX }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { capacity }
    }
}

/// One recorded mutation
#[derive(Debug, Clone, PartialEq)]
pub struct Entry<S> {
    pub before: S,
    pub after: S,
}

/// Undo/redo stack of snapshot pairs
///
/// `pointer` counts applied entries: `entries[..pointer]` can be undone,
/// `entries[pointer..]` can be redone.
#[derive(Debug, Clone)]
pub struct ChangeLog<S> {
    entries: VecDeque<Entry<S>>,
    pointer: usize,
    config: ChangeLogConfig,
    commit: CommitState<S>,
    next_token: u64,
}

impl<S> Default for ChangeLog<S> {
    fn default() -> Self {
        Self::new(ChangeLogConfig::default())
    }
}

impl<S> ChangeLog<S> {
    pub fn new(config: ChangeLogConfig) -> Self {
        ChangeLog {
            entries: VecDeque::new(),
            pointer: 0,
            config,
            commit: CommitState::Idle,
            next_token: 0,
        }
    }

    pub fn config(&self) -> ChangeLogConfig {
        self.config
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pointer(&self) -> usize {
        self.pointer
    }

    pub fn can_undo(&self) -> bool {
        self.pointer > 0
    }

    pub fn can_redo(&self) -> bool {
        self.pointer < self.entries.len()
    }

    /// Entry the next `undo` would revert
    pub fn peek_undo(&self) -> Option<&Entry<S>> {
        self.pointer.checked_sub(1).and_then(|i| self.entries.get(i))
    }

    /// Entry the next `redo` would reapply
    pub fn peek_redo(&self) -> Option<&Entry<S>> {
        self.entries.get(self.pointer)
    }

    pub fn commit_state(&self) -> &CommitState<S> {
        &self.commit
    }

    /// Record a finished mutation
    ///
    /// Drops the redo tail, appends, and evicts the oldest entry once the
    /// capacity is exceeded. An eviction leaves the pointer where it was.
    pub fn push(&mut self, before: S, after: S) {
        if self.pointer < self.entries.len() {
            trace!(dropped = self.entries.len() - self.pointer, "redo tail truncated");
            self.entries.truncate(self.pointer);
        }

        self.entries.push_back(Entry { before, after });

        if self.entries.len() > self.config.capacity {
            self.entries.pop_front();
            trace!(capacity = self.config.capacity, "oldest entry evicted");
        } else {
            self.pointer += 1;
        }

        debug!(len = self.entries.len(), pointer = self.pointer, "change recorded");
    }

    /// Hold `before` until the matching `save`
    ///
    /// Supersedes any interaction still pending.
    pub fn preserve(&mut self, before: S) -> PreserveToken {
        self.next_token += 1;
        let token = PreserveToken(self.next_token);
        if let Some(stale) = self.commit.token() {
            debug!(%stale, %token, "pending interaction superseded");
        }
        self.commit = CommitState::Preserved { token, before };
        token
    }

    /// Complete the interaction started by `preserve`
    ///
    /// Returns false, and records nothing, for a token that is not the
    /// pending one.
    pub fn save(&mut self, token: PreserveToken, after: S) -> bool {
        self.save_with(token, |before| Some((before, after)))
    }

    /// Complete a pending interaction with a pair computed from its before-snapshot
    ///
    /// `finish` may return `None` when the interaction changed nothing; the
    /// pending state is cleared either way. Returns true only when an entry
    /// was pushed.
    pub fn save_with<F>(&mut self, token: PreserveToken, finish: F) -> bool
    where
        F: FnOnce(S) -> Option<(S, S)>,
    {
        let Some(before) = self.commit.redeem(token) else {
            debug!(%token, "stale save ignored");
            return false;
        };

        match finish(before) {
            Some((before, after)) => {
                self.push(before, after);
                true
            }
            None => {
                trace!(%token, "interaction settled without changes");
                false
            }
        }
    }

    /// Drop any pending interaction
    pub fn abandon(&mut self) {
        self.commit = CommitState::Idle;
    }

    /// Revert the most recent applied entry
    pub fn undo<R>(&mut self, target: &mut R) -> bool
    where
        R: Replay<S> + ?Sized,
    {
        if !self.can_undo() {
            return false;
        }
        self.pointer -= 1;
        target.replay(&self.entries[self.pointer].before);
        debug!(pointer = self.pointer, "undo");
        true
    }

    /// Reapply the next undone entry
    pub fn redo<R>(&mut self, target: &mut R) -> bool
    where
        R: Replay<S> + ?Sized,
    {
        if !self.can_redo() {
            return false;
        }
        target.replay(&self.entries[self.pointer].after);
        self.pointer += 1;
        debug!(pointer = self.pointer, "redo");
        true
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.pointer = 0;
        self.commit = CommitState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Replays integer snapshots into a single cell
    #[derive(Default)]
    struct Cell {
        value: i32,
        applied: usize,
    }

    impl Replay<i32> for Cell {
        fn replay(&mut self, snapshot: &i32) {
            self.value = *snapshot;
            self.applied += 1;
        }
    }

    #[test]
    fn test_capacity_caps_undo_depth() {
        let mut log = ChangeLog::new(ChangeLogConfig::default());
        for i in 0..25 {
            log.push(i, i + 1);
        }
        assert_eq!(log.len(), 20);
        assert_eq!(log.pointer(), 20);

        let mut cell = Cell::default();
        let mut undone = 0;
        while log.undo(&mut cell) {
            undone += 1;
        }
        assert_eq!(undone, 20);
        assert_eq!(cell.value, 5);
    }

    #[test]
    fn test_push_truncates_redo_tail() {
        let mut log = ChangeLog::default();
        let mut cell = Cell::default();
        log.push(0, 1);
        log.push(1, 2);
        log.push(2, 3);

        assert!(log.undo(&mut cell));
        assert!(log.undo(&mut cell));
        assert_eq!(cell.value, 1);
        assert!(log.can_redo());

        log.push(1, 10);
        assert_eq!(log.len(), 2);
        assert!(!log.can_redo());
        assert_eq!(log.peek_undo(), Some(&Entry { before: 1, after: 10 }));
    }

    #[test]
    fn test_undo_redo_bounds() {
        let mut log: ChangeLog<i32> = ChangeLog::default();
        let mut cell = Cell::default();
        assert!(!log.undo(&mut cell));
        assert!(!log.redo(&mut cell));

        log.push(0, 7);
        assert!(!log.redo(&mut cell));
        assert!(log.undo(&mut cell));
        assert!(!log.undo(&mut cell));
        assert!(log.redo(&mut cell));
        assert_eq!(cell.value, 7);
        assert_eq!(cell.applied, 2);
    }

    #[test]
    fn test_stale_save_is_ignored() {
        let mut log = ChangeLog::default();
        let first = log.preserve(1);
        let second = log.preserve(2);
        assert_ne!(first, second);

        assert!(!log.save(first, 100));
        assert!(log.is_empty());

        assert!(log.save(second, 200));
        assert_eq!(log.peek_undo(), Some(&Entry { before: 2, after: 200 }));
        assert!(log.commit_state().is_idle());
        assert!(!log.save(second, 300));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_save_with_can_settle_empty() {
        let mut log: ChangeLog<i32> = ChangeLog::default();
        let token = log.preserve(4);
        assert!(!log.save_with(token, |_| None));
        assert!(log.is_empty());
        assert!(log.commit_state().is_idle());

        let token = log.preserve(4);
        assert!(log.save_with(token, |before| Some((before, before * 2))));
        assert_eq!(log.peek_undo(), Some(&Entry { before: 4, after: 8 }));
    }

    #[test]
    fn test_eviction_keeps_pointer_after_undo() {
        let mut log = ChangeLog::new(ChangeLogConfig::with_capacity(3));
        let mut cell = Cell::default();
        for i in 0..3 {
            log.push(i, i + 1);
        }
        log.undo(&mut cell);
        log.push(2, 20);
        assert_eq!(log.pointer(), 3);
        log.push(20, 21);
        assert_eq!(log.len(), 3);
        assert_eq!(log.pointer(), 3);
        assert_eq!(log.peek_redo(), None);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Push(i32),
        Undo,
        Redo,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            any::<i32>().prop_map(Op::Push),
            Just(Op::Undo),
            Just(Op::Redo),
        ]
    }

    proptest! {
        #[test]
        fn prop_pointer_stays_in_bounds(ops in proptest::collection::vec(op(), 0..120), capacity in 1usize..25) {
            let mut log = ChangeLog::new(ChangeLogConfig::with_capacity(capacity));
            let mut cell = Cell::default();

            for op in ops {
                match op {
                    Op::Push(v) => log.push(cell.value, v),
                    Op::Undo => { log.undo(&mut cell); }
                    Op::Redo => { log.redo(&mut cell); }
                }
                prop_assert!(log.pointer() <= log.len());
                prop_assert!(log.len() <= capacity);
            }
        }
    }
}
