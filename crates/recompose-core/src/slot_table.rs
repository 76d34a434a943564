//! Positional memo storage for one composer.
//!
//! The table is a flat arena of cells addressed by an explicit cursor. A pass
//! walks it front to back: `next_slot` claims the cell under the cursor,
//! `start_group`/`end_group` bracket a keyed region. Groups record how many
//! cells they own, so a region that a later pass skips (a branch not taken, a
//! loop item that disappeared) can be found and dropped as a unit, and a keyed
//! region that moved (a reordered loop item) can be pulled back under the
//! cursor with its cells intact.
//!
//! Cells dropped from the table run their forget hook, which is how effects in
//! a discarded branch get cleaned up.

use std::any::Any;
use std::fmt;
use std::ops::Range;

use smallvec::SmallVec;

use crate::error::catch_panic;

pub type GroupKey = u64;

/// Runs once when the cell holding it leaves the table.
pub type ForgetHook = Box<dyn FnOnce()>;

enum Slot {
    Empty,
    Group {
        key: GroupKey,
        len: usize,
    },
    Value {
        value: Box<dyn Any>,
        on_forget: Option<ForgetHook>,
    },
}

impl Slot {
    /// Number of cells this slot covers, including a group's body.
    fn span(&self) -> usize {
        match self {
            Slot::Group { len, .. } => len + 1,
            _ => 1,
        }
    }
}

struct GroupFrame {
    start: usize,
    key: GroupKey,
    // exclusive; kept current as cells are inserted or removed inside
    end: usize,
}

#[derive(Default)]
pub struct SlotTable {
    slots: Vec<Slot>,
    cursor: usize,
    current: Option<usize>,
    groups: SmallVec<[GroupFrame; 8]>,
    // messages of forget hooks that panicked, until the owner collects them
    hook_failures: Vec<String>,
}

impl SlotTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn group_depth(&self) -> usize {
        self.groups.len()
    }

    pub fn begin_pass(&mut self) {
        self.cursor = 0;
        self.current = None;
        self.groups.clear();
    }

    /// Closes any group the pass left open and drops every cell the pass
    /// did not reach.
    pub fn end_pass(&mut self) {
        while !self.groups.is_empty() {
            log::warn!("group left open at end of pass; closing it");
            self.end_group();
        }
        let len = self.slots.len();
        if self.cursor < len {
            self.remove_range(self.cursor..len);
        }
        self.current = None;
    }

    /// Abandons a pass that failed part way. Nothing is dropped; open groups
    /// keep every cell they own so the next pass can realign.
    pub fn abort_pass(&mut self) {
        while let Some(frame) = self.groups.pop() {
            if let Some(Slot::Group { len, .. }) = self.slots.get_mut(frame.start) {
                *len = frame.end - frame.start - 1;
            }
        }
        self.cursor = 0;
        self.current = None;
    }

    pub fn start_group(&mut self, key: GroupKey) {
        let at = self.cursor;
        let end = self.frame_end();
        match self.find_group(at, end, key) {
            Some(found) => {
                let span = self.slots[found].span();
                if found != at {
                    log::debug!("group {key} moved from slot {found} to {at}");
                    self.slots[at..found + span].rotate_right(span);
                }
                self.groups.push(GroupFrame {
                    start: at,
                    key,
                    end: at + span,
                });
            }
            None => {
                self.insert_at(at, Slot::Group { key, len: 0 });
                self.groups.push(GroupFrame {
                    start: at,
                    key,
                    end: at + 1,
                });
            }
        }
        self.cursor = at + 1;
        self.current = None;
    }

    pub fn end_group(&mut self) {
        let Some(frame) = self.groups.pop() else {
            log::warn!("end_group called without a matching start_group");
            return;
        };
        debug_assert!(
            self.cursor > frame.start && self.cursor <= frame.end,
            "slot cursor {} escaped group {} ({}..{})",
            self.cursor,
            frame.key,
            frame.start,
            frame.end
        );
        if self.cursor < frame.end {
            self.remove_range(self.cursor..frame.end);
        }
        let body = self.cursor - frame.start - 1;
        if let Some(Slot::Group { len, .. }) = self.slots.get_mut(frame.start) {
            *len = body;
        }
        self.current = None;
    }

    /// Claims the cell under the cursor and advances past it.
    pub fn next_slot(&mut self) -> usize {
        let at = self.cursor;
        loop {
            if at >= self.frame_end() {
                self.insert_at(at, Slot::Empty);
                break;
            }
            let (key, len) = match &self.slots[at] {
                Slot::Group { key, len } => (*key, *len),
                _ => break,
            };
            // The branch that owned this group is gone.
            log::debug!("slot {at}: expected a value, found group {key}; dropping it");
            self.remove_range(at..at + len + 1);
        }
        self.cursor = at + 1;
        self.current = Some(at);
        at
    }

    /// Value of the cell last claimed by `next_slot`.
    pub fn get_slot(&self) -> Option<&dyn Any> {
        match self.current.and_then(|at| self.slots.get(at)) {
            Some(Slot::Value { value, .. }) => Some(&**value),
            _ => None,
        }
    }

    pub fn set_slot(&mut self, value: Box<dyn Any>) {
        self.store(value, None);
    }

    pub fn set_slot_with_forget(&mut self, value: Box<dyn Any>, on_forget: ForgetHook) {
        self.store(value, Some(on_forget));
    }

    pub fn value_at<T: 'static>(&self, index: usize) -> Option<&T> {
        match self.slots.get(index) {
            Some(Slot::Value { value, .. }) => value.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Panic messages of forget hooks run since the last call.
    pub fn take_hook_failures(&mut self) -> Vec<String> {
        std::mem::take(&mut self.hook_failures)
    }

    /// Drops every cell, running forget hooks.
    pub fn clear(&mut self) {
        self.groups.clear();
        let len = self.slots.len();
        self.remove_range(0..len);
        self.cursor = 0;
        self.current = None;
    }

    fn store(&mut self, value: Box<dyn Any>, on_forget: Option<ForgetHook>) {
        let Some(at) = self.current else {
            log::error!("set_slot called before next_slot; value discarded");
            return;
        };
        let previous = std::mem::replace(&mut self.slots[at], Slot::Value { value, on_forget });
        if let Slot::Value {
            on_forget: Some(hook),
            ..
        } = previous
        {
            self.run_hook(hook);
        }
    }

    fn frame_end(&self) -> usize {
        self.groups
            .last()
            .map(|g| g.end)
            .unwrap_or(self.slots.len())
    }

    fn find_group(&self, from: usize, end: usize, key: GroupKey) -> Option<usize> {
        let mut i = from;
        while i < end {
            match &self.slots[i] {
                Slot::Group { key: k, .. } if *k == key => return Some(i),
                slot => i += slot.span(),
            }
        }
        None
    }

    fn insert_at(&mut self, at: usize, slot: Slot) {
        self.slots.insert(at, slot);
        for frame in self.groups.iter_mut() {
            frame.end += 1;
        }
    }

    fn remove_range(&mut self, range: Range<usize>) {
        let removed = range.len();
        if removed == 0 {
            return;
        }
        let hooks: Vec<ForgetHook> = self
            .slots
            .drain(range)
            .filter_map(|slot| match slot {
                Slot::Value { on_forget, .. } => on_forget,
                _ => None,
            })
            .collect();
        for frame in self.groups.iter_mut() {
            frame.end -= removed;
        }
        for hook in hooks {
            self.run_hook(hook);
        }
    }

    /// A panicking hook does not stop the others.
    fn run_hook(&mut self, hook: ForgetHook) {
        if let Err(message) = catch_panic(hook) {
            log::error!("forget hook panicked: {message}");
            self.hook_failures.push(message);
        }
    }
}

impl fmt::Debug for SlotTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotTable")
            .field("len", &self.slots.len())
            .field("cursor", &self.cursor)
            .field("depth", &self.groups.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn write<T: 'static>(t: &mut SlotTable, v: T) {
        t.next_slot();
        t.set_slot(Box::new(v));
    }

    fn read<T: Clone + 'static>(t: &mut SlotTable) -> Option<T> {
        t.next_slot();
        t.get_slot().and_then(|v| v.downcast_ref::<T>()).cloned()
    }

    #[test]
    fn test_positions_are_stable_across_passes() {
        let mut t = SlotTable::new();
        t.begin_pass();
        write(&mut t, 1u32);
        write(&mut t, "two");
        t.end_pass();

        t.begin_pass();
        assert_eq!(read::<u32>(&mut t), Some(1));
        assert_eq!(read::<&str>(&mut t), Some("two"));
        t.end_pass();
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn test_unvisited_tail_is_dropped_and_forgotten() {
        let forgotten = Rc::new(Cell::new(0));
        let mut t = SlotTable::new();
        t.begin_pass();
        write(&mut t, 1u32);
        t.next_slot();
        let f = forgotten.clone();
        t.set_slot_with_forget(Box::new(2u32), Box::new(move || f.set(f.get() + 1)));
        t.end_pass();

        t.begin_pass();
        assert_eq!(read::<u32>(&mut t), Some(1));
        t.end_pass();

        assert_eq!(t.len(), 1);
        assert_eq!(forgotten.get(), 1);
    }

    #[test]
    fn test_branch_switch_does_not_leak_values() {
        let mut t = SlotTable::new();
        t.begin_pass();
        t.start_group(1);
        write(&mut t, 10u32);
        t.end_group();
        write(&mut t, "tail");
        t.end_pass();

        // other branch: different key, fresh cells
        t.begin_pass();
        t.start_group(2);
        assert_eq!(read::<u32>(&mut t), None);
        t.end_group();
        assert_eq!(read::<&str>(&mut t), Some("tail"));
        t.end_pass();

        // back to the first branch: its state was dropped with it
        t.begin_pass();
        t.start_group(1);
        assert_eq!(read::<u32>(&mut t), None);
        t.end_group();
        t.end_pass();
    }

    #[test]
    fn test_keyed_groups_follow_reordering() {
        let mut t = SlotTable::new();
        t.begin_pass();
        for key in [1u64, 2, 3] {
            t.start_group(key);
            write(&mut t, key * 100);
            t.end_group();
        }
        t.end_pass();

        t.begin_pass();
        for key in [3u64, 1, 2] {
            t.start_group(key);
            assert_eq!(read::<u64>(&mut t), Some(key * 100));
            t.end_group();
        }
        t.end_pass();
        assert_eq!(t.len(), 6);
    }

    #[test]
    fn test_group_shrink_forgets_removed_cells() {
        let forgotten = Rc::new(Cell::new(0));
        let mut t = SlotTable::new();
        t.begin_pass();
        t.start_group(7);
        for _ in 0..3 {
            t.next_slot();
            let f = forgotten.clone();
            t.set_slot_with_forget(Box::new(()), Box::new(move || f.set(f.get() + 1)));
        }
        t.end_group();
        t.end_pass();

        t.begin_pass();
        t.start_group(7);
        t.next_slot();
        t.end_group();
        t.end_pass();

        assert_eq!(forgotten.get(), 2);
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn test_abort_keeps_group_lengths_consistent() {
        let mut t = SlotTable::new();
        t.begin_pass();
        t.start_group(1);
        write(&mut t, 1u8);
        t.end_group();
        t.end_pass();

        // grows the group, then fails before closing it
        t.begin_pass();
        t.start_group(1);
        write(&mut t, 1u8);
        write(&mut t, 2u8);
        t.abort_pass();
        assert_eq!(t.group_depth(), 0);

        t.begin_pass();
        t.start_group(1);
        assert_eq!(read::<u8>(&mut t), Some(1));
        assert_eq!(read::<u8>(&mut t), Some(2));
        t.end_group();
        t.end_pass();
        assert_eq!(t.len(), 3);
    }

    #[test]
    fn test_clear_runs_every_forget_hook() {
        let forgotten = Rc::new(Cell::new(0));
        let mut t = SlotTable::new();
        t.begin_pass();
        t.start_group(1);
        for _ in 0..2 {
            t.next_slot();
            let f = forgotten.clone();
            t.set_slot_with_forget(Box::new(()), Box::new(move || f.set(f.get() + 1)));
        }
        t.end_group();
        t.end_pass();

        t.clear();
        assert!(t.is_empty());
        assert_eq!(forgotten.get(), 2);
    }

    #[test]
    fn test_panicking_forget_hook_does_not_skip_the_rest() {
        let forgotten = Rc::new(Cell::new(0));
        let mut t = SlotTable::new();
        t.begin_pass();
        t.next_slot();
        t.set_slot_with_forget(Box::new(()), Box::new(|| panic!("hook 1")));
        t.next_slot();
        let f = forgotten.clone();
        t.set_slot_with_forget(Box::new(()), Box::new(move || f.set(f.get() + 1)));
        t.end_pass();

        t.clear();
        assert_eq!(forgotten.get(), 1);
        assert_eq!(t.take_hook_failures(), vec!["hook 1".to_string()]);
        assert!(t.take_hook_failures().is_empty());
    }
}
