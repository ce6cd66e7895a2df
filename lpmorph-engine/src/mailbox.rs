//! Lock-free single-slot mailbox for handing excitation buffers to the audio
//! thread.
//!
//! Two slots:
//! - `pending`: the newest buffer posted by a control thread. A newer post
//!   replaces (and frees) an older pending buffer the audio thread never saw.
//! - `retired`: the buffer the audio thread just swapped out. Only the control
//!   thread frees it.
//!
//! The audio thread takes from `pending` only while `retired` is empty, so it
//! never has anywhere to put a buffer it would have to free itself. A slot is
//! `Option<Excitation>` so "no excitation" can be posted too.

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use crate::excitation::Excitation;

pub type Slot = Option<Excitation>;

pub struct ExcitationMailbox {
    pending: AtomicPtr<Slot>,
    retired: AtomicPtr<Slot>,
}

impl Default for ExcitationMailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl ExcitationMailbox {
    pub fn new() -> Self {
        Self { pending: AtomicPtr::new(ptr::null_mut()), retired: AtomicPtr::new(ptr::null_mut()) }
    }

    /// Control thread: publish a new excitation (or `None` to remove it).
    pub fn post(&self, slot: Slot) {
        let fresh = Box::into_raw(Box::new(slot));
        let stale = self.pending.swap(fresh, Ordering::AcqRel);
        if !stale.is_null() {
            // SAFETY: non-null pointers in `pending` come from `Box::into_raw`
            // and the swap gave us exclusive ownership.
            drop(unsafe { Box::from_raw(stale) });
        }
        self.collect();
    }

    /// Control thread: free whatever the audio thread retired. Returns `true`
    /// if something was freed.
    pub fn collect(&self) -> bool {
        let old = self.retired.swap(ptr::null_mut(), Ordering::AcqRel);
        if old.is_null() {
            return false;
        }
        // SAFETY: as in `post`; the audio thread gave the pointer up when it
        // stored it in `retired`.
        drop(unsafe { Box::from_raw(old) });
        true
    }

    /// `true` while a posted buffer is waiting for the audio thread.
    pub fn has_pending(&self) -> bool {
        !self.pending.load(Ordering::Acquire).is_null()
    }

    /// Audio thread: swap a pending buffer into `current`. The previous
    /// `current` goes to the retired slot. Never allocates or frees.
    pub fn take(&self, current: &mut Box<Slot>) -> bool {
        if !self.retired.load(Ordering::Acquire).is_null() {
            return false;
        }
        let p = self.pending.swap(ptr::null_mut(), Ordering::AcqRel);
        if p.is_null() {
            return false;
        }
        // SAFETY: `p` came from `Box::into_raw` in `post`; the swap removed it
        // from the mailbox, so we are the only owner.
        let incoming = unsafe { Box::from_raw(p) };
        let outgoing = std::mem::replace(current, incoming);
        self.retired.store(Box::into_raw(outgoing), Ordering::Release);
        true
    }
}

impl Drop for ExcitationMailbox {
    fn drop(&mut self) {
        for slot in [&self.pending, &self.retired] {
            let p = slot.swap(ptr::null_mut(), Ordering::AcqRel);
            if !p.is_null() {
                // SAFETY: see `post`.
                drop(unsafe { Box::from_raw(p) });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ex(name: &str, len: usize) -> Slot {
        Some(Excitation::from_samples(name, vec![0.25; len]).unwrap())
    }

    fn name_of(slot: &Slot) -> Option<&str> {
        slot.as_ref().map(Excitation::name)
    }

    fn len_of(slot: &Slot) -> Option<usize> {
        slot.as_ref().map(Excitation::len)
    }

    #[test]
    fn take_swaps_and_retires() {
        let mb = ExcitationMailbox::new();
        let mut current: Box<Slot> = Box::new(None);
        assert!(!mb.take(&mut current));

        mb.post(ex("a", 8));
        assert!(mb.has_pending());
        assert!(mb.take(&mut current));
        assert_eq!(name_of(&current), Some("a"));
        assert!(!mb.has_pending());

        // `None` went to the retired slot; until it is collected the next
        // buffer waits.
        mb.pending.store(Box::into_raw(Box::new(ex("b", 4))), Ordering::Release);
        assert!(!mb.take(&mut current));
        assert!(mb.collect());
        assert!(mb.take(&mut current));
        assert_eq!(len_of(&current), Some(4));
    }

    #[test]
    fn newer_post_replaces_pending() {
        let mb = ExcitationMailbox::new();
        mb.post(ex("old", 2));
        mb.post(ex("new", 3));
        let mut current: Box<Slot> = Box::new(None);
        assert!(mb.take(&mut current));
        assert_eq!(name_of(&current), Some("new"));
    }

    #[test]
    fn post_collects_retired() {
        let mb = ExcitationMailbox::new();
        let mut current: Box<Slot> = Box::new(None);
        mb.post(ex("a", 2));
        assert!(mb.take(&mut current));
        mb.post(None);
        // retired slot was freed by the post, so the swap goes through
        assert!(mb.take(&mut current));
        assert!(current.is_none());
    }

    #[test]
    fn works_across_threads() {
        use std::sync::Arc;
        let mb = Arc::new(ExcitationMailbox::new());
        let writer = {
            let mb = Arc::clone(&mb);
            std::thread::spawn(move || {
                for i in 1..=200 {
                    mb.post(ex("n", i));
                }
            })
        };
        let mut current: Box<Slot> = Box::new(None);
        let mut seen = 0;
        for _ in 0..10_000 {
            if mb.take(&mut current) {
                seen += 1;
            }
            mb.collect();
        }
        writer.join().unwrap();
        mb.collect();
        mb.take(&mut current);
        assert!(seen <= 200);
        assert_eq!(len_of(&current), Some(200));
    }
}
