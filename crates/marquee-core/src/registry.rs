//! Registry of live sessions
//!
//! A session is inserted when it is built and removed on `destroy()`. When
//! any session starts playing, every other live session is paused.

use crate::session::SessionId;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use tracing::debug;

/// What the registry needs from a session
pub trait Pausable {
    fn pause(&self);
    fn paused(&self) -> bool;
}

thread_local! {
    static GLOBAL: Rc<SessionRegistry> = Rc::new(SessionRegistry::new());
}

/// Live sessions in insertion order
#[derive(Default)]
pub struct SessionRegistry {
    entries: RefCell<Vec<(SessionId, Weak<dyn Pausable>)>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry shared by every session on this thread (one page)
    pub fn global() -> Rc<Self> {
        GLOBAL.with(Rc::clone)
    }

    /// Track a session, pruning entries whose session was dropped undestroyed
    pub fn insert(&self, id: SessionId, session: Weak<dyn Pausable>) {
        let mut entries = self.entries.borrow_mut();
        entries.retain(|(_, tracked)| tracked.strong_count() > 0);
        match entries.iter_mut().find(|(tracked, _)| *tracked == id) {
            Some(entry) => entry.1 = session,
            None => entries.push((id, session)),
        }
    }

    pub fn remove(&self, id: SessionId) -> bool {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|(tracked, _)| *tracked != id);
        entries.len() != before
    }

    /// Ids of live sessions in insertion order
    pub fn ids(&self) -> Vec<SessionId> {
        self.entries
            .borrow()
            .iter()
            .filter(|(_, session)| session.strong_count() > 0)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.ids().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pause every playing session except `except`. Returns how many were paused.
    pub fn pause_others(&self, except: SessionId) -> usize {
        let others: Vec<(SessionId, Rc<dyn Pausable>)> = self
            .entries
            .borrow()
            .iter()
            .filter(|(id, _)| *id != except)
            .filter_map(|(id, session)| session.upgrade().map(|session| (*id, session)))
            .collect();

        let mut paused = 0;
        for (id, session) in others {
            if !session.paused() {
                debug!(session_id = %id, "Pausing concurrent session");
                session.pause();
                paused += 1;
            }
        }
        paused
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Fake {
        paused: Cell<bool>,
    }

    impl Pausable for Fake {
        fn pause(&self) {
            self.paused.set(true);
        }

        fn paused(&self) -> bool {
            self.paused.get()
        }
    }

    fn playing() -> Rc<Fake> {
        Rc::new(Fake {
            paused: Cell::new(false),
        })
    }

    fn weak(session: &Rc<Fake>) -> Weak<dyn Pausable> {
        let session: Rc<dyn Pausable> = session.clone();
        Rc::downgrade(&session)
    }

    #[test]
    fn test_pause_others_skips_caller() {
        let registry = SessionRegistry::new();
        let (a, b, c) = (playing(), playing(), playing());
        let ids = [SessionId::new(), SessionId::new(), SessionId::new()];
        registry.insert(ids[0], weak(&a));
        registry.insert(ids[1], weak(&b));
        registry.insert(ids[2], weak(&c));

        assert_eq!(registry.pause_others(ids[1]), 2);
        assert!(a.paused());
        assert!(!b.paused());
        assert!(c.paused());
    }

    #[test]
    fn test_insertion_order_and_removal() {
        let registry = SessionRegistry::new();
        let (a, b) = (playing(), playing());
        let ids = [SessionId::new(), SessionId::new()];
        registry.insert(ids[0], weak(&a));
        registry.insert(ids[1], weak(&b));
        assert_eq!(registry.ids(), ids);

        assert!(registry.remove(ids[0]));
        assert!(!registry.remove(ids[0]));
        assert_eq!(registry.ids(), [ids[1]]);
    }

    #[test]
    fn test_dropped_sessions_are_not_live() {
        let registry = SessionRegistry::new();
        let id = SessionId::new();
        {
            let gone = playing();
            registry.insert(id, weak(&gone));
        }
        assert!(registry.is_empty());
        assert_eq!(registry.pause_others(SessionId::new()), 0);
    }

    #[test]
    fn test_insert_prunes_dropped_sessions() {
        let registry = SessionRegistry::new();
        for _ in 0..3 {
            let gone = playing();
            registry.insert(SessionId::new(), weak(&gone));
        }
        assert_eq!(registry.entries.borrow().len(), 3);

        let live = playing();
        let id = SessionId::new();
        registry.insert(id, weak(&live));
        assert_eq!(registry.entries.borrow().len(), 1);
        assert_eq!(registry.ids(), [id]);
    }
}
