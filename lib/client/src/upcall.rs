//! The upcall contract between the library and its client.
//!
//! An [`Action`] is a shared callback capability: every registry slot that
//! references it holds one clone of the [`ActionRef`]. When the last
//! reference is released the action is invoked once with
//! [`UpcallKind::Final`] and then dropped.

use crate::handle::Handle;
use ccn_wire::content::ParsedContentObject;
use ccn_wire::interest::ParsedInterest;
use std::cell::RefCell;
use std::rc::Rc;

/// Why an action is being invoked.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum UpcallKind {
    /// Last reference to the action dropped; release resources.
    Final,
    /// An interest matched one of this client's filters.
    Interest,
    /// As `Interest`, but an earlier upcall already answered it.
    ConsumedInterest,
    /// Matching content arrived and its signature verified.
    Content,
    /// Matching content arrived but no key is available yet.
    ContentUnverified,
    /// Matching content arrived and failed verification.
    ContentBad,
    /// An expressed interest went unanswered for its lifetime.
    InterestTimedOut,
}

/// What the action wants done next.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum UpcallResult {
    Ok,
    Err,
    /// Send the interest again.
    Reexpress,
    /// This interest has been answered; inform later filters.
    InterestConsumed,
    /// Fetch the key and verify before giving up on this content.
    Verify,
}

/// Everything an upcall gets to look at. Slices borrow from the message
/// being dispatched and from the interest record.
#[derive(Default)]
pub struct UpcallInfo<'a> {
    /// Components matched by the registration that fired.
    pub matched_comps: usize,
    pub interest_msg: Option<&'a [u8]>,
    pub interest: Option<&'a ParsedInterest>,
    pub interest_comps: Option<&'a [usize]>,
    pub content_msg: Option<&'a [u8]>,
    pub content: Option<&'a ParsedContentObject>,
    pub content_comps: Option<&'a [usize]>,
}

pub type UpcallFn = dyn FnMut(&mut Handle, UpcallKind, &UpcallInfo) -> UpcallResult;

pub struct Action {
    func: RefCell<Box<UpcallFn>>,
}

pub type ActionRef = Rc<Action>;

impl Action {
    pub fn new<F>(func: F) -> ActionRef
    where
        F: FnMut(&mut Handle, UpcallKind, &UpcallInfo) -> UpcallResult + 'static,
    {
        Rc::new(Action { func: RefCell::new(Box::new(func)) })
    }

    /// Invoke the callback. Returns None when the closure is already on
    /// the stack (a re-entrant invocation); callers treat that as an error
    /// result, except for `Final` which gets deferred.
    pub(crate) fn try_invoke(
        &self,
        handle: &mut Handle,
        kind: UpcallKind,
        info: &UpcallInfo,
    ) -> Option<UpcallResult> {
        let mut func = self.func.try_borrow_mut().ok()?;
        Some((&mut *func)(handle, kind, info))
    }
}

impl Handle {
    /// Drop one reference to an action. The last release fires `Final`
    /// exactly once; when the closure is still on the stack the final call
    /// is parked and fired after the dispatcher unwinds.
    pub(crate) fn release_action(&mut self, action: ActionRef) {
        if Rc::strong_count(&action) > 1 {
            return;
        }
        let info = UpcallInfo::default();
        if action.try_invoke(self, UpcallKind::Final, &info).is_none() {
            self.deferred_finals.push(action);
        }
    }

    /// Fire finals parked by [`Handle::release_action`].
    pub(crate) fn fire_deferred_finals(&mut self) {
        while let Some(action) = self.deferred_finals.pop() {
            let info = UpcallInfo::default();
            if action.try_invoke(self, UpcallKind::Final, &info).is_none() {
                self.deferred_finals.push(action);
                break;
            }
        }
    }
}
