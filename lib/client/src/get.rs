//! One-shot blocking fetch.
//!
//! Convenience over express + run: express the interest, spin the loop
//! until a matching object arrives or the deadline passes, hand back the
//! encoded object. Called from inside an upcall (the loop is already on
//! the stack), a fresh handle is created for the duration; it connects to
//! the same daemon and borrows this handle's key cache, so keys fetched
//! either way land in one place.

use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::upcall::{Action, UpcallKind, UpcallResult};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

impl Handle {
    /// Fetch a single content object matching `namebuf` (encoded Name)
    /// under its first `prefix_comps` components. Returns the encoded
    /// object, or `TimedOut` after `timeout_ms` with no answer.
    pub fn get(
        &mut self,
        namebuf: &[u8],
        prefix_comps: Option<usize>,
        template: Option<&[u8]>,
        timeout_ms: i64,
    ) -> Result<Vec<u8>> {
        if self.running != 0 {
            let mut nested = Handle::new(&self.log);
            nested.keys = self.keys.share();
            let path = self.sock_path.clone();
            nested.connect(path.as_deref())?;
            return nested.get_inner(namebuf, prefix_comps, template, timeout_ms);
        }
        self.get_inner(namebuf, prefix_comps, template, timeout_ms)
    }

    fn get_inner(
        &mut self,
        namebuf: &[u8],
        prefix_comps: Option<usize>,
        template: Option<&[u8]>,
        timeout_ms: i64,
    ) -> Result<Vec<u8>> {
        let slot: Rc<RefCell<Option<Vec<u8>>>> = Rc::new(RefCell::new(None));
        let armed = Rc::new(Cell::new(true));

        let result = slot.clone();
        let rearm = armed.clone();
        let action = Action::new(move |handle: &mut Handle, kind, info| match kind {
            UpcallKind::Final => UpcallResult::Ok,
            UpcallKind::InterestTimedOut => {
                if rearm.get() {
                    UpcallResult::Reexpress
                } else {
                    UpcallResult::Ok
                }
            }
            UpcallKind::Content | UpcallKind::ContentUnverified => {
                if let (Some(msg), Some(pco)) = (info.content_msg, info.content) {
                    *result.borrow_mut() = Some(msg[..pco.e_pco].to_vec());
                }
                handle.set_run_timeout(0);
                UpcallResult::Ok
            }
            _ => UpcallResult::Err,
        });

        self.express_interest(namebuf, prefix_comps, action, template)?;
        let run_res = self.run(timeout_ms);
        // Disarm so a dangling registration will not retransmit forever.
        armed.set(false);
        run_res?;

        let taken = slot.borrow_mut().take();
        match taken {
            Some(bytes) => Ok(bytes),
            None => Err(Error::TimedOut),
        }
    }
}
