//! Expressed interests, interest filters, and interest construction.
//!
//! The interest registry is keyed by the raw bytes of a name prefix (the
//! tagged component elements, with the outer Name framing stripped), so a
//! longest-to-shortest walk over an incoming message's component
//! boundaries finds every registration cheaply. Each bucket holds the
//! interests sharing that exact prefix.

use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::logging;
use crate::upcall::ActionRef;
use ccn_wire::coding::{append_closer, append_tag, append_tagged_udata, DTag};
use ccn_wire::interest::parse_interest;
use ccn_wire::name::check_name;
use std::rc::Rc;
use std::time::Instant;

/// Sanity sentinel carried by long-lived interest records; checked in
/// debug builds wherever a record is reached through the registry.
pub(crate) const INTEREST_MAGIC: u32 = 0x7059_e5f4;

/// One pending request. Lives in a registry bucket until an upcall retires
/// it or the scheduler sweeps it out.
pub(crate) struct ExpressedInterest {
    magic: u32,
    /// The exact encoded message as sent; retransmissions reuse these
    /// bytes unchanged. None marks a record awaiting deletion.
    pub(crate) msg: Option<Vec<u8>>,
    /// Time most recently expressed; None before the first send.
    pub(crate) last_time: Option<Instant>,
    pub(crate) action: Option<ActionRef>,
    /// How many we want outstanding, 0 or 1. Zero marks retirement unless
    /// a key wait is pending.
    pub(crate) target: u32,
    /// How many are actually outstanding, 0 or 1.
    pub(crate) outstanding: u32,
    /// Publisher key digest this interest is parked on, if any.
    pub(crate) wanted_pub: Option<[u8; 32]>,
}

impl ExpressedInterest {
    pub(crate) fn new(msg: Vec<u8>, action: ActionRef) -> ExpressedInterest {
        ExpressedInterest {
            magic: INTEREST_MAGIC,
            msg: Some(msg),
            last_time: None,
            action: Some(action),
            target: 1,
            outstanding: 0,
            wanted_pub: None,
        }
    }

    #[inline]
    pub(crate) fn check(&self) {
        debug_assert_eq!(
            self.magic, INTEREST_MAGIC,
            "expressed interest record has a bad magic value"
        );
    }

    #[inline]
    pub(crate) fn take_action(&mut self) -> Option<ActionRef> {
        self.action.take()
    }

    /// Strip the record down for handle teardown.
    pub(crate) fn retire_for_destroy(&mut self) {
        self.check();
        self.msg = None;
        self.target = 0;
        self.wanted_pub = None;
    }
}

impl Handle {
    /// Express an interest for `namebuf` (an encoded Name element), asking
    /// for content under its first `prefix_comps` components (None: the
    /// whole name). The action is consulted for every matching content
    /// arrival and timeout until the interest retires. The interest goes
    /// out immediately, subject to output buffering.
    pub fn express_interest(
        &mut self,
        namebuf: &[u8],
        prefix_comps: Option<usize>,
        action: ActionRef,
        template: Option<&[u8]>,
    ) -> Result<()> {
        let prefix_end = match check_name(namebuf, prefix_comps, true) {
            Some(end) => end,
            None => return self.note_err(Error::InvalidArg, "express_interest"),
        };
        let msg = self.construct_interest(namebuf, prefix_comps, template)?;

        // Only the prefix components are kept in the key, making prefix
        // lookups on incoming names direct.
        let key = namebuf[1..prefix_end].to_vec();
        let mut rec = ExpressedInterest::new(msg, action);
        self.refresh_interest(&mut rec);
        logging::trace!(self.log, "interest expressed";
                        "prefix_bytes" => key.len(),
                        "outstanding" => rec.outstanding);
        self.interests
            .entry(key)
            .or_insert_with(Vec::new)
            .insert(0, rec);
        Ok(())
    }

    /// Register (or with `None`, withdraw) an interest filter under the
    /// full encoded name. The action is invoked for every arriving
    /// interest whose name has this registration as a prefix.
    pub fn set_interest_filter(
        &mut self,
        namebuf: &[u8],
        action: Option<ActionRef>,
    ) -> Result<()> {
        let end = match check_name(namebuf, None, false) {
            Some(end) => end,
            None => return self.note_err(Error::InvalidArg, "set_interest_filter"),
        };
        let key = namebuf[1..end].to_vec();
        match action {
            Some(action) => {
                let incoming = action.clone();
                if let Some(old) = self.filters.insert(key, action) {
                    if !Rc::ptr_eq(&old, &incoming) {
                        self.release_action(old);
                    }
                }
            }
            None => {
                if let Some(old) = self.filters.shift_remove(&key) {
                    self.release_action(old);
                }
            }
        }
        Ok(())
    }

    /// Build the wire interest: outer tag, the name, an optional component
    /// count, and the selector regions spliced out of the template. The
    /// template's nonce is deliberately not carried over.
    pub(crate) fn construct_interest(
        &mut self,
        namebuf: &[u8],
        prefix_comps: Option<usize>,
        template: Option<&[u8]>,
    ) -> Result<Vec<u8>> {
        let mut msg = Vec::with_capacity(namebuf.len() + 32);
        append_tag(&mut msg, DTag::Interest);
        msg.extend_from_slice(namebuf);
        if let Some(count) = prefix_comps {
            append_tagged_udata(
                &mut msg,
                DTag::NameComponentCount,
                count.to_string().as_bytes(),
            );
        }
        if let Some(template) = template {
            let pi = match parse_interest(template) {
                Ok(pi) => pi,
                Err(_) => return self.note_err(Error::InvalidArg, "construct_interest"),
            };
            msg.extend_from_slice(&template[pi.component_count.end..pi.nonce.start]);
            msg.extend_from_slice(&template[pi.other.clone()]);
        }
        append_closer(&mut msg);
        Ok(msg)
    }

    /// Send the interest when fewer copies are outstanding than wanted.
    pub(crate) fn refresh_interest(&mut self, rec: &mut ExpressedInterest) {
        rec.check();
        if rec.outstanding >= rec.target {
            return;
        }
        let sent = match rec.msg.as_deref() {
            Some(msg) => self.put(msg).is_ok(),
            None => false,
        };
        if sent {
            rec.outstanding += 1;
            rec.last_time = Some(self.sample_clock());
        }
    }
}
