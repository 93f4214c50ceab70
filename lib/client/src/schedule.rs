//! The aging pass: retransmit what went unanswered, time out what has
//! lived too long, sweep out what retired.
//!
//! The pass also computes `refresh_us`, the time until the next piece of
//! scheduled work, which the event loop uses as its poll deadline.

use crate::handle::Handle;
use crate::interests::ExpressedInterest;
use crate::logging;
use crate::upcall::{UpcallInfo, UpcallKind, UpcallResult};
use crate::INTEREST_LIFETIME_MICROSEC;
use ccn_wire::interest::parse_interest;
use indexmap::map::Entry;
use std::time::{Duration, Instant};

/// An interest whose record is older than this gets its bookkeeping
/// clamped before the delta arithmetic.
const STALE_CLAMP: Duration = Duration::from_secs(30);

impl Handle {
    /// Run every operation whose time has come. Returns the number of
    /// microseconds until the next thing needs to happen. Exposed so an
    /// embedded client can be driven without the event loop.
    pub fn process_scheduled_operations(&mut self) -> i64 {
        self.refresh_us = 5 * INTEREST_LIFETIME_MICROSEC;
        self.now = Some(Instant::now());
        if self.output_is_pending() {
            // Waiting on writability; inventing retransmissions now would
            // only deepen the backlog.
            return self.refresh_us;
        }
        self.running += 1;

        let keys: Vec<Vec<u8>> = self.interests.keys().cloned().collect();
        let mut need_clean = false;
        for key in keys {
            let mut bucket = match self.interests.shift_remove(&key) {
                Some(bucket) => bucket,
                None => continue,
            };
            if bucket.is_empty() {
                need_clean = true;
            }
            for rec in bucket.iter_mut() {
                rec.check();
                self.check_pub_arrival(rec);
                if rec.target != 0 {
                    self.age_interest(rec);
                }
                if rec.target == 0 && rec.wanted_pub.is_none() {
                    if let Some(action) = rec.take_action() {
                        self.release_action(action);
                    }
                    rec.msg = None;
                    need_clean = true;
                }
            }
            match self.interests.entry(key) {
                Entry::Occupied(mut entry) => entry.get_mut().extend(bucket),
                Entry::Vacant(entry) => {
                    entry.insert(bucket);
                }
            }
        }
        if need_clean {
            self.clean_all_interests();
        }

        self.running -= 1;
        if self.running == 0 {
            self.fire_deferred_finals();
        }
        self.refresh_us
    }

    /// Age one interest: clear `outstanding` when the lifetime has run
    /// out, lower `refresh_us` to this record's remaining lifetime, and
    /// when a send is due, consult the action (except on the very first
    /// pass, which re-expresses silently).
    fn age_interest(&mut self, rec: &mut ExpressedInterest) {
        rec.check();
        let now = self.sample_clock();
        let firstcall = rec.last_time.is_none();

        let stale = match rec.last_time {
            Some(last) => now.saturating_duration_since(last) > STALE_CLAMP,
            None => true,
        };
        if stale {
            // Clamp so the delta arithmetic below stays small.
            rec.outstanding = 0;
            rec.last_time = Some(now.checked_sub(STALE_CLAMP).unwrap_or(now));
        }

        let last = rec.last_time.expect("clamped above");
        let mut delta = now.saturating_duration_since(last).as_micros() as i64;
        if delta >= INTEREST_LIFETIME_MICROSEC {
            rec.outstanding = 0;
            delta = 0;
        }
        if INTEREST_LIFETIME_MICROSEC - delta < self.refresh_us {
            self.refresh_us = INTEREST_LIFETIME_MICROSEC - delta;
        }
        rec.last_time = Some(now.checked_sub(Duration::from_micros(delta as u64)).unwrap_or(now));

        if rec.target > 0 && rec.outstanding == 0 {
            let mut res = UpcallResult::Reexpress;
            if !firstcall {
                res = UpcallResult::Err;
                if let (Some(action), Some(msg)) = (rec.action.clone(), rec.msg.clone()) {
                    match parse_interest(&msg) {
                        Ok(pi) => {
                            let info = UpcallInfo {
                                interest_msg: Some(&msg),
                                interest: Some(&pi),
                                interest_comps: Some(&pi.comps),
                                ..Default::default()
                            };
                            res = action
                                .try_invoke(self, UpcallKind::InterestTimedOut, &info)
                                .unwrap_or(UpcallResult::Err);
                            rec.check();
                        }
                        Err(_) => {
                            logging::error!(self.log, "expressed interest record is corrupted");
                        }
                    }
                }
            }
            if res == UpcallResult::Reexpress {
                self.refresh_interest(rec);
            } else {
                rec.target = 0;
            }
        }
    }

    /// Drop retired records and empty buckets.
    fn clean_all_interests(&mut self) {
        self.interests.retain(|_, bucket| {
            bucket.retain(|rec| {
                rec.check();
                rec.action.is_some()
            });
            !bucket.is_empty()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upcall::{Action, ActionRef};
    use ccn_wire::name::encode_name;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recording(
        calls: &Rc<RefCell<Vec<UpcallKind>>>,
        result: UpcallResult,
    ) -> ActionRef {
        let calls = calls.clone();
        Action::new(move |_, kind, _| {
            if kind == UpcallKind::Final {
                return UpcallResult::Ok;
            }
            calls.borrow_mut().push(kind);
            result
        })
    }

    fn backdate(handle: &mut Handle, micros: u64) {
        for bucket in handle.interests.values_mut() {
            for rec in bucket.iter_mut() {
                rec.last_time = rec
                    .last_time
                    .map(|t| t.checked_sub(Duration::from_micros(micros)).unwrap_or(t));
            }
        }
    }

    #[test]
    fn test_idle_pass_is_noop() {
        let mut handle = Handle::new(None);
        assert_eq!(
            handle.process_scheduled_operations(),
            5 * INTEREST_LIFETIME_MICROSEC
        );
        assert!(handle.interests.is_empty());
    }

    #[test]
    fn test_pending_output_defers_the_pass() {
        let mut handle = Handle::new(None);
        let calls = Rc::new(RefCell::new(Vec::new()));
        handle
            .express_interest(
                &encode_name(&[b"a".as_ref()]),
                None,
                recording(&calls, UpcallResult::Reexpress),
                None,
            )
            .unwrap();
        backdate(&mut handle, 2 * INTEREST_LIFETIME_MICROSEC as u64);

        // The unsent interest sits in the output buffer, so the pass must
        // not age anything.
        assert!(handle.output_is_pending());
        assert_eq!(
            handle.process_scheduled_operations(),
            5 * INTEREST_LIFETIME_MICROSEC
        );
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn test_fresh_interest_sets_refresh_to_remaining_lifetime() {
        let mut handle = Handle::new(None);
        let calls = Rc::new(RefCell::new(Vec::new()));
        handle
            .express_interest(
                &encode_name(&[b"a".as_ref()]),
                None,
                recording(&calls, UpcallResult::Ok),
                None,
            )
            .unwrap();
        handle.outbuf.clear();

        let us = handle.process_scheduled_operations();
        assert!(us <= INTEREST_LIFETIME_MICROSEC);
        assert!(us > INTEREST_LIFETIME_MICROSEC / 2);
        // Still outstanding, no upcall.
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn test_timeout_reexpress_is_byte_identical() {
        let mut handle = Handle::new(None);
        let calls = Rc::new(RefCell::new(Vec::new()));
        handle
            .express_interest(
                &encode_name(&[b"a".as_ref(), b"b".as_ref()]),
                Some(2),
                recording(&calls, UpcallResult::Reexpress),
                None,
            )
            .unwrap();
        let original = handle.outbuf.read_slice().to_vec();
        handle.outbuf.clear();

        backdate(&mut handle, INTEREST_LIFETIME_MICROSEC as u64 + 50_000);
        handle.process_scheduled_operations();

        assert_eq!(&calls.borrow()[..], &[UpcallKind::InterestTimedOut]);
        // Retransmission reuses the exact original bytes.
        assert_eq!(handle.outbuf.read_slice(), &original[..]);
        let rec = &handle.interests.values().next().unwrap()[0];
        assert_eq!(rec.outstanding, 1);
        assert_eq!(rec.target, 1);
    }

    #[test]
    fn test_timeout_ok_retires_and_sweeps() {
        let mut handle = Handle::new(None);
        let calls = Rc::new(RefCell::new(Vec::new()));
        handle
            .express_interest(
                &encode_name(&[b"a".as_ref()]),
                None,
                recording(&calls, UpcallResult::Ok),
                None,
            )
            .unwrap();
        handle.outbuf.clear();

        backdate(&mut handle, INTEREST_LIFETIME_MICROSEC as u64 + 50_000);
        handle.process_scheduled_operations();

        assert_eq!(&calls.borrow()[..], &[UpcallKind::InterestTimedOut]);
        // Retired record and empty bucket are gone.
        assert!(handle.interests.is_empty());
        assert!(!handle.output_is_pending());
    }

    #[test]
    fn test_stale_record_is_healed() {
        let mut handle = Handle::new(None);
        let calls = Rc::new(RefCell::new(Vec::new()));
        handle
            .express_interest(
                &encode_name(&[b"a".as_ref()]),
                None,
                recording(&calls, UpcallResult::Reexpress),
                None,
            )
            .unwrap();
        handle.outbuf.clear();

        // Way past the clamp horizon.
        backdate(&mut handle, 40_000_000);
        let us = handle.process_scheduled_operations();

        assert_eq!(&calls.borrow()[..], &[UpcallKind::InterestTimedOut]);
        let rec = &handle.interests.values().next().unwrap()[0];
        assert_eq!(rec.outstanding, 1);
        // The record's clock was clamped back to sanity.
        assert!(
            Instant::now()
                .saturating_duration_since(rec.last_time.unwrap())
                < Duration::from_secs(1)
        );
        assert!(us <= INTEREST_LIFETIME_MICROSEC);
    }

    #[test]
    fn test_first_pass_reexpresses_without_upcall() {
        let mut handle = Handle::new(None);
        let calls = Rc::new(RefCell::new(Vec::new()));
        let name = encode_name(&[b"a".as_ref()]);
        let msg = handle.construct_interest(&name, None, None).unwrap();
        let rec = ExpressedInterest::new(msg, recording(&calls, UpcallResult::Ok));
        handle.interests.insert(name[1..name.len() - 1].to_vec(), vec![rec]);

        // Never sent: the pass sends it silently.
        handle.process_scheduled_operations();
        assert!(calls.borrow().is_empty());
        let rec = &handle.interests.values().next().unwrap()[0];
        assert_eq!(rec.outstanding, 1);
        assert!(handle.output_is_pending());
    }

    #[test]
    fn test_invariant_outstanding_le_target() {
        let mut handle = Handle::new(None);
        let calls = Rc::new(RefCell::new(Vec::new()));
        handle
            .express_interest(
                &encode_name(&[b"a".as_ref()]),
                None,
                recording(&calls, UpcallResult::Reexpress),
                None,
            )
            .unwrap();
        handle.outbuf.clear();
        for round in 0..3 {
            backdate(&mut handle, INTEREST_LIFETIME_MICROSEC as u64 + 1000);
            handle.process_scheduled_operations();
            handle.outbuf.clear();
            for bucket in handle.interests.values() {
                for rec in bucket {
                    assert!(rec.outstanding <= rec.target, "round {}", round);
                    assert!(rec.target <= 1);
                }
            }
        }
    }
}
