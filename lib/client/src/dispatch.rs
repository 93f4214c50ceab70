//! Message dispatch: classify, match, verify, call up.
//!
//! Every complete inbound message is either an interest headed for the
//! filter registry or a content object headed for the interest registry.
//! Both walks go from the deepest name prefix to the shallowest so the
//! most specific registration hears about the message first.
//!
//! While upcalls are on the stack the registries must stay structurally
//! sound, so the content path lifts a whole bucket out of the map, works
//! on it locally, and merges it back afterwards; records retired along
//! the way are swept by the next scheduler pass.

use crate::handle::Handle;
use crate::interests::ExpressedInterest;
use crate::keystore::LocateKey;
use crate::logging;
use crate::upcall::{UpcallInfo, UpcallKind, UpcallResult};
use ccn_wire::content::{self, parse_content_object, ContentType, ParsedContentObject};
use ccn_wire::interest::parse_interest;
use indexmap::map::Entry;

impl Handle {
    /// Dispatch one complete encoded message through the registered
    /// upcalls. Normal clients never call this; it is the entry point the
    /// incoming framer uses, and it is public so an embedded client can be
    /// driven without a socket.
    pub fn dispatch_message(&mut self, msg: &[u8]) {
        self.running += 1;
        if let Ok(pi) = parse_interest(msg) {
            self.deliver_interest(msg, &pi);
        } else if let Ok(pco) = parse_content_object(msg) {
            self.deliver_content(msg, pco);
        } else {
            // Neither parse succeeded; malformed messages are dropped.
            logging::trace!(self.log, "unparseable message dropped"; "size" => msg.len());
        }
        self.running -= 1;
        if self.running == 0 {
            self.fire_deferred_finals();
        }
    }

    fn deliver_interest(&mut self, msg: &[u8], pi: &ccn_wire::interest::ParsedInterest) {
        let comps = &pi.comps;
        if comps.is_empty() {
            return;
        }
        let keystart = comps[0];
        let mut kind = UpcallKind::Interest;
        for i in (0..comps.len()).rev() {
            let key = &msg[keystart..comps[i]];
            let action = match self.filters.get(key) {
                Some(action) => action.clone(),
                None => continue,
            };
            let info = UpcallInfo {
                matched_comps: i,
                interest_msg: Some(msg),
                interest: Some(pi),
                interest_comps: Some(comps),
                ..Default::default()
            };
            let res = action
                .try_invoke(self, kind, &info)
                .unwrap_or(UpcallResult::Err);
            if res == UpcallResult::InterestConsumed {
                kind = UpcallKind::ConsumedInterest;
            }
            // The upcall may have withdrawn its own registration; this
            // clone must not swallow the final release.
            self.release_action(action);
        }
    }

    fn deliver_content(&mut self, msg: &[u8], mut pco: ParsedContentObject) {
        let comps = pco.comps.clone();
        if comps.is_empty() {
            return;
        }
        let keystart = comps[0];
        for i in (0..comps.len()).rev() {
            let key = msg[keystart..comps[i]].to_vec();
            let mut bucket = match self.interests.shift_remove(&key) {
                Some(bucket) => bucket,
                None => continue,
            };
            for rec in bucket.iter_mut() {
                rec.check();
                if rec.target > 0 && rec.outstanding > 0 {
                    self.deliver_content_to(msg, &mut pco, &comps, i, rec);
                }
            }
            // Merge back behind anything upcalls registered meanwhile.
            match self.interests.entry(key) {
                Entry::Occupied(mut entry) => entry.get_mut().extend(bucket),
                Entry::Vacant(entry) => {
                    entry.insert(bucket);
                }
            }
        }
    }

    fn deliver_content_to(
        &mut self,
        msg: &[u8],
        pco: &mut ParsedContentObject,
        comps: &[usize],
        matched: usize,
        rec: &mut ExpressedInterest,
    ) {
        let interest_msg = match rec.msg.clone() {
            Some(interest_msg) => interest_msg,
            None => return,
        };
        let pi = match parse_interest(&interest_msg) {
            Ok(pi) => pi,
            Err(_) => return,
        };
        if !content::content_matches_interest(msg, pco, &interest_msg, &pi) {
            return;
        }

        if pco.content_type == ContentType::Key {
            let _ = self.cache_key(msg, pco);
        }
        let kind = match self.locate_key(msg, pco) {
            LocateKey::Found(key) => {
                if content::verify_content(msg, pco, &key) {
                    UpcallKind::Content
                } else {
                    UpcallKind::ContentBad
                }
            }
            LocateKey::Fetch | LocateKey::Unusable => UpcallKind::ContentUnverified,
        };

        rec.outstanding -= 1;
        let action = match rec.action.clone() {
            Some(action) => action,
            None => return,
        };
        let info = UpcallInfo {
            matched_comps: matched,
            interest_msg: Some(&interest_msg),
            interest: Some(&pi),
            interest_comps: Some(&pi.comps),
            content_msg: Some(msg),
            content: Some(&*pco),
            content_comps: Some(comps),
        };
        let res = action
            .try_invoke(self, kind, &info)
            .unwrap_or(UpcallResult::Err);
        rec.check();
        match res {
            UpcallResult::Reexpress => self.refresh_interest(rec),
            UpcallResult::Verify if kind == UpcallKind::ContentUnverified => {
                let _ = self.initiate_key_fetch(msg, pco, Some(rec));
            }
            _ => {
                rec.target = 0;
                rec.msg = None;
                rec.action = None;
                self.release_action(action);
            }
        }
    }
}
