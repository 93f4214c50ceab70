//! The publisher key cache and the key-fetch protocol.
//!
//! Content objects name their verifying key by publisher digest. Keys get
//! into the cache two ways: a KEY-type content object goes by (cached
//! under the digest of its encoding), or a KeyLocator carries the key
//! inline (cached under the digest of the key itself). When only a
//! KeyName is given, a sub-interest is issued for it and the triggering
//! interest parks until the key arrives.
//!
//! The cache is shared by reference so a nested one-shot handle can
//! borrow its parent's keys for the duration of the nested fetch.

use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::interests::ExpressedInterest;
use crate::logging;
use crate::upcall::{Action, UpcallKind, UpcallResult};
use ccn_wire::coding::{append_closer, append_tag, DTag};
use ccn_wire::content::{ContentType, KeyLocatorKind, ParsedContentObject};
use ccn_wire::crypto::{PublicKey, DIGEST_SIZE};
use hashbrown::HashMap;
use std::cell::RefCell;
use std::rc::Rc;

/// Shared cache of publisher public keys, keyed by digest. Entries are
/// never evicted; the population is bounded by the publishers an
/// application actually talks to.
pub(crate) struct KeyStore {
    keys: Rc<RefCell<HashMap<[u8; DIGEST_SIZE], PublicKey>>>,
}

impl KeyStore {
    pub(crate) fn new() -> KeyStore {
        KeyStore { keys: Rc::new(RefCell::new(HashMap::new())) }
    }

    /// Another handle on the same underlying cache.
    pub(crate) fn share(&self) -> KeyStore {
        KeyStore { keys: self.keys.clone() }
    }

    pub(crate) fn contains(&self, digest: &[u8; DIGEST_SIZE]) -> bool {
        self.keys.borrow().contains_key(digest)
    }

    pub(crate) fn get(&self, digest: &[u8]) -> Option<PublicKey> {
        if digest.len() != DIGEST_SIZE {
            return None;
        }
        let mut key = [0u8; DIGEST_SIZE];
        key.copy_from_slice(digest);
        self.keys.borrow().get(&key).cloned()
    }

    /// Insert unless present. Returns false when the digest was already
    /// cached.
    pub(crate) fn insert_new(&self, digest: [u8; DIGEST_SIZE], key: PublicKey) -> bool {
        let mut keys = self.keys.borrow_mut();
        if keys.contains_key(&digest) {
            return false;
        }
        keys.insert(digest, key);
        true
    }

    pub(crate) fn len(&self) -> usize {
        self.keys.borrow().len()
    }
}

/// What `locate_key` found out.
pub(crate) enum LocateKey {
    /// The verifying key, ready to use.
    Found(PublicKey),
    /// A KeyName points at it; fetch before verifying.
    Fetch,
    /// No locator this client can use.
    Unusable,
}

impl Handle {
    /// A KEY-type object carries a public key as its payload; remember it
    /// under the digest of the whole encoded object.
    pub(crate) fn cache_key(&mut self, msg: &[u8], pco: &mut ParsedContentObject) -> Result<()> {
        if pco.content_type != ContentType::Key {
            return Ok(());
        }
        let digest = pco.digest(msg);
        if self.keys.contains(&digest) {
            return Ok(());
        }
        let data = match pco.content_value(msg) {
            Some(data) => data,
            None => return self.note_err(Error::InvalidArg, "cache_key"),
        };
        let key = match PublicKey::from_bytes(data) {
            Ok(key) => key,
            Err(_) => return self.note_err(Error::InvalidArg, "cache_key"),
        };
        self.keys.insert_new(digest, key);
        logging::debug!(self.log, "key object cached"; "cached_keys" => self.keys.len());
        Ok(())
    }

    /// Find the key that verifies this object: from the cache by publisher
    /// digest, or inline from the KeyLocator. A KeyName means a fetch is
    /// needed; a Certificate or a missing locator is unusable and the
    /// content will surface unverified.
    pub(crate) fn locate_key(&mut self, msg: &[u8], pco: &ParsedContentObject) -> LocateKey {
        if let Some(pkeyid) = pco.publisher_digest_bytes(msg) {
            if let Some(key) = self.keys.get(pkeyid) {
                return LocateKey::Found(key);
            }
        }
        if pco.key_locator.is_empty() {
            return LocateKey::Unusable;
        }
        match pco.key_locator_kind {
            Some(KeyLocatorKind::KeyName) => LocateKey::Fetch,
            Some(KeyLocatorKind::Key) => {
                let data = match pco.inline_key_bytes(msg) {
                    Some(data) => data,
                    None => return LocateKey::Unusable,
                };
                let key = match PublicKey::from_bytes(data) {
                    Ok(key) => key,
                    Err(_) => return LocateKey::Unusable,
                };
                if !self.keys.insert_new(key.digest(), key.clone()) {
                    // The lookup above missed, so this digest can only be
                    // cached already if the publisher id disagrees with
                    // the key itself.
                    let _: Result<()> =
                        self.note_err(Error::Defect("inline key already cached"), "locate_key");
                }
                LocateKey::Found(key)
            }
            Some(KeyLocatorKind::Certificate) => {
                // Certificates are not interpreted; the application sees
                // the content unverified and applies its own policy.
                LocateKey::Unusable
            }
            None => LocateKey::Unusable,
        }
    }

    /// Issue a sub-interest for the key a KeyName locator points at. The
    /// triggering interest parks on the publisher digest and stops
    /// retransmitting until the key shows up.
    pub(crate) fn initiate_key_fetch(
        &mut self,
        msg: &[u8],
        pco: &ParsedContentObject,
        trigger: Option<&mut ExpressedInterest>,
    ) -> Result<()> {
        if let Some(trigger) = trigger {
            if let Some(pkeyid) = pco.publisher_digest_bytes(msg) {
                if pkeyid.len() == DIGEST_SIZE {
                    let mut want = [0u8; DIGEST_SIZE];
                    want.copy_from_slice(pkeyid);
                    trigger.wanted_pub = Some(want);
                }
            }
            trigger.target = 0;
        }

        // Without a KeyName there is nothing to ask for; the key may still
        // arrive along with other content.
        if pco.keyname_name.is_empty() {
            return Err(Error::InvalidArg);
        }
        let key_name = msg[pco.keyname_name.clone()].to_vec();
        let template = if pco.keyname_pub.is_empty() {
            None
        } else {
            let mut templ = Vec::new();
            append_tag(&mut templ, DTag::Interest);
            append_tag(&mut templ, DTag::Name);
            append_closer(&mut templ);
            templ.extend_from_slice(&msg[pco.keyname_pub.clone()]);
            append_closer(&mut templ);
            Some(templ)
        };
        logging::debug!(self.log, "fetching key"; "key_name_bytes" => key_name.len());

        // The main dispatch path caches the key as it goes by; this action
        // only has to accept the answer and go away.
        let action = Action::new(|_, kind, _| match kind {
            UpcallKind::Final => UpcallResult::Ok,
            UpcallKind::InterestTimedOut => UpcallResult::Ok,
            UpcallKind::Content | UpcallKind::ContentUnverified => UpcallResult::Ok,
            _ => UpcallResult::Err,
        });
        self.express_interest(&key_name, None, action, template.as_deref())
    }

    /// If this interest was waiting on a key that has since arrived,
    /// unpark and refresh it.
    pub(crate) fn check_pub_arrival(&mut self, rec: &mut ExpressedInterest) {
        let want = match rec.wanted_pub {
            Some(want) => want,
            None => return,
        };
        if self.keys.contains(&want) {
            logging::debug!(self.log, "awaited key arrived, reexpressing interest");
            rec.wanted_pub = None;
            rec.target = 1;
            self.refresh_interest(rec);
        }
    }
}
