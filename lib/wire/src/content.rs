//! ContentObject parsing, matching and construction.
//!
//! Layout on the wire:
//!
//! ```text
//! ContentObject {
//!     Signature { SignatureBits(BLOB) }
//!     Name { Component* }
//!     SignedInfo {
//!         PublisherPublicKeyDigest(BLOB)
//!         Timestamp(BLOB)?
//!         Type(BLOB)?
//!         KeyLocator { Key(BLOB) | Certificate(BLOB)
//!                      | KeyName { Name PublisherPublicKeyDigest? } }?
//!     }
//!     Content(BLOB)
//! }
//! ```
//!
//! The signature covers everything from the end of the Signature element
//! through the end of the Content element.

use crate::coding::{append_closer, append_tag, append_tagged_blob, append_tt, DTag, Tt};
use crate::crypto::{self, PublicKey, SigningKey, DIGEST_SIZE};
use crate::decoder::{ref_tagged_blob, ElementDecoder};
use crate::interest::ParsedInterest;
use crate::name::walk_name;
use crate::{empty_at, WireError, WireResult};
use byteorder::{BigEndian, WriteBytesExt};
use std::ops::Range;

/// Content type magic values, carried as 3-byte blobs.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ContentType {
    Data = 0x0C04C0,
    Encr = 0x10D091,
    Gone = 0x18E344,
    Key = 0x28463F,
    Link = 0x2C834A,
    Nack = 0x34008A,
}

impl ContentType {
    fn from_blob(blob: &[u8]) -> Option<ContentType> {
        if blob.len() != 3 {
            return None;
        }
        let v = (u32::from(blob[0]) << 16) | (u32::from(blob[1]) << 8) | u32::from(blob[2]);
        match v {
            v if v == ContentType::Data as u32 => Some(ContentType::Data),
            v if v == ContentType::Encr as u32 => Some(ContentType::Encr),
            v if v == ContentType::Gone as u32 => Some(ContentType::Gone),
            v if v == ContentType::Key as u32 => Some(ContentType::Key),
            v if v == ContentType::Link as u32 => Some(ContentType::Link),
            v if v == ContentType::Nack as u32 => Some(ContentType::Nack),
            _ => None,
        }
    }

    fn to_blob(self) -> [u8; 3] {
        let v = self as u32;
        [(v >> 16) as u8, (v >> 8) as u8, v as u8]
    }
}

/// Which alternative a KeyLocator holds.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum KeyLocatorKind {
    Key,
    Certificate,
    KeyName,
}

/// Offsets into one encoded ContentObject. Element ranges; empty when the
/// element is absent.
#[derive(Debug, Clone)]
pub struct ParsedContentObject {
    pub comps: Vec<usize>,
    pub name: Range<usize>,
    pub signature_bits: Range<usize>,
    /// The span the signature covers.
    pub signed: Range<usize>,
    pub publisher_digest: Range<usize>,
    pub key_locator: Range<usize>,
    pub key_cert_keyname: Range<usize>,
    pub key_locator_kind: Option<KeyLocatorKind>,
    pub keyname_name: Range<usize>,
    pub keyname_pub: Range<usize>,
    pub content_type: ContentType,
    pub content: Range<usize>,
    /// End offset of the whole encoded object.
    pub e_pco: usize,
    digest: Option<[u8; DIGEST_SIZE]>,
}

impl ParsedContentObject {
    /// SHA-256 over the whole encoded object, computed once on demand.
    pub fn digest(&mut self, msg: &[u8]) -> [u8; DIGEST_SIZE] {
        match self.digest {
            Some(d) => d,
            None => {
                let d = crypto::sha256(&msg[..self.e_pco]);
                self.digest = Some(d);
                d
            }
        }
    }

    /// Raw publisher key digest bytes.
    #[inline]
    pub fn publisher_digest_bytes<'a>(&self, msg: &'a [u8]) -> Option<&'a [u8]> {
        ref_tagged_blob(msg, &self.publisher_digest, DTag::PublisherPublicKeyDigest)
    }

    /// The content payload.
    #[inline]
    pub fn content_value<'a>(&self, msg: &'a [u8]) -> Option<&'a [u8]> {
        ref_tagged_blob(msg, &self.content, DTag::Content)
    }

    /// Raw signature bytes.
    #[inline]
    pub fn signature_bytes<'a>(&self, msg: &'a [u8]) -> Option<&'a [u8]> {
        ref_tagged_blob(msg, &self.signature_bits, DTag::SignatureBits)
    }

    /// Wire encoding of an inline key, when the locator carries one.
    #[inline]
    pub fn inline_key_bytes<'a>(&self, msg: &'a [u8]) -> Option<&'a [u8]> {
        if self.key_locator_kind != Some(KeyLocatorKind::Key) {
            return None;
        }
        ref_tagged_blob(msg, &self.key_cert_keyname, DTag::Key)
    }
}

/// Parse a complete encoded ContentObject message.
pub fn parse_content_object(msg: &[u8]) -> WireResult<ParsedContentObject> {
    let mut d = ElementDecoder::new(msg);
    if !d.match_dtag(DTag::ContentObject) {
        return Err(WireError::BadElement);
    }
    d.advance();

    if !d.match_dtag(DTag::Signature) {
        return Err(WireError::BadElement);
    }
    d.advance();
    if !d.match_dtag(DTag::SignatureBits) {
        return Err(WireError::BadElement);
    }
    let signature_bits = d.element_range();
    d.check_close();
    let signed_start = d.token_index();

    let mut comps = Vec::new();
    let name = walk_name(&mut d, &mut comps)?;

    if !d.match_dtag(DTag::SignedInfo) {
        return Err(WireError::BadElement);
    }
    d.advance();
    if !d.match_dtag(DTag::PublisherPublicKeyDigest) {
        return Err(WireError::BadElement);
    }
    let publisher_digest = d.element_range();
    if d.match_dtag(DTag::Timestamp) {
        d.skip_element();
    }
    let mut content_type = ContentType::Data;
    if d.match_dtag(DTag::Type) {
        d.advance();
        let blob = d.match_blob().ok_or(WireError::BadElement)?;
        content_type = ContentType::from_blob(&msg[blob]).ok_or(WireError::BadElement)?;
        d.advance();
        d.check_close();
    }
    let mut key_locator = empty_at(d.token_index());
    let mut key_cert_keyname = empty_at(d.token_index());
    let mut key_locator_kind = None;
    let mut keyname_name = empty_at(d.token_index());
    let mut keyname_pub = empty_at(d.token_index());
    if d.match_dtag(DTag::KeyLocator) {
        let start = d.token_index();
        d.advance();
        let inner_start = d.token_index();
        if d.match_dtag(DTag::Key) {
            key_locator_kind = Some(KeyLocatorKind::Key);
            d.skip_element();
        } else if d.match_dtag(DTag::Certificate) {
            key_locator_kind = Some(KeyLocatorKind::Certificate);
            d.skip_element();
        } else if d.match_dtag(DTag::KeyName) {
            key_locator_kind = Some(KeyLocatorKind::KeyName);
            d.advance();
            if d.match_dtag(DTag::Name) {
                keyname_name = d.element_range();
            } else {
                return Err(WireError::BadElement);
            }
            if d.match_dtag(DTag::PublisherPublicKeyDigest) {
                keyname_pub = d.element_range();
            }
            d.check_close();
        } else {
            return Err(WireError::BadElement);
        }
        key_cert_keyname = inner_start..d.token_index();
        d.check_close();
        key_locator = start..d.token_index();
    }
    d.check_close();

    if !d.match_dtag(DTag::Content) {
        return Err(WireError::BadElement);
    }
    let content = d.element_range();
    let signed = signed_start..content.end;

    d.check_close();
    d.finish()?;
    if !d.at_end() {
        return Err(WireError::BadElement);
    }

    Ok(ParsedContentObject {
        comps,
        name,
        signature_bits,
        signed,
        publisher_digest,
        key_locator,
        key_cert_keyname,
        key_locator_kind,
        keyname_name,
        keyname_pub,
        content_type,
        content,
        e_pco: msg.len(),
        digest: None,
    })
}

/// Does this object answer that interest? The interest's prefix components
/// must be byte-identical to the object's leading components; one extra
/// prefix component is allowed when it equals the object's implicit
/// digest. A publisher selector, when present, must match the object's
/// publisher.
pub fn content_matches_interest(
    content_msg: &[u8],
    pco: &ParsedContentObject,
    interest_msg: &[u8],
    pi: &ParsedInterest,
) -> bool {
    let k = pi.prefix_comps;
    let ccount = pco.comps.len() - 1;
    if k + 1 > pi.comps.len() || k > ccount + 1 {
        return false;
    }
    let shared = k.min(ccount);
    let want = &interest_msg[pi.comps[0]..pi.comps[shared]];
    let have = &content_msg[pco.comps[0]..pco.comps[shared]];
    if want != have {
        return false;
    }
    if k == ccount + 1 {
        // The component beyond the object's own name must carry the
        // implicit digest of the whole encoded object.
        let comp = ref_tagged_blob(
            interest_msg,
            &(pi.comps[k - 1]..pi.comps[k]),
            DTag::Component,
        );
        let digest = crypto::sha256(&content_msg[..pco.e_pco]);
        match comp {
            Some(comp) if comp == &digest[..] => {}
            _ => return false,
        }
    }
    if !pi.publisher_digest.is_empty() {
        let want = ref_tagged_blob(interest_msg, &pi.publisher_digest, DTag::PublisherPublicKeyDigest);
        let have = pco.publisher_digest_bytes(content_msg);
        if want.is_none() || want != have {
            return false;
        }
    }
    true
}

/// Verify the object's signature with `key`.
pub fn verify_content(msg: &[u8], pco: &ParsedContentObject, key: &PublicKey) -> bool {
    match pco.signature_bytes(msg) {
        Some(sig) => key.verify(&msg[pco.signed.clone()], sig),
        None => false,
    }
}

/// How a built object tells consumers where its key lives.
pub enum KeyLocator<'a> {
    None,
    /// Inline wire-encoded public key.
    Key(&'a [u8]),
    Certificate(&'a [u8]),
    KeyName {
        name: &'a [u8],
        publisher_digest: Option<&'a [u8; DIGEST_SIZE]>,
    },
}

/// Encode and sign a ContentObject. `name` is an encoded Name element;
/// `timestamp_secs` is seconds since the epoch, carried as the usual
/// 6-byte seconds-and-fraction blob.
pub fn encode_content_object(
    name: &[u8],
    payload: &[u8],
    content_type: ContentType,
    locator: &KeyLocator,
    timestamp_secs: u64,
    signer: &SigningKey,
) -> Vec<u8> {
    let mut body = Vec::with_capacity(name.len() + payload.len() + 128);
    body.extend_from_slice(name);

    append_tag(&mut body, DTag::SignedInfo);
    let publisher = crypto::public_key_of(signer).digest();
    append_tagged_blob(&mut body, DTag::PublisherPublicKeyDigest, &publisher);
    let mut stamp = Vec::with_capacity(6);
    stamp
        .write_uint::<BigEndian>(timestamp_secs << 12, 6)
        .expect("timestamp encoding cannot fail");
    append_tagged_blob(&mut body, DTag::Timestamp, &stamp);
    if content_type != ContentType::Data {
        append_tagged_blob(&mut body, DTag::Type, &content_type.to_blob());
    }
    match locator {
        KeyLocator::None => {}
        KeyLocator::Key(key) => {
            append_tag(&mut body, DTag::KeyLocator);
            append_tagged_blob(&mut body, DTag::Key, key);
            append_closer(&mut body);
        }
        KeyLocator::Certificate(cert) => {
            append_tag(&mut body, DTag::KeyLocator);
            append_tagged_blob(&mut body, DTag::Certificate, cert);
            append_closer(&mut body);
        }
        KeyLocator::KeyName { name, publisher_digest } => {
            append_tag(&mut body, DTag::KeyLocator);
            append_tag(&mut body, DTag::KeyName);
            body.extend_from_slice(name);
            if let Some(d) = publisher_digest {
                append_tagged_blob(&mut body, DTag::PublisherPublicKeyDigest, &d[..]);
            }
            append_closer(&mut body);
            append_closer(&mut body);
        }
    }
    append_closer(&mut body);

    append_tag(&mut body, DTag::Content);
    append_tt(&mut body, payload.len() as u64, Tt::Blob);
    body.extend_from_slice(payload);
    append_closer(&mut body);

    let sig = crypto::sign(signer, &body);

    let mut msg = Vec::with_capacity(body.len() + 80);
    append_tag(&mut msg, DTag::ContentObject);
    append_tag(&mut msg, DTag::Signature);
    append_tagged_blob(&mut msg, DTag::SignatureBits, &sig);
    append_closer(&mut msg);
    msg.extend_from_slice(&body);
    append_closer(&mut msg);
    msg
}
