//! Interest parsing.
//!
//! The client cares about byte offsets more than values: templates are
//! spliced by range, and the registries key on raw prefix bytes, so the
//! parsed form is a bundle of ranges over the encoded message.

use crate::coding::DTag;
use crate::decoder::ElementDecoder;
use crate::name::walk_name;
use crate::{empty_at, WireError, WireResult};
use std::ops::Range;

/// Offsets into one encoded Interest. Empty ranges are anchored at the
/// point where the element would be inserted.
#[derive(Debug, Clone)]
pub struct ParsedInterest {
    /// Number of name components that constitute the prefix: the value of
    /// NameComponentCount when present, otherwise the full component count.
    pub prefix_comps: usize,
    /// Component index: n+1 offsets, see [`crate::name::walk_name`].
    pub comps: Vec<usize>,
    pub name: Range<usize>,
    pub component_count: Range<usize>,
    /// PublisherPublicKeyDigest selector element, when present.
    pub publisher_digest: Range<usize>,
    pub nonce: Range<usize>,
    pub other: Range<usize>,
}

/// Parse a complete encoded Interest message.
pub fn parse_interest(msg: &[u8]) -> WireResult<ParsedInterest> {
    let mut d = ElementDecoder::new(msg);
    if !d.match_dtag(DTag::Interest) {
        return Err(WireError::BadElement);
    }
    d.advance();

    let mut comps = Vec::new();
    let name = walk_name(&mut d, &mut comps)?;
    let ncomps = comps.len() - 1;

    let mut prefix_comps = ncomps;
    let component_count = if d.match_dtag(DTag::NameComponentCount) {
        let start = d.token_index();
        d.advance();
        let text = d.match_udata().ok_or(WireError::BadElement)?;
        prefix_comps = parse_decimal(&msg[text])?;
        d.advance();
        d.check_close();
        start..d.token_index()
    } else {
        empty_at(d.token_index())
    };

    let mut publisher_digest = empty_at(d.token_index());
    loop {
        if d.match_dtag(DTag::PublisherPublicKeyDigest) {
            publisher_digest = d.element_range();
        } else if d.match_dtag(DTag::Scope) {
            d.skip_element();
        } else {
            break;
        }
    }

    let nonce = if d.match_dtag(DTag::Nonce) {
        d.element_range()
    } else {
        empty_at(d.token_index())
    };

    let other_start = d.token_index();
    while d.at_dtag() {
        d.skip_element();
    }
    let other = other_start..d.token_index();

    d.check_close();
    d.finish()?;
    if !d.at_end() {
        return Err(WireError::BadElement);
    }

    Ok(ParsedInterest {
        prefix_comps,
        comps,
        name,
        component_count,
        publisher_digest,
        nonce,
        other,
    })
}

fn parse_decimal(text: &[u8]) -> WireResult<usize> {
    if text.is_empty() || text.len() > 9 {
        return Err(WireError::BadNumber);
    }
    let mut val = 0usize;
    for &b in text {
        if !b.is_ascii_digit() {
            return Err(WireError::BadNumber);
        }
        val = val * 10 + (b - b'0') as usize;
    }
    Ok(val)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coding::{
        append_closer, append_tag, append_tagged_blob, append_tagged_udata,
    };
    use crate::name::encode_name;

    fn interest(name_comps: &[&[u8]], count: Option<usize>) -> Vec<u8> {
        let mut buf = Vec::new();
        append_tag(&mut buf, DTag::Interest);
        buf.extend_from_slice(&encode_name(name_comps));
        if let Some(n) = count {
            append_tagged_udata(&mut buf, DTag::NameComponentCount, n.to_string().as_bytes());
        }
        append_closer(&mut buf);
        buf
    }

    #[test]
    fn test_parse_minimal() {
        let msg = interest(&[b"a", b"b"], None);
        let pi = parse_interest(&msg).unwrap();
        assert_eq!(pi.prefix_comps, 2);
        assert_eq!(pi.comps.len(), 3);
        assert_eq!(pi.name.start, 1);
        assert!(pi.component_count.is_empty());
        assert!(pi.publisher_digest.is_empty());
        assert!(pi.nonce.is_empty());
        assert!(pi.other.is_empty());
    }

    #[test]
    fn test_parse_component_count() {
        let msg = interest(&[b"a", b"b", b"c"], Some(2));
        let pi = parse_interest(&msg).unwrap();
        assert_eq!(pi.prefix_comps, 2);
        assert!(!pi.component_count.is_empty());
        assert_eq!(pi.component_count.start, pi.name.end);
    }

    #[test]
    fn test_parse_selectors_and_nonce() {
        let mut buf = Vec::new();
        append_tag(&mut buf, DTag::Interest);
        buf.extend_from_slice(&encode_name(&[b"a".as_ref()]));
        append_tagged_blob(&mut buf, DTag::PublisherPublicKeyDigest, &[3u8; 32]);
        append_tagged_blob(&mut buf, DTag::Nonce, &[1, 2, 3, 4]);
        append_closer(&mut buf);

        let pi = parse_interest(&buf).unwrap();
        assert!(!pi.publisher_digest.is_empty());
        assert!(!pi.nonce.is_empty());
        // The selector region sits between the count anchor and the nonce.
        assert!(pi.component_count.end <= pi.publisher_digest.start);
        assert!(pi.publisher_digest.end <= pi.nonce.start);
        assert!(pi.other.is_empty());
        assert_eq!(pi.other.start, pi.nonce.end);
    }

    #[test]
    fn test_parse_rejects_content_object() {
        let mut buf = Vec::new();
        append_tag(&mut buf, DTag::ContentObject);
        append_closer(&mut buf);
        assert!(parse_interest(&buf).is_err());
    }

    #[test]
    fn test_parse_rejects_trailing_bytes() {
        let mut msg = interest(&[b"a"], None);
        msg.push(0x00);
        assert!(parse_interest(&msg).is_err());
    }

    #[test]
    fn test_parse_rejects_bad_count() {
        let mut buf = Vec::new();
        append_tag(&mut buf, DTag::Interest);
        buf.extend_from_slice(&encode_name(&[b"a".as_ref()]));
        append_tagged_udata(&mut buf, DTag::NameComponentCount, b"2x");
        append_closer(&mut buf);
        assert!(parse_interest(&buf).is_err());
    }

    #[test]
    fn test_prefix_roundtrip_through_encoding() {
        // Encoding an interest with prefix_comps=k then parsing yields the
        // same prefix length and identical name bytes.
        let name = encode_name(&[b"a".as_ref(), b"b".as_ref(), b"c".as_ref()]);
        let mut buf = Vec::new();
        append_tag(&mut buf, DTag::Interest);
        buf.extend_from_slice(&name);
        append_tagged_udata(&mut buf, DTag::NameComponentCount, b"2");
        append_closer(&mut buf);

        let pi = parse_interest(&buf).unwrap();
        assert_eq!(pi.prefix_comps, 2);
        assert_eq!(&buf[pi.name.clone()], &name[..]);
    }
}
