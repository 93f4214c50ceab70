//! Structured cursor over a single encoded message.
//!
//! The parsers walk a message element by element: peek at the next token,
//! enter tagged elements, pick up blob/udata bounds, and check closers.
//! Errors are sticky; once the cursor has mis-stepped every subsequent
//! probe fails, so parse routines can defer the error check.

use crate::coding::{DTag, Tt, CLOSE, MAX_TINY, TT_BITS, TT_HBIT, TT_MASK};
use crate::{WireError, WireResult};
use std::ops::Range;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Token {
    Close,
    Dtag(u64),
    Blob(Range2),
    Udata(Range2),
}

/// Content bounds of a blob/udata token: (start, end) relative to the buffer.
type Range2 = (usize, usize);

pub struct ElementDecoder<'a> {
    buf: &'a [u8],
    pos: usize,
    err: bool,
}

impl<'a> ElementDecoder<'a> {
    #[inline]
    pub fn new(buf: &'a [u8]) -> ElementDecoder<'a> {
        ElementDecoder { buf, pos: 0, err: false }
    }

    /// Byte offset of the token the cursor is sitting on.
    #[inline]
    pub fn token_index(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        self.err
    }

    #[inline]
    pub fn at_end(&self) -> bool {
        self.pos == self.buf.len()
    }

    /// Decode the token at the cursor without consuming it. Returns the
    /// token and the position just past it (past the content for blobs).
    fn peek(&self) -> Option<(Token, usize)> {
        if self.err {
            return None;
        }
        let mut i = self.pos;
        let mut val: u64 = 0;
        let mut started = false;
        loop {
            let b = *self.buf.get(i)?;
            i += 1;
            if !started && b == CLOSE {
                return Some((Token::Close, i));
            }
            if b & TT_HBIT == 0 {
                if val > u64::max_value() >> 7 {
                    return None;
                }
                val = (val << 7) | u64::from(b);
                started = true;
                continue;
            }
            let val = (val << (7 - TT_BITS)) | u64::from((b >> TT_BITS) & MAX_TINY as u8);
            let tt = b & TT_MASK;
            return if tt == Tt::Dtag as u8 {
                Some((Token::Dtag(val), i))
            } else if tt == Tt::Blob as u8 || tt == Tt::Udata as u8 {
                let end = i.checked_add(val as usize)?;
                if end > self.buf.len() {
                    return None;
                }
                let bounds = (i, end);
                if tt == Tt::Blob as u8 {
                    Some((Token::Blob(bounds), end))
                } else {
                    Some((Token::Udata(bounds), end))
                }
            } else {
                None
            };
        }
    }

    /// True when the cursor sits on the opening token of `tag`.
    #[inline]
    pub fn match_dtag(&self, tag: DTag) -> bool {
        matches!(self.peek(), Some((Token::Dtag(v), _)) if v == tag as u64)
    }

    /// True when the cursor sits on any element-opening token.
    #[inline]
    pub fn at_dtag(&self) -> bool {
        matches!(self.peek(), Some((Token::Dtag(_), _)))
    }

    /// Content bounds when the cursor sits on a blob.
    #[inline]
    pub fn match_blob(&self) -> Option<Range<usize>> {
        match self.peek() {
            Some((Token::Blob((s, e)), _)) => Some(s..e),
            _ => None,
        }
    }

    /// Content bounds when the cursor sits on udata.
    #[inline]
    pub fn match_udata(&self) -> Option<Range<usize>> {
        match self.peek() {
            Some((Token::Udata((s, e)), _)) => Some(s..e),
            _ => None,
        }
    }

    /// Consume the token at the cursor: enters a tagged element, or steps
    /// over a blob/udata including its content.
    pub fn advance(&mut self) {
        match self.peek() {
            Some((Token::Close, _)) => self.err = true,
            Some((_, next)) => self.pos = next,
            None => self.err = true,
        }
    }

    /// Consume the closer of the current element.
    pub fn check_close(&mut self) {
        match self.peek() {
            Some((Token::Close, next)) => self.pos = next,
            _ => self.err = true,
        }
    }

    /// Step over one whole element (the cursor must sit on its opening
    /// tag), including arbitrarily nested children.
    pub fn skip_element(&mut self) {
        if !self.at_dtag() {
            self.err = true;
            return;
        }
        let mut depth = 0usize;
        loop {
            match self.peek() {
                Some((Token::Close, next)) => {
                    self.pos = next;
                    depth -= 1;
                    if depth == 0 {
                        return;
                    }
                }
                Some((Token::Dtag(_), next)) => {
                    self.pos = next;
                    depth += 1;
                }
                Some((_, next)) => self.pos = next,
                None => {
                    self.err = true;
                    return;
                }
            }
        }
    }

    /// The byte range of one whole element starting at the cursor.
    pub fn element_range(&mut self) -> Range<usize> {
        let start = self.pos;
        self.skip_element();
        start..self.pos
    }

    #[inline]
    pub fn finish(&self) -> WireResult<()> {
        if self.err {
            Err(WireError::BadElement)
        } else {
            Ok(())
        }
    }
}

/// Content of a `<tag>BLOB</tag>` element found at `range` within `msg`.
pub fn ref_tagged_blob<'a>(msg: &'a [u8], range: &Range<usize>, tag: DTag) -> Option<&'a [u8]> {
    if range.start >= range.end || range.end > msg.len() {
        return None;
    }
    let body = &msg[range.clone()];
    let mut d = ElementDecoder::new(body);
    if !d.match_dtag(tag) {
        return None;
    }
    d.advance();
    let bounds = d.match_blob()?;
    d.advance();
    d.check_close();
    if d.is_error() {
        return None;
    }
    Some(&body[bounds])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coding::{append_closer, append_tag, append_tagged_blob, append_tagged_udata};

    fn sample() -> Vec<u8> {
        let mut buf = Vec::new();
        append_tag(&mut buf, DTag::Name);
        append_tagged_blob(&mut buf, DTag::Component, b"left");
        append_tagged_udata(&mut buf, DTag::NameComponentCount, b"2");
        append_closer(&mut buf);
        buf
    }

    #[test]
    fn test_walks_elements() {
        let buf = sample();
        let mut d = ElementDecoder::new(&buf);
        assert!(d.match_dtag(DTag::Name));
        d.advance();
        assert!(d.match_dtag(DTag::Component));
        d.advance();
        let blob = d.match_blob().unwrap();
        assert_eq!(&buf[blob], b"left");
        d.advance();
        d.check_close();
        assert!(d.match_dtag(DTag::NameComponentCount));
        d.advance();
        let text = d.match_udata().unwrap();
        assert_eq!(&buf[text], b"2");
        d.advance();
        d.check_close();
        d.check_close();
        assert!(d.finish().is_ok());
        assert!(d.at_end());
    }

    #[test]
    fn test_skip_element_covers_nested() {
        let mut buf = Vec::new();
        append_tag(&mut buf, DTag::KeyName);
        append_tag(&mut buf, DTag::Name);
        append_tagged_blob(&mut buf, DTag::Component, b"k");
        append_closer(&mut buf);
        append_closer(&mut buf);
        let total = buf.len();
        buf.extend_from_slice(&[0xde, 0xad]);

        let mut d = ElementDecoder::new(&buf);
        let range = d.element_range();
        assert_eq!(range, 0..total);
        assert!(!d.is_error());
    }

    #[test]
    fn test_close_check_fails_on_tag() {
        let buf = sample();
        let mut d = ElementDecoder::new(&buf);
        d.check_close();
        assert!(d.is_error());
        assert!(d.finish().is_err());
    }

    #[test]
    fn test_truncated_blob_is_error() {
        let mut buf = sample();
        buf.truncate(4);
        let mut d = ElementDecoder::new(&buf);
        d.advance();
        assert!(d.match_blob().is_none());
        d.advance();
        // Either path leaves the decoder in error.
        d.advance();
        assert!(d.is_error());
    }

    #[test]
    fn test_ref_tagged_blob() {
        let mut buf = Vec::new();
        append_tagged_blob(&mut buf, DTag::PublisherPublicKeyDigest, &[9u8; 32]);
        let range = 0..buf.len();
        let got = ref_tagged_blob(&buf, &range, DTag::PublisherPublicKeyDigest).unwrap();
        assert_eq!(got, &[9u8; 32][..]);
        assert!(ref_tagged_blob(&buf, &range, DTag::Key).is_none());
        assert!(ref_tagged_blob(&buf, &(0..0), DTag::Key).is_none());
    }
}
