//! Name encoding and prefix arithmetic.
//!
//! A name is a sequence of opaque byte components; the registries key on
//! the raw tagged bytes of a prefix, so everything here works in terms of
//! byte offsets into the encoded form.

use crate::coding::{append_closer, append_tag, append_tagged_blob, DTag};
use crate::decoder::ElementDecoder;
use crate::{WireError, WireResult};
use std::ops::Range;

/// Encode a name from its components.
pub fn encode_name<C: AsRef<[u8]>>(comps: &[C]) -> Vec<u8> {
    let mut buf = Vec::new();
    append_tag(&mut buf, DTag::Name);
    for c in comps {
        append_tagged_blob(&mut buf, DTag::Component, c.as_ref());
    }
    append_closer(&mut buf);
    buf
}

/// Walk a Name element at the cursor, recording the offset of every
/// component plus the end-of-last-component position into `comps`, so a
/// prefix of depth i spans `comps[0]..comps[i]`. Returns the byte range of
/// the whole element.
pub(crate) fn walk_name(d: &mut ElementDecoder, comps: &mut Vec<usize>) -> WireResult<Range<usize>> {
    let start = d.token_index();
    if !d.match_dtag(DTag::Name) {
        return Err(WireError::BadElement);
    }
    d.advance();
    while d.match_dtag(DTag::Component) {
        comps.push(d.token_index());
        d.advance();
        if d.match_blob().is_some() {
            d.advance();
        }
        d.check_close();
    }
    comps.push(d.token_index());
    d.check_close();
    d.finish()?;
    Ok(start..d.token_index())
}

/// Check that `namebuf` holds a valid encoded Name and return the byte
/// offset of the end of its `prefix_comps`-component prefix (`None` counts
/// the whole name). With `omit_possible_digest`, a trailing 36-byte
/// component sitting at the very end of the name is dropped from the
/// prefix, honouring the implicit-digest convention.
pub fn check_name(
    namebuf: &[u8],
    prefix_comps: Option<usize>,
    omit_possible_digest: bool,
) -> Option<usize> {
    if namebuf.len() < 2 {
        return None;
    }
    let mut d = ElementDecoder::new(namebuf);
    if !d.match_dtag(DTag::Name) {
        return None;
    }
    d.advance();
    let mut ans = d.token_index();
    let mut prev_ans = ans;
    let mut count = 0usize;
    while d.match_dtag(DTag::Component) {
        d.advance();
        if d.match_blob().is_some() {
            d.advance();
        }
        d.check_close();
        count += 1;
        if prefix_comps.map_or(true, |k| count <= k) {
            prev_ans = ans;
            ans = d.token_index();
        }
    }
    d.check_close();
    if d.is_error() {
        return None;
    }
    if let Some(k) = prefix_comps {
        if count < k {
            return None;
        }
    }
    if omit_possible_digest && ans == prev_ans + 36 && ans == namebuf.len() - 1 {
        return Some(prev_ans);
    }
    Some(ans)
}
