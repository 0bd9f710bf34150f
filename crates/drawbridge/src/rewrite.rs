//! Streaming rewrite of `hyper://<hex key>` links into gateway URLs.
//!
//! A link is recognised only at a boundary: the start of the stream, or
//! after a byte that is neither an identifier character nor `>`. The key
//! must be exactly 64 hex digits and must not run on into another
//! identifier character. Matches become `{scheme}://{host key}.{host}`
//! with any path remainder passed through untouched.
//!
//! Candidates that straddle chunk boundaries are carried over, but never
//! more than [`MAX_MATCH_SPAN`] bytes, so memory use is bounded no matter
//! how large the body is.

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use treestore::{ByteStream, TreeKey, WIRE_KEY_LEN};

const NATIVE_SCHEME: &[u8] = b"hyper://";

/// Length of `hyper://` plus the key.
const LINK_LEN: usize = NATIVE_SCHEME.len() + WIRE_KEY_LEN;

/// Longest span buffered while deciding a candidate: the link plus one
/// byte of lookahead.
pub const MAX_MATCH_SPAN: usize = LINK_LEN + 1;

/// Where rewritten links should point. Varies per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteContext {
    pub scheme: String,
    /// Authority the tree subdomains hang off, port included.
    pub host: String,
}

impl RewriteContext {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
        }
    }

    fn link_for(&self, key: &TreeKey) -> String {
        format!("{}://{}.{}", self.scheme, key.to_host(), self.host)
    }
}

enum Candidate {
    No,
    /// Consistent so far but more input is needed to decide.
    Partial,
    Link(TreeKey),
}

/// Incremental rewriter. Feed chunks with [`push`](Self::push), then call
/// [`finish`](Self::finish) once to flush whatever is still held back.
#[derive(Debug)]
pub struct LinkRewriter {
    ctx: RewriteContext,
    carry: Vec<u8>,
    /// Last input byte before `carry`, for the boundary check.
    prev: Option<u8>,
}

impl LinkRewriter {
    pub fn new(ctx: RewriteContext) -> Self {
        Self {
            ctx,
            carry: Vec::with_capacity(MAX_MATCH_SPAN),
            prev: None,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) -> Bytes {
        let mut buf = std::mem::take(&mut self.carry);
        buf.extend_from_slice(chunk);
        self.scan(buf, false)
    }

    pub fn finish(&mut self) -> Bytes {
        let buf = std::mem::take(&mut self.carry);
        self.scan(buf, true)
    }

    /// Bytes currently held back awaiting more input.
    pub fn pending(&self) -> usize {
        self.carry.len()
    }

    fn scan(&mut self, buf: Vec<u8>, eof: bool) -> Bytes {
        let mut out = BytesMut::with_capacity(buf.len());
        let mut copied = 0;
        let mut i = 0;

        while i < buf.len() {
            let before = if i == 0 { self.prev } else { Some(buf[i - 1]) };
            if !buf[i].eq_ignore_ascii_case(&NATIVE_SCHEME[0]) || !is_boundary(before) {
                i += 1;
                continue;
            }

            match candidate_at(&buf[i..], eof) {
                Candidate::No => i += 1,
                Candidate::Partial => {
                    out.extend_from_slice(&buf[copied..i]);
                    if i > 0 {
                        self.prev = Some(buf[i - 1]);
                    }
                    self.carry.extend_from_slice(&buf[i..]);
                    return out.freeze();
                }
                Candidate::Link(key) => {
                    out.extend_from_slice(&buf[copied..i]);
                    out.extend_from_slice(self.ctx.link_for(&key).as_bytes());
                    i += LINK_LEN;
                    copied = i;
                }
            }
        }

        out.extend_from_slice(&buf[copied..]);
        if let Some(&last) = buf.last() {
            self.prev = Some(last);
        }
        out.freeze()
    }
}

fn is_ident(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn is_boundary(before: Option<u8>) -> bool {
    match before {
        None => true,
        Some(b) => !(is_ident(b) || b == b'$' || b == b'>'),
    }
}

fn candidate_at(s: &[u8], eof: bool) -> Candidate {
    for (idx, &b) in s.iter().take(LINK_LEN).enumerate() {
        let ok = match NATIVE_SCHEME.get(idx) {
            Some(expected) => b.eq_ignore_ascii_case(expected),
            None => b.is_ascii_hexdigit(),
        };
        if !ok {
            return Candidate::No;
        }
    }

    if s.len() < LINK_LEN {
        return if eof { Candidate::No } else { Candidate::Partial };
    }

    match s.get(LINK_LEN) {
        Some(&b) if is_ident(b) => Candidate::No,
        None if !eof => Candidate::Partial,
        _ => {
            let hex = std::str::from_utf8(&s[NATIVE_SCHEME.len()..LINK_LEN]).ok();
            match hex.and_then(|h| TreeKey::from_wire(h).ok()) {
                Some(key) => Candidate::Link(key),
                None => Candidate::No,
            }
        }
    }
}

/// Wrap a body stream so every chunk passes through a [`LinkRewriter`].
///
/// An error from the source is forwarded and ends the stream.
pub fn rewrite_stream(mut input: ByteStream, ctx: RewriteContext) -> ByteStream {
    let rewritten = async_stream::stream! {
        let mut rewriter = LinkRewriter::new(ctx);
        while let Some(chunk) = input.next().await {
            match chunk {
                Ok(chunk) => {
                    let out = rewriter.push(&chunk);
                    if !out.is_empty() {
                        yield Ok(out);
                    }
                }
                Err(err) => {
                    yield Err(err);
                    return;
                }
            }
        }
        let tail = rewriter.finish();
        if !tail.is_empty() {
            yield Ok(tail);
        }
    };
    rewritten.boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use pretty_assertions::assert_eq;
    use std::io;

    const WIRE: &str = "34f4c3f0bcf6bf5c39d7814d373946d8f04da5b4a525d940c98309cafb111d93";
    const HOST: &str = "6ktc7w5wytznreeqg56keea6v3r4v9dmmmjxjg69gc4wnyrh3p9g";

    fn ctx() -> RewriteContext {
        RewriteContext::new("https", "example.com")
    }

    fn rewrite_all(input: &str) -> String {
        let mut rw = LinkRewriter::new(ctx());
        let mut out = rw.push(input.as_bytes()).to_vec();
        out.extend_from_slice(&rw.finish());
        String::from_utf8(out).unwrap()
    }

    fn rewrite_split(input: &str, at: usize) -> String {
        let mut rw = LinkRewriter::new(ctx());
        let (a, b) = input.as_bytes().split_at(at);
        let mut out = rw.push(a).to_vec();
        out.extend_from_slice(&rw.push(b));
        out.extend_from_slice(&rw.finish());
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_rewrites_import() {
        let input = format!("import x from 'hyper://{WIRE}/mod.js'\n");
        assert_eq!(
            rewrite_all(&input),
            format!("import x from 'https://{HOST}.example.com/mod.js'\n")
        );
    }

    #[test]
    fn test_rewrites_attributes_and_start_of_stream() {
        let input = format!("hyper://{WIRE}/a.css <img src=\"hyper://{WIRE}\">");
        assert_eq!(
            rewrite_all(&input),
            format!("https://{HOST}.example.com/a.css <img src=\"https://{HOST}.example.com\">")
        );
    }

    #[test]
    fn test_scheme_is_case_insensitive() {
        let input = format!("(HYPER://{})", WIRE.to_uppercase());
        assert_eq!(rewrite_all(&input), format!("(https://{HOST}.example.com)"));
    }

    #[test]
    fn test_skips_non_boundaries() {
        let cases = [
            format!("xhyper://{WIRE}/"),
            format!("_hyper://{WIRE}/"),
            format!("$hyper://{WIRE}/"),
            format!("<p>hyper://{WIRE}</p>"),
        ];
        for input in cases {
            assert_eq!(rewrite_all(&input), input);
        }
    }

    #[test]
    fn test_requires_exact_key_length() {
        let long = format!("'hyper://{WIRE}a/'");
        assert_eq!(rewrite_all(&long), long);

        let short = format!("'hyper://{}/'", &WIRE[..63]);
        assert_eq!(rewrite_all(&short), short);

        let non_hex = format!("'hyper://{}g/'", &WIRE[..63]);
        assert_eq!(rewrite_all(&non_hex), non_hex);
    }

    #[test]
    fn test_key_at_end_of_stream() {
        let input = format!("\"hyper://{WIRE}");
        assert_eq!(rewrite_all(&input), format!("\"https://{HOST}.example.com"));
    }

    #[test]
    fn test_matches_across_every_split_point() {
        let input = format!("a = \"hyper://{WIRE}/x.js\"; b = 'hyper://{WIRE}';");
        let expected = format!(
            "a = \"https://{HOST}.example.com/x.js\"; b = 'https://{HOST}.example.com';"
        );
        for at in 0..=input.len() {
            assert_eq!(rewrite_split(&input, at), expected, "split at {at}");
        }
    }

    #[test]
    fn test_boundary_survives_split() {
        // The identifier byte arrives in the first chunk; no rewrite.
        let input = format!("xhyper://{WIRE}");
        assert_eq!(rewrite_split(&input, 1), input);
    }

    #[test]
    fn test_carry_is_bounded() {
        let mut rw = LinkRewriter::new(ctx());
        let input = format!(" hyper://{WIRE}");
        let mut emitted = 0;
        for byte in input.as_bytes() {
            emitted += rw.push(std::slice::from_ref(byte)).len();
            assert!(rw.pending() < MAX_MATCH_SPAN);
        }
        assert_eq!(emitted, 1);
        assert_eq!(rw.pending(), LINK_LEN);
        assert_eq!(rw.finish(), Bytes::from(format!("https://{HOST}.example.com")));
    }

    #[test]
    fn test_plain_text_passes_through_without_holding_back() {
        let mut rw = LinkRewriter::new(ctx());
        let out = rw.push(b"body { color: red }");
        assert_eq!(out, Bytes::from_static(b"body { color: red }"));
        assert_eq!(rw.pending(), 0);
    }

    #[tokio::test]
    async fn test_rewrite_stream() {
        let link = format!("src=\"hyper://{WIRE}/app.js\"");
        let (a, b) = link.split_at(20);
        let chunks: Vec<io::Result<Bytes>> = vec![
            Ok(Bytes::from(a.to_string())),
            Ok(Bytes::from(b.to_string())),
        ];
        let out = rewrite_stream(stream::iter(chunks).boxed(), ctx());
        let collected: Vec<Bytes> = out.map(|c| c.unwrap()).collect().await;
        let body: Vec<u8> = collected.concat();
        assert_eq!(
            String::from_utf8(body).unwrap(),
            format!("src=\"https://{HOST}.example.com/app.js\"")
        );
    }

    #[tokio::test]
    async fn test_rewrite_stream_forwards_errors() {
        let chunks: Vec<io::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"ok ")),
            Err(io::Error::other("boom")),
            Ok(Bytes::from_static(b"never")),
        ];
        let mut out = rewrite_stream(stream::iter(chunks).boxed(), ctx());
        assert_eq!(out.next().await.unwrap().unwrap(), Bytes::from_static(b"ok "));
        assert!(out.next().await.unwrap().is_err());
        assert!(out.next().await.is_none());
    }
}
