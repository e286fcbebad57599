//! Reservation path-pattern overlap semantics
//!
//! # Pattern language
//!
//! A reservation pattern is a `/`-separated relative path. Each segment is
//! literal text, a single-segment glob (`*`, `?`, `[...]`, `{...}`), or the
//! recursive wildcard `**`. `\` separators, `./` components, and leading
//! slashes normalize away at compile time.
//!
//! # Overlap decision
//!
//! Patterns compile to segment lists and overlap is decided by walking the
//! two lists in lockstep:
//!
//! - `**` on either side may swallow zero or more segments of the other.
//! - A pattern that ends while the other still has segments claims the
//!   whole subtree beneath it (`src` overlaps `src/a.ts`).
//! - Two glob heads built from only `*`/`?` and literals are intersected
//!   exactly (`src/a*` and `src/*b` share `src/ab`; `*.rs` and `*.md`
//!   provably share nothing). Heads using character classes or alternates
//!   are assumed to intersect — conflicts are advisory, so the cheap bound
//!   errs toward a warning.
//! - A segment that fails to compile as a glob participates as literal
//!   text only.

use globset::{Glob, GlobMatcher};

/// One compiled path segment.
#[derive(Debug, Clone)]
enum Segment {
    /// Plain text, compared by equality.
    Literal(String),
    /// `*` alone: exactly one segment, any name.
    AnyName,
    /// `**`: zero or more segments.
    Subtree,
    /// A single-segment glob, kept alongside its source text.
    Glob { text: String, matcher: GlobMatcher },
}

fn is_glob_text(text: &str) -> bool {
    text.bytes()
        .any(|b| matches!(b, b'*' | b'?' | b'[' | b'{'))
}

/// Split a raw pattern into path segments, dropping separator noise.
fn split_segments(raw: &str) -> Vec<String> {
    raw.trim()
        .split(['/', '\\'])
        .filter(|s| !s.is_empty() && *s != ".")
        .map(str::to_string)
        .collect()
}

fn parse_segment(text: String) -> Segment {
    match text.as_str() {
        "*" => Segment::AnyName,
        "**" => Segment::Subtree,
        _ if is_glob_text(&text) => match Glob::new(&text) {
            Ok(glob) => Segment::Glob {
                matcher: glob.compile_matcher(),
                text,
            },
            // Uncompilable glob: degrade to literal text, equality only.
            Err(_) => Segment::Literal(text),
        },
        _ => Segment::Literal(text),
    }
}

/// A reservation pattern compiled for overlap checks.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    norm: String,
    segments: Vec<Segment>,
}

impl CompiledPattern {
    #[must_use]
    pub fn new(raw: &str) -> Self {
        let parts = split_segments(raw);
        let norm = parts.join("/");
        let segments = parts.into_iter().map(parse_segment).collect();
        Self { norm, segments }
    }

    /// The normalized pattern string.
    #[must_use]
    pub fn normalized(&self) -> &str {
        &self.norm
    }

    /// Whether any segment is a wildcard.
    #[must_use]
    pub fn is_glob(&self) -> bool {
        self.segments
            .iter()
            .any(|s| !matches!(s, Segment::Literal(_)))
    }

    /// Whether this pattern covers the given concrete path.
    ///
    /// The path is taken literally; subtree-prefix semantics apply, so
    /// `src` covers `src/a.ts`.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        let target: Vec<Segment> = split_segments(path)
            .into_iter()
            .map(Segment::Literal)
            .collect();
        walk(&self.segments, &target)
    }

    /// Overlap test per the module-level rules.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        walk(&self.segments, &other.segments)
    }
}

/// Can the two segment lists cover a common path?
fn walk(a: &[Segment], b: &[Segment]) -> bool {
    match (a.first(), b.first()) {
        // Both exhausted: they named the same path shape.
        (None, None) => true,
        // `**` swallows nothing (advance past it) or one more segment of
        // the other side.
        (Some(Segment::Subtree), _) => {
            walk(&a[1..], b) || (!b.is_empty() && walk(a, &b[1..]))
        }
        (_, Some(Segment::Subtree)) => {
            walk(a, &b[1..]) || (!a.is_empty() && walk(&a[1..], b))
        }
        // One side ended: it claims the subtree the other descends into.
        (None, Some(_)) | (Some(_), None) => true,
        (Some(x), Some(y)) => heads_intersect(x, y) && walk(&a[1..], &b[1..]),
    }
}

/// Can two single-segment heads accept a common name?
fn heads_intersect(a: &Segment, b: &Segment) -> bool {
    match (a, b) {
        (Segment::AnyName, _) | (_, Segment::AnyName) => true,
        (Segment::Literal(x), Segment::Literal(y)) => x == y,
        (Segment::Glob { matcher, .. }, Segment::Literal(text))
        | (Segment::Literal(text), Segment::Glob { matcher, .. }) => matcher.is_match(text),
        (Segment::Glob { text: x, .. }, Segment::Glob { text: y, .. }) => {
            if x.contains(['[', '{']) || y.contains(['[', '{']) {
                // Classes and alternates have no cheap exact bound here.
                return true;
            }
            wildcard_intersect(x, y)
        }
        // Subtree is consumed in `walk`, never compared as a head.
        (Segment::Subtree, _) | (_, Segment::Subtree) => true,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tok {
    Star,
    One,
    Lit(char),
}

/// Exact intersection test for two `*`/`?`/literal wildcard segments.
///
/// `dp[i][j]` holds when the suffixes `a[i..]` and `b[j..]` can match a
/// common string: a star matches empty or absorbs whatever character the
/// other side consumes next; non-star heads must agree on a character and
/// advance together.
fn wildcard_intersect(a: &str, b: &str) -> bool {
    let tok = |s: &str| -> Vec<Tok> {
        s.chars()
            .map(|c| match c {
                '*' => Tok::Star,
                '?' => Tok::One,
                c => Tok::Lit(c),
            })
            .collect()
    };
    let (ta, tb) = (tok(a), tok(b));
    let (n, m) = (ta.len(), tb.len());

    let mut dp = vec![vec![false; m + 1]; n + 1];
    dp[n][m] = true;
    for i in (0..=n).rev() {
        for j in (0..=m).rev() {
            if i == n && j == m {
                continue;
            }
            let mut reach = false;
            if i < n && ta[i] == Tok::Star {
                reach = dp[i + 1][j] || (j < m && dp[i][j + 1]);
            }
            if !reach && j < m && tb[j] == Tok::Star {
                reach = dp[i][j + 1] || (i < n && dp[i + 1][j]);
            }
            if !reach && i < n && j < m && ta[i] != Tok::Star && tb[j] != Tok::Star {
                let agree = match (ta[i], tb[j]) {
                    (Tok::Lit(x), Tok::Lit(y)) => x == y,
                    _ => true,
                };
                reach = agree && dp[i + 1][j + 1];
            }
            dp[i][j] = reach;
        }
    }
    dp[0][0]
}

/// Returns true when two patterns overlap under reservation semantics.
#[must_use]
pub fn patterns_overlap(left: &str, right: &str) -> bool {
    CompiledPattern::new(left).overlaps(&CompiledPattern::new(right))
}
