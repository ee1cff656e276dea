//! Reduce a raw message body to the text its sender actually wrote.
//!
//! Quoted reply chains, forwarded headers, signatures, client banners and
//! markup are removed, then whitespace is collapsed so that re-renderings of
//! the same message by the mail client converge to the same string. The
//! result is part of the store's identity key, so any change here changes
//! which records count as duplicates.

use std::sync::LazyLock;

use log::debug;
use regex::Regex;

/// Wide enough that html2text never re-wraps a paragraph.
const HTML_WIDTH: usize = 10_000;

/// What the driver knows about the body it delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientHints {
    pub html: bool,
}

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("bad built-in pattern {pattern:?}: {e}"))
}

static HTML_SNIFF: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?i)<(?:html|body|div|p|br|table|span)\b[^>]*>"));

// Only tag-shaped text: `<name ...>` or `</name>`. Leaves `<a@b.com>` alone.
static TAG: LazyLock<Regex> =
    LazyLock::new(|| re(r"</?[A-Za-z][A-Za-z0-9]*(?:\s[^<>]*)?/?>"));

static BANNERS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?is)(?:Some people who received this message don't|You don't) often get email from .+?Learn why this is important",
        r"\[ at https://aka\.ms/LearnAboutSenderIdentification \]",
        r"(?im)^.*reacted via Gmail.*$",
        r"(?m)^.*已通过 Gmail\s*做出回应.*$",
        r"(?m)^.*님이 Gmail\s*을 통해 반응함.*$",
    ]
    .into_iter()
    .map(re)
    .collect()
});

// Reply/forward markers that can sit mid-line once a client has flattened
// the quoted header onto one line.
static INLINE_BOUNDARIES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // Plain-text clients wrap long headers, leaving `wrote:` on the next line.
        r"\bOn [^\n]{1,300}?\n?[^\n]{0,200}?\bwrote:",
        r"\bAt \d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}, [^\n]{1,300}? wrote:",
        r"\bAm [^\n]{1,300}? schrieb [^\n]{0,300}?:",
        r"\bLe [^\n]{1,300}? a écrit ?:",
        r"\bEl [^\n]{1,300}? escribió:",
        r"(?m)^[^\n]{0,300}?[写寫]道：",
        r"From: [^\n]+? (?:Sent|Date): [^\n]+? To: [^\n]+? Subject:",
        r"(?i)-{2,}\s*(?:Original|Forwarded) Message\s*-{2,}",
    ]
    .into_iter()
    .map(re)
    .collect()
});

// Tested against each trimmed line; everything from the first hit on is dropped.
static LINE_BOUNDARIES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^[>\s]*(?:On|At)\b.{0,300}\bwrote:?$",
        r"^\*?From:\s*\S",
        r"^Sent:\s",
        r"^Date:\s",
        r"(?i)^-*\s*(?:Original|Forwarded) Message\s*-*$",
        // Signature delimiter (`-- `) and horizontal rules.
        r"^(?:--|-{3,}|_{3,}|={3,}|\*{3,})$",
        r"(?i)reacted to your message\s*[_:]*$",
        r"(?i)(?:schrieb|a écrit|escribió)\s*:?$",
        r"[写寫]道：$",
        r"^.+?が .+? に返信しました：?$",
        r"^.+?님이 .+?에게 답장했습니다：?$",
    ]
    .into_iter()
    .map(re)
    .collect()
});

/// Clean a raw body. Never fails: if cleaning would leave nothing of a
/// non-empty body, the whitespace-collapsed input is returned instead.
pub fn normalize(raw: &str, hints: ClientHints) -> String {
    let unified = unify(raw);

    let mut text = if hints.html || HTML_SNIFF.is_match(&unified) {
        html_to_text(&unified)
    } else {
        unified.clone()
    };
    text = strip_markup(&text);
    for banner in BANNERS.iter() {
        text = banner.replace_all(&text, "").into_owned();
    }
    text = cut_at_inline_boundary(&text);

    let cleaned = collapse_whitespace(&visible_lines(&text));
    if cleaned.is_empty() {
        collapse_whitespace(&unified)
    } else {
        cleaned
    }
}

fn unify(raw: &str) -> String {
    raw.replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\u{a0}', " ")
        .replace(['\u{200b}', '\u{feff}'], "")
}

fn html_to_text(html: &str) -> String {
    match html2text::from_read(html.as_bytes(), HTML_WIDTH) {
        Ok(text) => text,
        Err(e) => {
            debug!("html2text failed, falling back to tag stripping: {e}");
            html.to_string()
        }
    }
}

fn strip_markup(text: &str) -> String {
    TAG.replace_all(text, "")
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn cut_at_inline_boundary(text: &str) -> String {
    let cut = INLINE_BOUNDARIES
        .iter()
        .filter_map(|pattern| pattern.find(text).map(|m| m.start()))
        .min();
    match cut {
        Some(at) => text[..at].to_string(),
        None => text.to_string(),
    }
}

/// Lines up to the first reply boundary or signature, minus quoted lines.
fn visible_lines(text: &str) -> String {
    let mut kept = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if LINE_BOUNDARIES.iter().any(|p| p.is_match(trimmed)) {
            break;
        }
        if trimmed.starts_with('>') {
            continue;
        }
        kept.push(line);
    }
    kept.join("\n")
}

/// Fold every whitespace run, line breaks included, into a single space.
/// Clients disagree on paragraph breaks, so line structure is not kept.
fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
