use std::ops::Range;
use std::sync::LazyLock;

use regex::{Captures, Regex};

static LD_JSON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<script\b[^>]*\btype\s*=\s*["']?application/ld\+json["']?[^>]*>.*?</script\s*>"#)
        .unwrap()
});
static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"```[A-Za-z0-9_-]*").unwrap());
static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<h[1-6]\b[^>]*>(.*?)</h[1-6]\s*>").unwrap());
static SPEC_HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)specifica[tțţ]ii\s+tehnice").unwrap());
static UL_OPEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<ul\b[^>]*>").unwrap());
static UL_TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<(/?)ul\b[^>]*>").unwrap());
static LI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<li\b[^>]*>(.*?)</li\s*>").unwrap());
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
static NOT_APPLICABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:[^:]{1,60}:\s*)?(?:na|n\s*/\s*a|n\.\s*a)\.?$").unwrap()
});
static SIMILAR_HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^produse\s+similare$").unwrap());
static LEADING_UL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^\s*<ul\b[^>]*>").unwrap());

/// Fields that may carry the HTML payload in a JSON envelope, in priority order.
const HTML_FIELDS: &[&str] = &["new_content_html", "html"];

static FIELD_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    HTML_FIELDS
        .iter()
        .map(|f| Regex::new(&format!(r#""{}"\s*:\s*"((?:[^"\\]|\\.)*)"#, f)).unwrap())
        .collect()
});

/// Remove every embedded `application/ld+json` script block.
pub fn strip_ld_json(html: &str) -> String {
    LD_JSON_RE.replace_all(html, "").into_owned()
}

/// Turn raw model output into the plain HTML payload.
///
/// Handles code fences, JSON envelopes and JSON that was cut off mid-string.
/// Anything else is assumed to already be HTML and is returned trimmed.
pub fn normalize_generated(raw: &str) -> String {
    let unfenced = FENCE_RE.replace_all(raw, "");
    let text = unfenced.trim();

    if !text.starts_with('{') {
        return text.to_string();
    }

    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(value) => HTML_FIELDS
            .iter()
            .find_map(|f| value.get(*f).and_then(|v| v.as_str()))
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| text.to_string()),
        Err(_) => FIELD_RES
            .iter()
            .find_map(|re| re.captures(text))
            .map(|caps| unescape_json_fragment(&caps[1]).trim().to_string())
            .unwrap_or_else(|| text.to_string()),
    }
}

fn unescape_json_fragment(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => {}
            Some('"') => out.push('"'),
            Some('/') => out.push('/'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            // dangling backslash at a truncation point
            None => {}
        }
    }
    out
}

/// Drop "n/a" rows from the list that follows the "Specificatii tehnice" heading.
///
/// Works on offsets: heading end → first `<ul>` after it → the `</ul>` that
/// closes it. If any of the three is missing the input comes back untouched.
pub fn clean_spec_list(html: &str) -> String {
    let Some(heading_end) = HEADING_RE
        .captures_iter(html)
        .find(|caps| SPEC_HEADING_RE.is_match(&visible_text(&caps[1])))
        .and_then(|caps| caps.get(0))
        .map(|m| m.end())
    else {
        return html.to_string();
    };

    let Some(open) = UL_OPEN_RE.find_at(html, heading_end) else {
        return html.to_string();
    };
    let Some(close) = matching_ul_close(html, open.end()) else {
        return html.to_string();
    };
    let close_start = close.start;

    let items = &html[open.end()..close_start];
    let cleaned = LI_RE.replace_all(items, |caps: &Captures| {
        if is_not_applicable(&visible_text(&caps[1])) {
            String::new()
        } else {
            caps[0].to_string()
        }
    });

    let mut out = String::with_capacity(html.len());
    out.push_str(&html[..open.end()]);
    out.push_str(&cleaned);
    out.push_str(&html[close_start..]);
    out
}

/// Span of the `</ul>` closing a list whose contents start at `from`.
fn matching_ul_close(html: &str, from: usize) -> Option<Range<usize>> {
    let mut depth = 1usize;
    for caps in UL_TAG_RE.captures_iter(&html[from..]) {
        let m = caps.get(0)?;
        if caps[1].is_empty() {
            depth += 1;
        } else {
            depth -= 1;
            if depth == 0 {
                return Some(from + m.start()..from + m.end());
            }
        }
    }
    None
}

fn is_not_applicable(text: &str) -> bool {
    text.eq_ignore_ascii_case("na") || NOT_APPLICABLE_RE.is_match(text)
}

fn visible_text(fragment: &str) -> String {
    let stripped = TAG_RE.replace_all(fragment, " ");
    stripped
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Remove a previously generated "Produse similare" block (heading plus its list).
///
/// The list is cut up to its matching `</ul>`. A block whose list never
/// closes is left in place.
pub fn remove_similar_section(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut cursor = 0;
    for caps in HEADING_RE.captures_iter(html) {
        let Some(heading) = caps.get(0) else { continue };
        if heading.start() < cursor || !SIMILAR_HEADING_RE.is_match(&visible_text(&caps[1])) {
            continue;
        }
        let block_end = match LEADING_UL_RE.find(&html[heading.end()..]) {
            Some(open) => match matching_ul_close(html, heading.end() + open.end()) {
                Some(close) => close.end,
                None => continue,
            },
            None => heading.end(),
        };
        out.push_str(html[cursor..heading.start()].trim_end());
        cursor = block_end;
    }
    out.push_str(&html[cursor..]);
    out
}

// ── Tests ──
