use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::catalog::CatalogItem;

static TOKEN_SPLIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9ăâîșşțţ]+").unwrap());

/// A candidate together with the number of title tokens it shares with the current item.
#[derive(Debug, Clone, Copy)]
pub struct Ranked<'a> {
    pub item: &'a CatalogItem,
    pub score: usize,
}

/// Lower-cased distinct words of a title (Romanian diacritics count as letters).
pub fn tokenize(title: &str) -> HashSet<String> {
    let lower = title.to_lowercase();
    TOKEN_SPLIT_RE
        .split(&lower)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Pick up to `max_results` related items for `current`.
///
/// Candidates are ordered by shared-token count; the sort is stable so equal
/// scores keep catalog order. Zero-score items fill the remaining slots, which
/// means a block is still produced when nothing overlaps.
pub fn rank<'a>(
    current: &CatalogItem,
    candidates: &'a [CatalogItem],
    max_results: usize,
) -> Vec<Ranked<'a>> {
    let wanted = tokenize(&current.title);
    let mut scored: Vec<Ranked<'a>> = candidates
        .iter()
        .filter(|c| c.id != current.id)
        .map(|item| Ranked {
            item,
            score: tokenize(&item.title).intersection(&wanted).count(),
        })
        .collect();
    scored.sort_by(|a, b| b.score.cmp(&a.score));
    scored.truncate(max_results);
    scored
}

/// Render the "Produse similare" block.
pub fn render_similar(items: &[Ranked<'_>], label_max: usize) -> String {
    let mut out = String::from("<h2>Produse similare</h2>\n<ul>\n");
    for r in items {
        out.push_str(&format!(
            "<li><a href=\"{}\">{}</a></li>\n",
            escape_html(&r.item.link()),
            escape_html(&truncate(&r.item.title, label_max)),
        ));
    }
    out.push_str("</ul>");
    out
}

/// Cut to at most `max` characters, the trailing `...` included.
fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", truncated.trim_end())
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

// ── Tests ──
