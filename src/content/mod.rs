pub mod normalize;
pub mod similar;

use crate::catalog::CatalogItem;
use crate::settings::ContentSettings;

/// Model output → publishable body, without the related-items block.
///
/// Passes: unwrap envelope → drop ld+json → drop n/a tech-details rows → drop stale
/// "Produse similare" block.
pub fn prepare(raw_output: &str) -> String {
    let html = normalize::normalize_generated(raw_output);
    let html = normalize::strip_ld_json(&html);
    let html = normalize::clean_spec_list(&html);
    let html = normalize::remove_similar_section(&html);
    html.trim_end().to_string()
}

/// Full fragment for `item`: prepared body plus a freshly ranked related block.
/// Running it again on its own output yields the same fragment.
pub fn compose(
    raw_output: &str,
    item: &CatalogItem,
    catalog: &[CatalogItem],
    settings: &ContentSettings,
) -> String {
    let body = prepare(raw_output);
    let related = similar::rank(item, catalog, settings.max_similar);
    if related.is_empty() {
        return body;
    }
    format!(
        "{}\n{}",
        body,
        similar::render_similar(&related, settings.label_max)
    )
}

/// Tidy an existing description without involving the model.
pub fn clean_existing(html: &str) -> String {
    normalize::clean_spec_list(&normalize::strip_ld_json(html))
}
