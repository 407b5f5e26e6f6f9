use anyhow::Result;
use chrono::NaiveDate;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::catalog::{Catalog, CatalogItem};
use crate::content;
use crate::generator::{build_prompt, TextGenerator};
use crate::publish::{Post, Publisher};
use crate::settings::{ContentSettings, Settings};
use crate::state::StateStore;

pub const LAST_RUN_KEY: &str = "last_run_date";

pub fn done_key(item_id: &str) -> String {
    format!("done:{}", item_id)
}

pub struct RunOptions {
    pub limit: Option<usize>,
    pub force: bool,
    pub today: NaiveDate,
    pub draft: bool,
    pub tags: Vec<String>,
    pub content: ContentSettings,
}

impl RunOptions {
    pub fn from_settings(settings: &Settings, today: NaiveDate) -> Self {
        RunOptions {
            limit: None,
            force: false,
            today,
            draft: settings.publish.draft,
            tags: settings.publish.tags.clone(),
            content: settings.content.clone(),
        }
    }

    fn post(&self, item: &CatalogItem, html: String) -> Post {
        Post {
            slug: item.slug(),
            title: item.title.clone(),
            tags: self.tags.clone(),
            draft: self.draft,
            html,
        }
    }
}

#[derive(Debug, Default)]
pub struct RunStats {
    /// True when the pass was skipped because it already ran today.
    pub skipped: bool,
    pub pending: usize,
    pub published: usize,
    pub failed: usize,
}

/// One scheduled pass: rewrite and publish every catalog item not yet done.
///
/// Items are marked `done:{id}` only after they were published, so failures
/// are retried on the next pass.
pub async fn run_pass(
    state: &mut StateStore,
    catalog: &dyn Catalog,
    generator: &dyn TextGenerator,
    publisher: &dyn Publisher,
    opts: &RunOptions,
) -> Result<RunStats> {
    let today = opts.today.to_string();
    if !opts.force && state.get(LAST_RUN_KEY).await.as_deref() == Some(today.as_str()) {
        info!("Already ran on {}, skipping (use --force to run again)", today);
        return Ok(RunStats {
            skipped: true,
            ..Default::default()
        });
    }

    info!(remote_state = state.remote_configured(), "Starting pass {}", today);
    let items = catalog.items().await?;
    let keys: Vec<String> = items.iter().map(|i| done_key(&i.id)).collect();
    let done = state.get_many(&keys).await;
    let pending: Vec<&CatalogItem> = items
        .iter()
        .zip(&done)
        .filter(|(_, marker)| marker.is_none())
        .map(|(item, _)| item)
        .take(opts.limit.unwrap_or(usize::MAX))
        .collect();

    let mut stats = RunStats {
        pending: pending.len(),
        ..Default::default()
    };

    let pb = ProgressBar::new(pending.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    for item in pending {
        pb.inc(1);
        let raw = match generator.generate(&build_prompt(item)).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Generation failed for {}: {:#}", item.id, e);
                stats.failed += 1;
                continue;
            }
        };

        let html = content::compose(&raw, item, &items, &opts.content);
        if let Err(e) = publisher.publish(&opts.post(item, html)).await {
            warn!("Publishing failed for {}: {:#}", item.id, e);
            stats.failed += 1;
            continue;
        }
        state.set(&done_key(&item.id), &today).await;
        stats.published += 1;
    }
    pb.finish_and_clear();

    state.set(LAST_RUN_KEY, &today).await;
    info!(
        "Pass {}: {} pending, {} published, {} failed",
        today, stats.pending, stats.published, stats.failed
    );
    Ok(stats)
}

/// Strip ld+json and n/a tech-details rows from stored descriptions; publish the ones that changed.
pub async fn clean_pass(
    catalog: &dyn Catalog,
    publisher: &dyn Publisher,
    opts: &RunOptions,
) -> Result<usize> {
    let items = catalog.items().await?;
    let changed: Vec<Post> = items
        .par_iter()
        .filter_map(|item| {
            let original = item.description.as_deref()?;
            let cleaned = content::clean_existing(original);
            (cleaned != original).then(|| opts.post(item, cleaned))
        })
        .collect();

    for post in &changed {
        publisher.publish(post).await?;
    }
    info!("Cleaned {} of {} descriptions", changed.len(), items.len());
    Ok(changed.len())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use anyhow::anyhow;
    use async_trait::async_trait;

    use super::*;

    struct FixedCatalog(Vec<CatalogItem>);

    #[async_trait]
    impl Catalog for FixedCatalog {
        async fn items(&self) -> Result<Vec<CatalogItem>> {
            Ok(self.0.clone())
        }
    }

    /// Answers with a fenced JSON envelope; refuses prompts for titles containing "Defect".
    struct CannedGenerator;

    #[async_trait]
    impl TextGenerator for CannedGenerator {
        async fn generate(&self, prompt: &str) -> Result<String> {
            if prompt.contains("Defect") {
                return Err(anyhow!("model overloaded"));
            }
            Ok("```json\n{\"new_content_html\":\"<p>Nou</p><h2>Specificatii tehnice</h2><ul><li>Culoare: Rosu</li><li>na</li></ul>\"}\n```".to_string())
        }
    }

    #[derive(Default)]
    struct Collected(Mutex<Vec<Post>>);

    impl Collected {
        fn slugs(&self) -> Vec<String> {
            self.0.lock().unwrap().iter().map(|p| p.slug.clone()).collect()
        }
    }

    #[async_trait]
    impl Publisher for Collected {
        async fn publish(&self, post: &Post) -> Result<()> {
            self.0.lock().unwrap().push(post.clone());
            Ok(())
        }
    }

    fn catalog() -> FixedCatalog {
        let mut items = vec![
            CatalogItem::new("1", "Cutie Pizza 30cm"),
            CatalogItem::new("2", "Cutie Pizza 32cm"),
            CatalogItem::new("3", "Pahar Carton"),
        ];
        items[2].description =
            Some("<script type=\"application/ld+json\">{}</script><p>Pahar</p>".into());
        FixedCatalog(items)
    }

    fn opts() -> RunOptions {
        let mut opts = RunOptions::from_settings(
            &Settings::default(),
            NaiveDate::from_ymd_opt(2026, 10, 18).unwrap(),
        );
        opts.content.max_similar = 1;
        opts
    }

    #[tokio::test]
    async fn publishes_pending_items_and_records_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = StateStore::local_only(dir.path().join("state.json"));
        let published = Collected::default();

        let stats = run_pass(&mut state, &catalog(), &CannedGenerator, &published, &opts())
            .await
            .unwrap();
        assert_eq!((stats.pending, stats.published, stats.failed), (3, 3, 0));
        assert_eq!(published.slugs(), vec!["1", "2", "3"]);

        let first = published.0.lock().unwrap()[0].clone();
        assert!(first.draft);
        assert!(first.html.starts_with("<p>Nou</p>"));
        assert!(!first.html.contains("<li>na</li>"));
        assert!(first.html.contains("<a href=\"/products/2\">Cutie Pizza 32cm</a>"));

        assert_eq!(state.get(LAST_RUN_KEY).await.as_deref(), Some("2026-10-18"));
        assert_eq!(state.get("done:2").await.as_deref(), Some("2026-10-18"));
    }

    #[tokio::test]
    async fn second_pass_same_day_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = StateStore::local_only(dir.path().join("state.json"));
        let published = Collected::default();
        run_pass(&mut state, &catalog(), &CannedGenerator, &published, &opts())
            .await
            .unwrap();

        let stats = run_pass(&mut state, &catalog(), &CannedGenerator, &published, &opts())
            .await
            .unwrap();
        assert!(stats.skipped);
        assert_eq!(published.slugs().len(), 3);

        let mut forced = opts();
        forced.force = true;
        let stats = run_pass(&mut state, &catalog(), &CannedGenerator, &published, &forced)
            .await
            .unwrap();
        assert!(!stats.skipped);
        assert_eq!(stats.pending, 0);
    }

    #[tokio::test]
    async fn failed_items_stay_pending() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = StateStore::local_only(dir.path().join("state.json"));
        let published = Collected::default();
        let mut items = catalog();
        items.0[1].title = "Cutie Defect".into();

        let stats = run_pass(&mut state, &items, &CannedGenerator, &published, &opts())
            .await
            .unwrap();
        assert_eq!((stats.published, stats.failed), (2, 1));
        assert_eq!(state.get("done:2").await, None);
        assert_eq!(state.get("done:3").await.as_deref(), Some("2026-10-18"));
    }

    #[tokio::test]
    async fn limit_caps_pending_items() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = StateStore::local_only(dir.path().join("state.json"));
        state.set("done:1", "2026-10-01").await;
        let published = Collected::default();
        let mut limited = opts();
        limited.limit = Some(1);

        let stats = run_pass(&mut state, &catalog(), &CannedGenerator, &published, &limited)
            .await
            .unwrap();
        assert_eq!(stats.pending, 1);
        assert_eq!(published.slugs(), vec!["2"]);
    }

    #[tokio::test]
    async fn clean_pass_publishes_only_changed_descriptions() {
        let published = Collected::default();
        let count = clean_pass(&catalog(), &published, &opts()).await.unwrap();
        assert_eq!(count, 1);
        let posts = published.0.lock().unwrap();
        assert_eq!(posts[0].slug, "3");
        assert_eq!(posts[0].html, "<p>Pahar</p>");
    }
}
