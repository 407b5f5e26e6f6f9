use anyhow::{Context, Result};
use async_trait::async_trait;
use quick_xml::events::Event;
use tracing::info;

/// A product as seen by the content pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogItem {
    pub id: String,
    pub title: String,
    pub url: Option<String>,
    pub description: Option<String>,
}

impl CatalogItem {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        CatalogItem {
            id: id.into(),
            title: title.into(),
            url: None,
            description: None,
        }
    }

    /// Link target used in rendered "related items" lists.
    pub fn link(&self) -> String {
        self.url
            .clone()
            .unwrap_or_else(|| format!("/products/{}", self.id))
    }

    /// File-system safe identifier for published output.
    pub fn slug(&self) -> String {
        self.id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
            .collect()
    }
}

#[async_trait]
pub trait Catalog: Send + Sync {
    async fn items(&self) -> Result<Vec<CatalogItem>>;
}

/// Product feed (RSS / Merchant-style XML) read from a URL or a local path.
pub struct FeedCatalog {
    source: String,
}

impl FeedCatalog {
    pub fn new(source: impl Into<String>) -> Self {
        FeedCatalog {
            source: source.into(),
        }
    }
}

#[async_trait]
impl Catalog for FeedCatalog {
    async fn items(&self) -> Result<Vec<CatalogItem>> {
        let xml = if self.source.starts_with("http://") || self.source.starts_with("https://") {
            info!("Fetching product feed: {}", self.source);
            reqwest::get(&self.source)
                .await?
                .error_for_status()?
                .text()
                .await
                .context("Failed to fetch product feed")?
        } else {
            tokio::fs::read_to_string(&self.source)
                .await
                .with_context(|| format!("Failed to read product feed {}", self.source))?
        };

        let items = parse_feed(&xml)?;
        info!("Catalog items in feed: {}", items.len());
        Ok(items)
    }
}

#[derive(Clone, Copy)]
enum Field {
    Id,
    Title,
    Link,
    Description,
}

#[derive(Default)]
struct Draft {
    id: String,
    title: String,
    link: String,
    description: String,
}

impl Draft {
    fn push(&mut self, field: Field, text: &str) {
        let target = match field {
            Field::Id => &mut self.id,
            Field::Title => &mut self.title,
            Field::Link => &mut self.link,
            Field::Description => &mut self.description,
        };
        target.push_str(text);
    }

    fn finish(self) -> Option<CatalogItem> {
        let id = self.id.trim();
        let title = self.title.trim();
        if id.is_empty() || title.is_empty() {
            return None;
        }
        let non_empty = |s: &str| {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        };
        let mut item = CatalogItem::new(id, title);
        item.url = non_empty(&self.link);
        item.description = non_empty(&self.description);
        Some(item)
    }
}

/// Parse `<item>` (or Atom `<entry>`) elements into catalog items.
/// Items missing an id or a title are skipped.
pub fn parse_feed(xml: &str) -> Result<Vec<CatalogItem>> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut items = Vec::new();
    let mut draft: Option<Draft> = None;
    let mut field: Option<Field> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"item" | b"entry" => draft = Some(Draft::default()),
                b"id" if draft.is_some() => field = Some(Field::Id),
                b"title" if draft.is_some() => field = Some(Field::Title),
                b"link" if draft.is_some() => field = Some(Field::Link),
                b"description" if draft.is_some() => field = Some(Field::Description),
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if let (Some(d), Some(f)) = (draft.as_mut(), field) {
                    // HTML-only entities (&nbsp;) are not valid XML escapes; keep them raw.
                    let text = e
                        .unescape()
                        .map(|t| t.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(&e).into_owned());
                    d.push(f, &text);
                }
            }
            Ok(Event::CData(e)) => {
                if let (Some(d), Some(f)) = (draft.as_mut(), field) {
                    d.push(f, &String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"item" | b"entry" => {
                    field = None;
                    if let Some(item) = draft.take().and_then(Draft::finish) {
                        items.push(item);
                    }
                }
                b"id" | b"title" | b"link" | b"description" => field = None,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {}
        }
        buf.clear();
    }
    Ok(items)
}
