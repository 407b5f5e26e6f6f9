use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

const DEFAULT_CONFIG: &str = "seo_refresh";
const ENV_PREFIX: &str = "SEO";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub state: StateSettings,
    pub catalog: CatalogSettings,
    pub generator: GeneratorSettings,
    pub publish: PublishSettings,
    pub content: ContentSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StateSettings {
    /// Local JSON snapshot, used when the sheet is unset or unreachable.
    pub file: PathBuf,
    pub sheet_id: Option<String>,
    pub access_token: Option<String>,
    pub api_base: String,
}

impl Default for StateSettings {
    fn default() -> Self {
        StateSettings {
            file: PathBuf::from("data/state.json"),
            sheet_id: None,
            access_token: None,
            api_base: "https://sheets.googleapis.com/v4".to_string(),
        }
    }
}

impl StateSettings {
    /// Both a spreadsheet id and a token are required to use the remote backend.
    pub fn remote_configured(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        present(&self.sheet_id) && present(&self.access_token)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CatalogSettings {
    /// URL or local path of the XML product feed.
    pub feed: String,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        CatalogSettings {
            feed: "data/feed.xml".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneratorSettings {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        GeneratorSettings {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.4,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PublishSettings {
    pub out_dir: PathBuf,
    pub draft: bool,
    pub tags: Vec<String>,
}

impl Default for PublishSettings {
    fn default() -> Self {
        PublishSettings {
            out_dir: PathBuf::from("data/posts"),
            draft: true,
            tags: vec!["seo".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContentSettings {
    /// Size of the "Produse similare" block.
    pub max_similar: usize,
    /// Link labels longer than this are cut.
    pub label_max: usize,
}

impl Default for ContentSettings {
    fn default() -> Self {
        ContentSettings {
            max_similar: 6,
            label_max: 70,
        }
    }
}

impl Settings {
    /// Layer `seo_refresh.toml` (or `path`) under `SEO_*` environment variables.
    ///
    /// Nested keys use a double underscore: `SEO_STATE__SHEET_ID`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, environment())
    }

    fn load_with(path: Option<&Path>, env: config::Environment) -> Result<Self> {
        let file = match path {
            Some(p) => config::File::from(p).required(true),
            None => config::File::with_name(DEFAULT_CONFIG).required(false),
        };
        config::Config::builder()
            .add_source(file)
            .add_source(env)
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }
}

/// `SEO_` then section and key joined by `__`.
fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("publish.tags")
}
