//! Static build collaborator: resolves a route to its prebuilt artifact

use crate::error::BuildError;
use async_trait::async_trait;
use regex::Regex;
use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

/// Produces the optimized content for a route
#[async_trait]
pub trait PageBuilder: Send + Sync {
    async fn build(&self, route: &str) -> Result<Vec<u8>, BuildError>;
}

/// Reads prebuilt artifacts from a content root.
///
/// `/` resolves to `index.html`; `/docs` resolves to `docs/index.html`, then
/// `docs.html`; a route naming a file with an extension resolves to that file.
pub struct DirectoryPageBuilder {
    root: PathBuf,
}

impl DirectoryPageBuilder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn candidates(&self, route: &str) -> Vec<PathBuf> {
        let relative = route.trim_matches('/');
        if relative.is_empty() {
            return vec![self.root.join("index.html")];
        }

        let base = self.root.join(relative);
        if Path::new(relative).extension().is_some() {
            return vec![base];
        }
        vec![base.join("index.html"), self.root.join(format!("{}.html", relative))]
    }
}

#[async_trait]
impl PageBuilder for DirectoryPageBuilder {
    async fn build(&self, route: &str) -> Result<Vec<u8>, BuildError> {
        if route.split('/').any(|segment| segment == "..") {
            return Err(BuildError::NotFound(route.to_string()));
        }

        for path in self.candidates(route) {
            match tokio::fs::read(&path).await {
                Ok(content) => {
                    debug!(route = %route, path = %path.display(), "Resolved build artifact");
                    return Ok(content);
                }
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(BuildError::Io(e)),
            }
        }
        Err(BuildError::NotFound(route.to_string()))
    }
}

static ASSET_ATTRIBUTE: OnceLock<Regex> = OnceLock::new();

fn asset_attribute() -> &'static Regex {
    ASSET_ATTRIBUTE.get_or_init(|| {
        Regex::new(r#"(?i)(?:^|\s)(?:src|href)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
            .expect("asset attribute pattern is valid")
    })
}

/// Local asset paths referenced through quoted `src`/`href` attributes.
/// External URLs, fragments and inline data are skipped.
pub fn extract_dependencies(content: &[u8]) -> BTreeSet<String> {
    let text = String::from_utf8_lossy(content);
    asset_attribute()
        .captures_iter(&text)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|value| value.as_str().trim())
        .filter(|reference| is_local_asset(reference))
        .map(str::to_string)
        .collect()
}

fn is_local_asset(reference: &str) -> bool {
    const SKIPPED_PREFIXES: &[&str] = &["http:", "https:", "//", "#", "mailto:", "tel:", "data:", "javascript:"];
    let lower = reference.to_ascii_lowercase();
    !lower.is_empty() && !SKIPPED_PREFIXES.iter().any(|p| lower.starts_with(p))
}
