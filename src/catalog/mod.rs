//! MangaDex catalog
//!
//! Resolves archive requests into page manifests and metadata, and serves the
//! search results and manga page of the control plane. Every request goes
//! through the shared [`BoundedFetcher`].
//!
//! Endpoints used:
//! - `GET /manga/{id}` - series metadata with authors, artists and cover
//! - `GET /manga/{id}/aggregate` - volumes and chapters for one language
//! - `GET /at-home/server/{chapter}` - page image locations
//! - `GET /manga?title=...` - search

pub mod metadata;
pub mod models;

pub use models::{ChapterInfo, MangaInfo, SearchSummary, VolumeInfo};

use crate::config::{CatalogConfig, FetchConfig};
use crate::error::{Error, Result};
use crate::fetcher::BoundedFetcher;
use crate::jobs::CbzRequest;
use crate::pipeline::{AssetManifestEntry, ResolvedVolume, VolumeSource};
use async_trait::async_trait;
use futures::future::try_join_all;
use models::{AggregateResponse, AtHomeResponse, Envelope, MangaData};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;
use urlencoding::encode;

/// Search and page rendering for the control plane
#[async_trait]
pub trait CatalogFrontEnd: Send + Sync {
    /// Search the catalog by title
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchSummary>>;

    /// HTML page describing one manga, with its metadata embedded as JSON
    async fn manga_page(&self, manga_id: &str) -> Result<String>;
}

/// Catalog backed by the MangaDex API
#[derive(Clone)]
pub struct MangaDexCatalog {
    fetcher: BoundedFetcher,
    api_base_url: String,
    cover_base_url: String,
    settings: CatalogConfig,
}

impl MangaDexCatalog {
    /// Create a catalog client
    pub fn new(fetcher: BoundedFetcher, fetch: &FetchConfig, settings: CatalogConfig) -> Self {
        Self {
            fetcher,
            api_base_url: fetch.api_base_url.trim_end_matches('/').to_string(),
            cover_base_url: fetch.cover_base_url.trim_end_matches('/').to_string(),
            settings,
        }
    }

    /// Series metadata
    pub async fn manga_info(&self, manga_id: &str) -> Result<MangaInfo> {
        let url = format!(
            "{}/manga/{}?includes[]=artist&includes[]=author&includes[]=cover_art",
            self.api_base_url,
            encode(manga_id)
        );
        let envelope: Envelope<MangaData> = self.fetcher.get_json(&url).await?;
        Ok(envelope.data.into())
    }

    /// Volumes and chapters translated into `language`, in reading order
    pub async fn volumes(&self, manga_id: &str, language: &str) -> Result<Vec<VolumeInfo>> {
        let url = format!(
            "{}/manga/{}/aggregate?translatedLanguage[]={}",
            self.api_base_url,
            encode(manga_id),
            encode(language)
        );
        let response: AggregateResponse = self.fetcher.get_json(&url).await?;

        let mut volumes: Vec<VolumeInfo> = response
            .volumes
            .into_values()
            .into_iter()
            .map(VolumeInfo::from)
            .collect();
        models::sort_by_key_then_name(&mut volumes, |v| (v.sort, v.name.clone()));
        Ok(volumes)
    }

    /// Volumes for each language, skipping languages without any
    pub async fn volumes_by_language(
        &self,
        manga_id: &str,
        languages: &[String],
    ) -> Result<BTreeMap<String, Vec<VolumeInfo>>> {
        let lookups = languages.iter().map(|lang| self.volumes(manga_id, lang));
        let results = try_join_all(lookups).await?;

        Ok(languages
            .iter()
            .cloned()
            .zip(results)
            .filter(|(_, volumes)| !volumes.is_empty())
            .collect())
    }

    /// Page image URLs of one chapter
    pub async fn chapter_image_urls(&self, chapter_id: &str) -> Result<Vec<String>> {
        let url = format!(
            "{}/at-home/server/{}?forcePort443=false",
            self.api_base_url,
            encode(chapter_id)
        );
        let response: AtHomeResponse = self.fetcher.get_json(&url).await?;
        let base = response.base_url.trim_end_matches('/');

        Ok(response
            .chapter
            .data
            .iter()
            .map(|file| format!("{}/data/{}/{}", base, response.chapter.hash, file))
            .collect())
    }

    /// Page URLs of the first chapter variant that has any pages
    ///
    /// Variants are tried in order; an error on any variant ends the lookup.
    pub async fn image_urls_with_fallback(&self, variants: &[String]) -> Result<Vec<String>> {
        for chapter_id in variants {
            let urls = self.chapter_image_urls(chapter_id).await?;
            if !urls.is_empty() {
                return Ok(urls);
            }
            debug!(chapter_id = %chapter_id, "chapter variant has no pages, trying next");
        }
        Ok(Vec::new())
    }

    /// 256px cover URL, or empty when the manga has no cover
    pub fn cover_url(&self, manga_id: &str, cover_file: &str) -> String {
        if cover_file.is_empty() {
            return String::new();
        }
        format!("{}/{}/{}.256.jpg", self.cover_base_url, manga_id, cover_file)
    }
}

#[async_trait]
impl VolumeSource for MangaDexCatalog {
    async fn resolve(&self, request: &CbzRequest) -> Result<ResolvedVolume> {
        let (info, volumes) = futures::try_join!(
            self.manga_info(&request.manga_id),
            self.volumes(&request.manga_id, &request.language)
        )?;

        let volume = volumes
            .into_iter()
            .find(|v| v.name == request.volume_name)
            .ok_or_else(|| {
                Error::Resolution(format!(
                    "volume {} not found for manga {} ({})",
                    request.volume_name, request.manga_id, request.language
                ))
            })?;

        let chapters: Vec<&ChapterInfo> = volume
            .chapters
            .iter()
            .filter(|c| request.chapter_names.contains(&c.name))
            .collect();
        let pages = try_join_all(
            chapters
                .iter()
                .map(|c| self.image_urls_with_fallback(&c.chapter_id_variants)),
        )
        .await?;

        let mut entries = Vec::new();
        for (chapter, urls) in chapters.iter().zip(pages) {
            let dir = chapter_dir(&request.volume_name, chapter.sort);
            for url in urls {
                let ordering_key = entries.len();
                entries.push(AssetManifestEntry {
                    output_name: entry_name(&dir, ordering_key, &url),
                    source_locator: url,
                    ordering_key,
                });
            }
        }

        let today = chrono::Local::now().date_naive();
        Ok(ResolvedVolume {
            metadata: metadata::comic_metadata(&info, request, today)?,
            entries,
        })
    }
}

#[async_trait]
impl CatalogFrontEnd for MangaDexCatalog {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchSummary>> {
        let url = format!(
            "{}/manga?limit={}&offset=0&includes[]=cover_art&includes[]=artist&includes[]=author&order[rating]=desc&title={}",
            self.api_base_url,
            max_results,
            encode(query)
        );
        let envelope: Envelope<Vec<MangaData>> = self.fetcher.get_json(&url).await?;

        Ok(envelope
            .data
            .into_iter()
            .map(MangaInfo::from)
            .map(|info| SearchSummary {
                cover_url: self.cover_url(&info.id, &info.cover_file),
                title: info.title,
                manga_id: info.id,
                authors: info.authors,
            })
            .collect())
    }

    async fn manga_page(&self, manga_id: &str) -> Result<String> {
        let info = self.manga_info(manga_id).await?;
        let languages: Vec<String> = info
            .translated_languages
            .iter()
            .filter(|lang| self.settings.language_whitelist.contains(lang))
            .cloned()
            .collect();

        let volumes = self.volumes_by_language(manga_id, &languages).await?;

        let payload = PagePayload {
            cover_url: self.cover_url(&info.id, &info.cover_file),
            translated_languages: languages,
            volumes,
            max_volume_size: self.settings.max_volume_size,
            info,
        };
        render_page(&payload)
    }
}

#[derive(Serialize)]
struct PagePayload {
    #[serde(flatten)]
    info: MangaInfo,
    cover_url: String,
    translated_languages: Vec<String>,
    volumes: BTreeMap<String, Vec<VolumeInfo>>,
    max_volume_size: usize,
}

fn render_page(payload: &PagePayload) -> Result<String> {
    // "</" would end the script element early
    let json = serde_json::to_string(payload)?.replace("</", "<\\/");
    let title = payload
        .info
        .title
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");

    Ok(format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n</head>\n<body>\n<div id=\"app\"></div>\n<script type=\"application/json\" id=\"manga\">{}</script>\n</body>\n</html>\n",
        title, json
    ))
}

/// `{volume}/{chapter sort key, zero padded}/`
fn chapter_dir(volume_name: &str, chapter_sort: f64) -> String {
    format!("{}/{:09.2}/", volume_name, chapter_sort)
}

/// `{chapter dir}_{index + 1, 4 digits}_{file name}`
fn entry_name(chapter_dir: &str, index: usize, url: &str) -> String {
    let last_segment = url::Url::parse(url)
        .ok()
        .and_then(|u| u.path_segments().and_then(|s| s.last().map(str::to_string)))
        .unwrap_or_else(|| url.rsplit('/').next().unwrap_or_default().to_string());
    let basename = match urlencoding::decode(&last_segment) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => last_segment.clone(),
    };
    format!("{}_{:04}_{}", chapter_dir, index + 1, basename)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
