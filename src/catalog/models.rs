//! MangaDex payloads and the catalog types built from them

use serde::de::{self, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use utoipa::ToSchema;

/// Sort key for names that are not numbers; they sort after every numbered one
pub const NON_NUMERIC_SORT: f64 = 1e6;

/// Numeric sort key of a volume or chapter name
pub fn sort_key(name: &str) -> f64 {
    name.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(NON_NUMERIC_SORT)
}

/// `{"en": "...", "ja": "..."}` in document order
///
/// MangaDex sends `[]` instead of `{}` for an empty map, and the first entry
/// of a title map is the primary title, so order is kept.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct LocalizedText(pub Vec<(String, String)>);

impl LocalizedText {
    pub fn first(&self) -> Option<&str> {
        self.0.first().map(|(_, v)| v.as_str())
    }

    pub fn get(&self, lang: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == lang)
            .map(|(_, v)| v.as_str())
    }
}

impl<'de> Deserialize<'de> for LocalizedText {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LocalizedVisitor;

        impl<'de> Visitor<'de> for LocalizedVisitor {
            type Value = LocalizedText;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of language codes to strings")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::new();
                while let Some((lang, text)) = map.next_entry::<String, Option<String>>()? {
                    if let Some(text) = text {
                        entries.push((lang, text));
                    }
                }
                Ok(LocalizedText(entries))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                while seq.next_element::<IgnoredAny>()?.is_some() {}
                Ok(LocalizedText::default())
            }

            fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(LocalizedText::default())
            }
        }

        deserializer.deserialize_any(LocalizedVisitor)
    }
}

/// `{"result": "ok", "data": ...}`
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub data: T,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MangaData {
    pub id: String,
    #[serde(default)]
    pub attributes: MangaAttributes,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MangaAttributes {
    #[serde(default)]
    pub title: LocalizedText,
    #[serde(default)]
    pub alt_titles: Vec<LocalizedText>,
    #[serde(default)]
    pub description: LocalizedText,
    #[serde(default)]
    pub year: Option<serde_json::Value>,
    #[serde(default)]
    pub content_rating: Option<String>,
    #[serde(default)]
    pub available_translated_languages: Option<Vec<Option<String>>>,
    #[serde(default)]
    pub tags: Vec<TagData>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TagData {
    #[serde(default)]
    pub attributes: TagAttributes,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct TagAttributes {
    #[serde(default)]
    pub name: LocalizedText,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Relationship {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: Option<RelationshipAttributes>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RelationshipAttributes {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
}

/// Object keyed by name, or (when empty) a bare `[]`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum MapOrList<T> {
    Map(HashMap<String, T>),
    List(Vec<T>),
}

impl<T> Default for MapOrList<T> {
    fn default() -> Self {
        MapOrList::List(Vec::new())
    }
}

impl<T> MapOrList<T> {
    pub fn into_values(self) -> Vec<T> {
        match self {
            MapOrList::Map(map) => map.into_values().collect(),
            MapOrList::List(list) => list,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct AggregateResponse {
    #[serde(default)]
    pub volumes: MapOrList<AggregateVolume>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AggregateVolume {
    pub volume: String,
    #[serde(default)]
    pub chapters: MapOrList<AggregateChapter>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AggregateChapter {
    pub chapter: String,
    pub id: String,
    #[serde(default)]
    pub others: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AtHomeResponse {
    pub base_url: String,
    pub chapter: AtHomeChapter,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AtHomeChapter {
    pub hash: String,
    #[serde(default)]
    pub data: Vec<String>,
}

/// Series metadata used for archive records, search results and the manga page
#[derive(Clone, Debug, Default, PartialEq, Serialize, ToSchema)]
pub struct MangaInfo {
    /// MangaDex manga id
    pub id: String,
    /// Primary title, with the English alternative appended when different
    pub title: String,
    /// Author and artist names, deduplicated
    pub authors: Vec<String>,
    /// `"Manga"` followed by the English tag names
    pub tags: Vec<String>,
    /// Cover art file name (empty when the manga has no cover)
    pub cover_file: String,
    /// English description
    pub description: String,
    /// Publication year
    pub year: Option<i32>,
    /// MangaDex content rating
    pub content_rating: Option<String>,
    /// Languages with at least one translated chapter
    pub translated_languages: Vec<String>,
}

impl From<MangaData> for MangaInfo {
    fn from(data: MangaData) -> Self {
        let attributes = data.attributes;

        let primary = attributes.title.first().unwrap_or_default().to_string();
        let english_alt = attributes
            .alt_titles
            .iter()
            .find_map(|t| t.get("en"))
            .unwrap_or(primary.as_str());
        let title = if english_alt != primary {
            format!("{} | {}", primary, english_alt)
        } else {
            primary.clone()
        };

        let mut authors: Vec<String> = Vec::new();
        for relationship in &data.relationships {
            if relationship.kind != "author" && relationship.kind != "artist" {
                continue;
            }
            let name = relationship.attributes.as_ref().and_then(|a| a.name.as_ref());
            if let Some(name) = name {
                if !authors.contains(name) {
                    authors.push(name.clone());
                }
            }
        }

        let tags = std::iter::once("Manga".to_string())
            .chain(
                attributes
                    .tags
                    .iter()
                    .filter_map(|t| t.attributes.name.get("en"))
                    .filter(|name| !name.is_empty())
                    .map(str::to_string),
            )
            .collect();

        let cover_file = data
            .relationships
            .iter()
            .filter(|r| r.kind == "cover_art")
            .find_map(|r| r.attributes.as_ref().and_then(|a| a.file_name.clone()))
            .unwrap_or_default();

        let year = attributes.year.as_ref().and_then(|value| match value {
            serde_json::Value::Number(n) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        });

        Self {
            id: data.id,
            title,
            authors,
            tags,
            cover_file,
            description: attributes.description.get("en").unwrap_or_default().to_string(),
            year,
            content_rating: attributes.content_rating,
            translated_languages: attributes
                .available_translated_languages
                .unwrap_or_default()
                .into_iter()
                .flatten()
                .collect(),
        }
    }
}

/// One chapter of a volume, with its alternate translation ids
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename = "ChapterInfo")]
pub struct ChapterInfo {
    /// Chapter name ("1", "1.5", "Oneshot", ...)
    pub name: String,
    /// Chapter ids to try in order; duplicate translations follow the first
    pub chapter_id_variants: Vec<String>,
    /// Numeric sort key
    #[serde(skip)]
    pub sort: f64,
}

impl From<AggregateChapter> for ChapterInfo {
    fn from(chapter: AggregateChapter) -> Self {
        let mut variants = vec![chapter.id];
        variants.extend(chapter.others);
        Self {
            sort: sort_key(&chapter.chapter),
            name: chapter.chapter,
            chapter_id_variants: variants,
        }
    }
}

/// One volume with its chapters in reading order
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename = "VolumeInfo")]
pub struct VolumeInfo {
    /// Volume name ("1", "none", ...)
    pub name: String,
    /// Chapters sorted by numeric name
    pub chapters: Vec<ChapterInfo>,
    /// Numeric sort key
    #[serde(skip)]
    pub sort: f64,
}

impl From<AggregateVolume> for VolumeInfo {
    fn from(volume: AggregateVolume) -> Self {
        let mut chapters: Vec<ChapterInfo> = volume
            .chapters
            .into_values()
            .into_iter()
            .map(ChapterInfo::from)
            .collect();
        sort_by_key_then_name(&mut chapters, |c| (c.sort, c.name.clone()));
        Self {
            sort: sort_key(&volume.volume),
            name: volume.volume,
            chapters,
        }
    }
}

/// Sort numerically, breaking ties by name so map order never leaks through
pub(crate) fn sort_by_key_then_name<T>(items: &mut [T], key: impl Fn(&T) -> (f64, String)) {
    items.sort_by(|a, b| {
        let (ka, na) = key(a);
        let (kb, nb) = key(b);
        ka.total_cmp(&kb).then_with(|| na.cmp(&nb))
    });
}

/// One search hit
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SearchSummary {
    /// Display title
    pub title: String,
    /// MangaDex manga id
    pub manga_id: String,
    /// Author and artist names
    pub authors: Vec<String>,
    /// 256px cover image URL (empty when the manga has no cover)
    pub cover_url: String,
}
