//! Job identity: the archive request and its deterministic key

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

/// Separator between hashed fields (ASCII unit separator)
const FIELD_SEPARATOR: u8 = 0x1f;

/// Length of a hex-encoded SHA-256 digest
const KEY_LEN: usize = 64;

/// Everything that determines the content of one archive
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CbzRequest {
    /// MangaDex manga id
    pub manga_id: String,
    /// Translation language code (e.g. "en")
    pub language: String,
    /// Volume name as reported by the aggregate endpoint ("none" for no volume)
    pub volume_name: String,
    /// Chapter names to include, in any order
    pub chapter_names: Vec<String>,
    /// Naming prefix, usually the series title
    pub prefix: String,
    /// Sequence part when a volume is split over several archives
    pub part: u32,
}

impl CbzRequest {
    /// Deterministic key for this request
    ///
    /// Chapter names count as a set, so their order and any duplicates do
    /// not change the key.
    pub fn job_key(&self) -> JobKey {
        let part = self.part.to_string();
        let mut chapters: Vec<&str> = self.chapter_names.iter().map(String::as_str).collect();
        chapters.sort_unstable();
        chapters.dedup();
        let mut fields: Vec<&str> = vec![
            &self.prefix,
            &self.volume_name,
            &part,
            &self.language,
            &self.manga_id,
        ];
        fields.extend(chapters);
        JobKey::from_parts(&fields)
    }

    /// Archive file name without the task id prefix
    ///
    /// Path separators and control characters are replaced so the name is
    /// always a single path component.
    pub fn display_name(&self) -> String {
        let raw = format!(
            "{}.{}.{}.{}.{}.cbz",
            self.prefix, self.volume_name, self.part, self.language, self.manga_id
        );
        raw.chars()
            .map(|c| match c {
                '/' | '\\' => '_',
                c if c.is_control() => '_',
                c => c,
            })
            .collect()
    }
}

/// Hex SHA-256 digest identifying a job and prefixing its artifact file
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobKey(String);

impl JobKey {
    /// Digest the given fields, separated so that field boundaries matter
    pub fn from_parts(parts: &[&str]) -> Self {
        let mut hasher = Sha256::new();
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                hasher.update([FIELD_SEPARATOR]);
            }
            hasher.update(part.as_bytes());
        }
        let digest = hasher.finalize();
        Self(digest.iter().map(|b| format!("{:02x}", b)).collect())
    }

    /// Accept a caller-supplied task id if it has the shape of a key
    pub fn parse(raw: &str) -> Option<Self> {
        let well_formed = raw.len() == KEY_LEN
            && raw
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        well_formed.then(|| Self(raw.to_string()))
    }

    /// Hex representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for JobKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
