//! ComicInfo.xml and ComicBookInfo records for one archive

use super::models::MangaInfo;
use crate::error::Result;
use crate::jobs::CbzRequest;
use crate::pipeline::ComicMetadata;
use chrono::NaiveDate;
use serde_json::json;

/// Human-readable volume label: `Vol3 `, `Vol3 Part1 ` or `No Volume(2025-01-31) `
pub fn volume_label(volume_name: &str, part: u32, today: NaiveDate) -> String {
    let part_label = if part > 0 {
        format!("Part{} ", part)
    } else {
        String::new()
    };
    if volume_name.trim().parse::<f64>().is_ok() {
        format!("Vol{} {}", volume_name, part_label)
    } else {
        format!("No Volume({}) {}", today, part_label)
    }
}

/// Archive title: `{series} {volume label}{LANG}`
pub fn archive_title(
    info: &MangaInfo,
    volume_name: &str,
    language: &str,
    part: u32,
    today: NaiveDate,
) -> String {
    format!(
        "{} {}{}",
        info.title,
        volume_label(volume_name, part, today),
        language.to_uppercase()
    )
}

/// The `ComicInfo.xml` descriptor
pub fn comic_info_xml(
    info: &MangaInfo,
    volume_name: &str,
    language: &str,
    part: u32,
    today: NaiveDate,
) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<ComicInfo>\n");
    let mut element = |name: &str, value: &str| {
        xml.push_str(&format!("    <{0}>{1}</{0}>\n", name, escape_xml(value)));
    };

    element("Title", &archive_title(info, volume_name, language, part, today));
    element("Series", &info.title);
    element("Volume", volume_name);
    element("Summary", &info.description);
    element("Writer", &info.authors.join(" & "));
    if let Some(year) = info.year {
        element("Year", &year.to_string());
    }
    element("Genre", &info.tags.join(" & "));
    element("Language", language);

    xml.push_str("</ComicInfo>");
    xml
}

/// The ComicBookInfo/1.0 document stored as the archive comment
pub fn comic_book_info(
    info: &MangaInfo,
    volume_name: &str,
    language: &str,
    part: u32,
    today: NaiveDate,
) -> serde_json::Value {
    let credits: Vec<_> = info
        .authors
        .iter()
        .map(|a| json!({ "person": a, "role": "Writer" }))
        .collect();

    json!({
        "ComicBookInfo/1.0": {
            "title": archive_title(info, volume_name, language, part, today),
            "series": info.title,
            "publicationYear": info.year,
            "language": language,
            "lang": language,
            "tags": info.tags,
            "comments": info.description,
            "volume": volume_name,
            "credits": credits,
        }
    })
}

/// Both metadata records for `request`
pub fn comic_metadata(
    info: &MangaInfo,
    request: &CbzRequest,
    today: NaiveDate,
) -> Result<ComicMetadata> {
    let (volume, language, part) = (&request.volume_name, &request.language, request.part);
    Ok(ComicMetadata {
        descriptor: comic_info_xml(info, volume, language, part, today),
        comment: serde_json::to_string(&comic_book_info(info, volume, language, part, today))?,
    })
}

fn escape_xml(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}
