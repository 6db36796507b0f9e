use super::*;
use serde_json::{Value, json};
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn catalog(server: &MockServer) -> MangaDexCatalog {
    let fetch = FetchConfig {
        api_base_url: server.uri(),
        cover_base_url: format!("{}/covers", server.uri()),
        ..FetchConfig::default()
    };
    let fetcher = BoundedFetcher::with_client(reqwest::Client::new(), 6, Duration::from_secs(5));
    MangaDexCatalog::new(fetcher, &fetch, CatalogConfig::default())
}

fn manga_json(id: &str) -> Value {
    json!({
        "id": id,
        "attributes": {
            "title": { "ja-ro": "Shingeki no Kyojin" },
            "altTitles": [
                { "ja": "進撃の巨人" },
                { "en": "Attack on Titan" }
            ],
            "description": { "en": "Walls </script> and titans", "fr": "Murs" },
            "year": 2009,
            "contentRating": "suggestive",
            "availableTranslatedLanguages": ["en", "fr", null, "es-la"],
            "tags": [
                { "attributes": { "name": { "en": "Action" } } },
                { "attributes": { "name": { "ja": "only japanese" } } },
                { "attributes": { "name": { "en": "Drama" } } }
            ]
        },
        "relationships": [
            { "type": "author", "attributes": { "name": "Isayama Hajime" } },
            { "type": "artist", "attributes": { "name": "Isayama Hajime" } },
            { "type": "artist", "attributes": { "name": "Second Artist" } },
            { "type": "cover_art", "attributes": { "fileName": "cover.jpg" } },
            { "type": "creator" }
        ]
    })
}

fn aggregate_json() -> Value {
    json!({
        "result": "ok",
        "volumes": {
            "none": {
                "volume": "none",
                "chapters": {
                    "Extra": { "chapter": "Extra", "id": "c-extra", "others": [] }
                }
            },
            "10": {
                "volume": "10",
                "chapters": {
                    "40": { "chapter": "40", "id": "c40", "others": [] }
                }
            },
            "2": {
                "volume": "2",
                "chapters": {
                    "10": { "chapter": "10", "id": "c10", "others": [] },
                    "9.5": { "chapter": "9.5", "id": "c9.5", "others": [] },
                    "9": { "chapter": "9", "id": "c9-empty", "others": ["c9-dup"] }
                }
            }
        }
    })
}

fn at_home_json(server: &MockServer, hash: &str, files: &[&str]) -> Value {
    json!({
        "result": "ok",
        "baseUrl": server.uri(),
        "chapter": { "hash": hash, "data": files }
    })
}

async fn mount_json(server: &MockServer, route: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn mount_fixture(server: &MockServer) {
    mount_json(server, "/manga/m1", json!({ "result": "ok", "data": manga_json("m1") })).await;
    mount_json(server, "/manga/m1/aggregate", aggregate_json()).await;
    mount_json(server, "/at-home/server/c9-empty", at_home_json(server, "h9", &[])).await;
    mount_json(
        server,
        "/at-home/server/c9-dup",
        at_home_json(server, "h9", &["a.png", "b.png"]),
    )
    .await;
    mount_json(
        server,
        "/at-home/server/c10",
        at_home_json(server, "h10", &["x%20y.jpg"]),
    )
    .await;
}

fn request(volume: &str, chapters: &[&str]) -> CbzRequest {
    CbzRequest {
        manga_id: "m1".into(),
        language: "en".into(),
        volume_name: volume.into(),
        chapter_names: chapters.iter().map(|c| c.to_string()).collect(),
        prefix: "AoT".into(),
        part: 0,
    }
}

#[tokio::test]
async fn test_manga_info_extracts_series_metadata() {
    let server = MockServer::start().await;
    mount_fixture(&server).await;

    let info = catalog(&server).manga_info("m1").await.unwrap();

    assert_eq!(info.id, "m1");
    assert_eq!(info.title, "Shingeki no Kyojin | Attack on Titan");
    assert_eq!(info.authors, vec!["Isayama Hajime", "Second Artist"]);
    assert_eq!(info.tags, vec!["Manga", "Action", "Drama"]);
    assert_eq!(info.cover_file, "cover.jpg");
    assert_eq!(info.description, "Walls </script> and titans");
    assert_eq!(info.year, Some(2009));
    assert_eq!(info.content_rating.as_deref(), Some("suggestive"));
    assert_eq!(info.translated_languages, vec!["en", "fr", "es-la"]);
}

#[tokio::test]
async fn test_manga_info_tolerates_sparse_payload() {
    let server = MockServer::start().await;
    mount_json(
        &server,
        "/manga/bare",
        json!({
            "data": {
                "id": "bare",
                "attributes": {
                    "title": { "en": "Bare" },
                    "altTitles": [{ "en": "Bare" }],
                    "description": [],
                    "year": null
                },
                "relationships": []
            }
        }),
    )
    .await;

    let info = catalog(&server).manga_info("bare").await.unwrap();
    assert_eq!(info.title, "Bare");
    assert!(info.authors.is_empty());
    assert_eq!(info.tags, vec!["Manga"]);
    assert_eq!(info.cover_file, "");
    assert_eq!(info.description, "");
    assert_eq!(info.year, None);
    assert!(info.translated_languages.is_empty());
}

#[tokio::test]
async fn test_volumes_sorted_numerically_with_named_volumes_last() {
    let server = MockServer::start().await;
    mount_fixture(&server).await;

    let volumes = catalog(&server).volumes("m1", "en").await.unwrap();
    let names: Vec<_> = volumes.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, vec!["2", "10", "none"]);

    let chapters: Vec<_> = volumes[0].chapters.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(chapters, vec!["9", "9.5", "10"]);
    assert_eq!(
        volumes[0].chapters[0].chapter_id_variants,
        vec!["c9-empty", "c9-dup"]
    );
    assert_eq!(volumes[2].sort, models::NON_NUMERIC_SORT);
}

#[tokio::test]
async fn test_empty_volume_list_means_no_volumes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/manga/m2/aggregate"))
        .and(query_param("translatedLanguage[]", "ro"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": "ok",
            "volumes": []
        })))
        .mount(&server)
        .await;

    let volumes = catalog(&server).volumes("m2", "ro").await.unwrap();
    assert!(volumes.is_empty());
}

#[tokio::test]
async fn test_chapter_image_urls_join_base_hash_and_file() {
    let server = MockServer::start().await;
    mount_fixture(&server).await;

    let urls = catalog(&server).chapter_image_urls("c9-dup").await.unwrap();
    assert_eq!(
        urls,
        vec![
            format!("{}/data/h9/a.png", server.uri()),
            format!("{}/data/h9/b.png", server.uri()),
        ]
    );
}

#[tokio::test]
async fn test_fallback_takes_first_variant_with_pages() {
    let server = MockServer::start().await;
    mount_fixture(&server).await;

    let urls = catalog(&server)
        .image_urls_with_fallback(&["c9-empty".into(), "c9-dup".into()])
        .await
        .unwrap();
    assert_eq!(urls.len(), 2);
    assert!(urls[0].ends_with("/data/h9/a.png"));
}

#[tokio::test]
async fn test_fallback_error_on_a_variant_propagates() {
    let server = MockServer::start().await;
    mount_fixture(&server).await;

    let err = catalog(&server)
        .image_urls_with_fallback(&["missing".into(), "c9-dup".into()])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::HttpStatus { status: 404, .. }), "{err:?}");
}

#[tokio::test]
async fn test_resolve_builds_numbered_manifest_in_reading_order() {
    let server = MockServer::start().await;
    mount_fixture(&server).await;

    // Requested out of order; the volume's order wins
    let resolved = catalog(&server)
        .resolve(&request("2", &["10", "9"]))
        .await
        .unwrap();

    let names: Vec<_> = resolved
        .entries
        .iter()
        .map(|e| e.output_name.as_str())
        .collect();
    assert_eq!(
        names,
        vec![
            "2/000009.00/_0001_a.png",
            "2/000009.00/_0002_b.png",
            "2/000010.00/_0003_x y.jpg",
        ]
    );
    assert_eq!(
        resolved.entries.iter().map(|e| e.ordering_key).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
    assert_eq!(
        resolved.entries[2].source_locator,
        format!("{}/data/h10/x%20y.jpg", server.uri())
    );

    assert!(
        resolved
            .metadata
            .descriptor
            .contains("<Title>Shingeki no Kyojin | Attack on Titan Vol2 EN</Title>")
    );
    let comment: Value = serde_json::from_str(&resolved.metadata.comment).unwrap();
    assert_eq!(comment["ComicBookInfo/1.0"]["volume"], "2");
}

#[tokio::test]
async fn test_resolve_unknown_volume_is_resolution_error() {
    let server = MockServer::start().await;
    mount_fixture(&server).await;

    let err = catalog(&server)
        .resolve(&request("99", &["1"]))
        .await
        .unwrap_err();
    match err {
        Error::Resolution(message) => assert!(message.contains("volume 99")),
        other => panic!("expected Resolution, got {other:?}"),
    }
}

#[tokio::test]
async fn test_search_returns_summaries_with_cover_urls() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/manga"))
        .and(query_param("title", "attack titan"))
        .and(query_param("limit", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": "ok",
            "data": [manga_json("m1"), manga_json("m2")]
        })))
        .mount(&server)
        .await;

    let results = catalog(&server).search("attack titan", 5).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[1].manga_id, "m2");
    assert_eq!(results[0].title, "Shingeki no Kyojin | Attack on Titan");
    assert_eq!(
        results[0].cover_url,
        format!("{}/covers/m1/cover.jpg.256.jpg", server.uri())
    );
}

#[tokio::test]
async fn test_manga_page_embeds_whitelisted_payload() {
    let server = MockServer::start().await;
    mount_fixture(&server).await;
    // es-la is whitelisted but has nothing translated
    Mock::given(method("GET"))
        .and(path("/manga/m1/aggregate"))
        .and(query_param("translatedLanguage[]", "es-la"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "volumes": [] })))
        .with_priority(1)
        .mount(&server)
        .await;

    let html = catalog(&server).manga_page("m1").await.unwrap();
    assert!(!html.contains("</script> and"), "payload must not close the script");

    let start = html.find(r#"<script type="application/json" id="manga">"#).unwrap();
    let body = &html[start..];
    let json_start = body.find('>').unwrap() + 1;
    let json_end = body.find("</script>").unwrap();
    let payload: Value = serde_json::from_str(&body[json_start..json_end]).unwrap();

    assert_eq!(payload["id"], "m1");
    assert_eq!(payload["translated_languages"], json!(["en", "es-la"]));
    assert_eq!(payload["max_volume_size"], 20);
    assert_eq!(payload["description"], "Walls </script> and titans");
    assert!(payload["volumes"].get("es-la").is_none());
    assert_eq!(payload["volumes"]["en"][0]["type"], "VolumeInfo");
    assert_eq!(payload["volumes"]["en"][0]["chapters"][0]["type"], "ChapterInfo");
    assert!(payload["cover_url"].as_str().unwrap().ends_with("/covers/m1/cover.jpg.256.jpg"));
}

#[test]
fn test_entry_name_decodes_file_name() {
    assert_eq!(
        entry_name("1/000003.50/", 41, "https://h.example/data/abc/P%C3%A1gina%201.png"),
        "1/000003.50/_0042_Página 1.png"
    );
    assert_eq!(chapter_dir("none", models::NON_NUMERIC_SORT), "none/1000000.00/");
}
