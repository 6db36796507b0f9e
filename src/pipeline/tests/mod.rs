use super::*;
use crate::error::Error;
use std::sync::Mutex;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct StaticSource {
    volume: Option<ResolvedVolume>,
}

#[async_trait]
impl VolumeSource for StaticSource {
    async fn resolve(&self, _request: &CbzRequest) -> Result<ResolvedVolume> {
        self.volume
            .clone()
            .ok_or_else(|| Error::Resolution("volume 9 not found".into()))
    }
}

#[derive(Default)]
struct RecordingProgress {
    reports: Mutex<Vec<(usize, usize)>>,
}

impl ProgressSink for RecordingProgress {
    fn report(&self, completed: usize, total: usize) {
        self.reports.lock().unwrap().push((completed, total));
    }
}

fn request() -> CbzRequest {
    CbzRequest {
        manga_id: "m-1".into(),
        language: "en".into(),
        volume_name: "1".into(),
        chapter_names: vec!["1".into(), "2".into()],
        prefix: "Series".into(),
        part: 0,
    }
}

fn manifest(server: &MockServer, pages: usize) -> ResolvedVolume {
    let entries = (0..pages)
        .map(|i| AssetManifestEntry {
            source_locator: format!("{}/data/h/p{}.png", server.uri(), i),
            output_name: format!("1/000001.00/_{:04}_p{}.png", i + 1, i),
            ordering_key: i,
        })
        .collect();
    ResolvedVolume {
        metadata: ComicMetadata {
            descriptor: "<ComicInfo><Title>Series</Title></ComicInfo>".into(),
            comment: r#"{"appID":"mangadex-cbz"}"#.into(),
        },
        entries,
    }
}

async fn mount_page(server: &MockServer, index: usize, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(format!("/data/h/p{}.png", index)))
        .respond_with(response)
        .mount(server)
        .await;
}

fn pipeline(volume: Option<ResolvedVolume>, store: ArtifactStore) -> ArchivePipeline {
    let fetcher =
        BoundedFetcher::with_client(reqwest::Client::new(), 6, Duration::from_secs(5));
    ArchivePipeline::new(
        fetcher,
        Arc::new(StaticSource { volume }),
        Arc::new(Passthrough),
        store,
    )
}

fn archive_names(path: &std::path::Path) -> Vec<String> {
    let mut archive = zip::ZipArchive::new(std::fs::File::open(path).unwrap()).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}

#[tokio::test]
async fn test_assembles_metadata_then_pages_and_renames() {
    let server = MockServer::start().await;
    for i in 0..3 {
        mount_page(
            &server,
            i,
            ResponseTemplate::new(200).set_body_bytes(vec![i as u8; 16]),
        )
        .await;
    }

    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path(), Duration::from_secs(3600));
    let key = request().job_key();
    let progress = RecordingProgress::default();

    let record = pipeline(Some(manifest(&server, 3)), store.clone())
        .assemble(&key, &request(), &progress)
        .await
        .unwrap();

    assert_eq!(record.file_path, store.artifact_path(&key, &request().display_name()));
    assert_eq!(record.display_name, "Series.1.0.en.m-1.cbz");
    assert!(!ArtifactStore::partial_path(&record.file_path).exists());

    let mut archive =
        zip::ZipArchive::new(std::fs::File::open(&record.file_path).unwrap()).unwrap();
    assert_eq!(archive.len(), 4);
    assert_eq!(archive.comment(), br#"{"appID":"mangadex-cbz"}"#);
    assert_eq!(archive.by_index(0).unwrap().name(), DESCRIPTOR_ENTRY);

    let reports = progress.reports.lock().unwrap().clone();
    assert_eq!(reports.first(), Some(&(0, 3)));
    assert_eq!(reports.last(), Some(&(3, 3)));
    assert!(reports.windows(2).all(|w| w[0].0 <= w[1].0));
}

#[tokio::test]
async fn test_entries_are_written_in_completion_order() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        0,
        ResponseTemplate::new(200)
            .set_body_bytes(b"slow".to_vec())
            .set_delay(Duration::from_millis(300)),
    )
    .await;
    mount_page(
        &server,
        1,
        ResponseTemplate::new(200).set_body_bytes(b"fast".to_vec()),
    )
    .await;

    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path(), Duration::from_secs(3600));
    let record = pipeline(Some(manifest(&server, 2)), store)
        .assemble(&request().job_key(), &request(), &RecordingProgress::default())
        .await
        .unwrap();

    let names = archive_names(&record.file_path);
    assert_eq!(
        names,
        vec![
            DESCRIPTOR_ENTRY.to_string(),
            "1/000001.00/_0002_p1.png".to_string(),
            "1/000001.00/_0001_p0.png".to_string(),
        ]
    );

    // Reading order is still recoverable from the names
    let mut pages: Vec<_> = names.into_iter().skip(1).collect();
    pages.sort();
    assert_eq!(pages[0], "1/000001.00/_0001_p0.png");
}

#[tokio::test]
async fn test_single_failed_page_fails_job_and_leaves_no_file() {
    let server = MockServer::start().await;
    for i in 0..5 {
        let response = if i == 3 {
            ResponseTemplate::new(500).set_body_string("upstream broke")
        } else {
            ResponseTemplate::new(200).set_body_bytes(vec![0u8; 8])
        };
        mount_page(&server, i, response).await;
    }

    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path(), Duration::from_secs(3600));
    let key = request().job_key();

    let err = pipeline(Some(manifest(&server, 5)), store.clone())
        .assemble(&key, &request(), &RecordingProgress::default())
        .await
        .unwrap_err();

    match err {
        Error::HttpStatus { status, .. } => assert_eq!(status, 500),
        other => panic!("expected HttpStatus, got {other:?}"),
    }

    let final_path = store.artifact_path(&key, &request().display_name());
    assert!(!final_path.exists());
    assert!(!ArtifactStore::partial_path(&final_path).exists());
    assert!(store.locate(&key).await.is_err());
}

#[tokio::test]
async fn test_failed_page_is_reported_as_attempted() {
    let server = MockServer::start().await;
    for i in 0..3 {
        let response = if i == 1 {
            ResponseTemplate::new(500).set_body_string("upstream broke")
        } else {
            ResponseTemplate::new(200)
                .set_body_bytes(vec![0u8; 8])
                .set_delay(Duration::from_millis(300))
        };
        mount_page(&server, i, response).await;
    }

    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path(), Duration::from_secs(3600));
    let progress = RecordingProgress::default();

    pipeline(Some(manifest(&server, 3)), store)
        .assemble(&request().job_key(), &request(), &progress)
        .await
        .unwrap_err();

    let reports = progress.reports.lock().unwrap().clone();
    assert_eq!(reports, vec![(0, 3), (1, 3)]);
}

#[tokio::test]
async fn test_resolution_failure_creates_no_archive() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path(), Duration::from_secs(3600));
    let progress = RecordingProgress::default();

    let err = pipeline(None, store)
        .assemble(&request().job_key(), &request(), &progress)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Resolution(_)));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    assert!(progress.reports.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_manifest_yields_metadata_only_archive() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path(), Duration::from_secs(3600));

    let record = pipeline(Some(manifest(&server, 0)), store)
        .assemble(&request().job_key(), &request(), &RecordingProgress::default())
        .await
        .unwrap();

    assert_eq!(archive_names(&record.file_path), vec![DESCRIPTOR_ENTRY]);
}
