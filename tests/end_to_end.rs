use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use column_splitter::commands::{release_split, split_status, submit_split, SplitRequest, SplitStatusResponse};
use column_splitter::jobs::JobId;
use column_splitter::streaming::workbook::{read_workbook, write_workbook, SheetData};
use column_splitter::streaming::CellValue;
use column_splitter::{AppState, ErrorKind, SplitterConfig};
use tempfile::TempDir;
use zip::ZipArchive;

fn state(dir: &TempDir) -> AppState {
    AppState::new(SplitterConfig {
        upload_dir: dir.path().join("uploads"),
        output_dir: dir.path().join("output"),
        archive_dir: dir.path().join("archives"),
        csv_chunk_rows: 2,
        ..SplitterConfig::default()
    })
    .unwrap()
}

async fn finish(state: &AppState, job_id: &JobId) -> SplitStatusResponse {
    state
        .jobs
        .wait_for_terminal(job_id, Duration::from_secs(30))
        .await
        .unwrap();
    split_status(state, job_id.as_str()).await.unwrap()
}

fn zip_entry(archive: &Path, name: &str) -> Vec<u8> {
    let mut zip = ZipArchive::new(File::open(archive).unwrap()).unwrap();
    let mut entry = zip.by_name(name).unwrap();
    let mut bytes = Vec::new();
    entry.read_to_end(&mut bytes).unwrap();
    bytes
}

#[tokio::test]
async fn csv_upload_is_split_and_archived() {
    let dir = TempDir::new().unwrap();
    let state = state(&dir);

    let started = submit_split(
        &state,
        SplitRequest {
            file_name: "sales.csv".into(),
            column_name: "region".into(),
            payload: b"region,amt\nUS,1\nEU,2\nUS,3\n".to_vec(),
        },
    )
    .await
    .unwrap();

    let (archive_path, files) = match finish(&state, &started.job_id).await {
        SplitStatusResponse::Ready {
            archive_path,
            download_name,
            files,
        } => {
            assert_eq!(download_name, "split_files.zip");
            (archive_path, files)
        }
        other => panic!("Expected Ready, got {other:?}"),
    };

    assert_eq!(files, vec!["EU.csv", "US.csv"]);
    let zip = ZipArchive::new(File::open(&archive_path).unwrap()).unwrap();
    let mut names: Vec<String> = zip.file_names().map(String::from).collect();
    names.sort();
    assert_eq!(names, vec!["EU.csv", "US.csv"]);

    assert_eq!(
        String::from_utf8(zip_entry(&archive_path, "US.csv")).unwrap(),
        "region,amt\nUS,1\nUS,3\n"
    );
    assert_eq!(
        String::from_utf8(zip_entry(&archive_path, "EU.csv")).unwrap(),
        "region,amt\nEU,2\n"
    );

    release_split(&state, started.job_id.as_str()).await.unwrap();
    assert!(!archive_path.exists());
    state.shutdown().await;
}

#[tokio::test]
async fn workbook_upload_keeps_one_sheet_per_source_sheet() {
    let dir = TempDir::new().unwrap();
    let state = state(&dir);

    let source = dir.path().join("book.xlsx");
    let text = |s: &str| CellValue::Text(s.to_string());
    write_workbook(
        &source,
        &[
            SheetData::new(
                "Jan",
                vec![
                    vec![text("Region"), text("Amt")],
                    vec![text("East"), CellValue::Number(10.0)],
                    vec![text("West"), CellValue::Number(20.0)],
                ],
            ),
            SheetData::new(
                "Feb",
                vec![
                    vec![text("Region"), text("Amt")],
                    vec![text("East"), CellValue::Number(30.0)],
                ],
            ),
            SheetData::new("Notes", vec![vec![text("Comment")], vec![text("ignore me")]]),
        ],
    )
    .unwrap();

    let started = submit_split(
        &state,
        SplitRequest {
            file_name: "book.xlsx".into(),
            column_name: "Region".into(),
            payload: std::fs::read(&source).unwrap(),
        },
    )
    .await
    .unwrap();

    let files = match finish(&state, &started.job_id).await {
        SplitStatusResponse::Ready { files, .. } => files,
        other => panic!("Expected Ready, got {other:?}"),
    };
    assert_eq!(files, vec!["East.xlsx", "West.xlsx"]);

    let east = dir
        .path()
        .join("output")
        .join(started.job_id.as_str())
        .join("East.xlsx");
    let sheets = read_workbook(&east).unwrap();
    let names: Vec<&str> = sheets.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["Jan", "Feb"]);
    assert_eq!(sheets[1].rows[1][1], CellValue::Number(30.0));

    state.shutdown().await;
}

#[tokio::test]
async fn missing_column_reports_schema_failure() {
    let dir = TempDir::new().unwrap();
    let state = state(&dir);

    let started = submit_split(
        &state,
        SplitRequest {
            file_name: "sales.csv".into(),
            column_name: "country".into(),
            payload: b"region,amt\nUS,1\n".to_vec(),
        },
    )
    .await
    .unwrap();

    match finish(&state, &started.job_id).await {
        SplitStatusResponse::Failed { kind, error } => {
            assert_eq!(kind, ErrorKind::Schema);
            assert!(error.message.contains("country"));
        }
        other => panic!("Expected Failed, got {other:?}"),
    }

    let output = dir.path().join("output").join(started.job_id.as_str());
    let produced = std::fs::read_dir(&output).map(|d| d.count()).unwrap_or(0);
    assert_eq!(produced, 0);
    state.shutdown().await;
}

#[tokio::test]
async fn corrupt_workbook_reports_io_failure() {
    let dir = TempDir::new().unwrap();
    let state = state(&dir);

    let started = submit_split(
        &state,
        SplitRequest {
            file_name: "book.xlsx".into(),
            column_name: "Region".into(),
            payload: b"not a workbook".to_vec(),
        },
    )
    .await
    .unwrap();

    match finish(&state, &started.job_id).await {
        SplitStatusResponse::Failed { kind, error } => {
            assert_eq!(kind, ErrorKind::Io);
            assert!(error.message.starts_with("Error processing file:"), "{}", error.message);
            assert!(error.message.contains("Failed to open workbook"), "{}", error.message);
        }
        other => panic!("Expected Failed, got {other:?}"),
    }

    release_split(&state, started.job_id.as_str()).await.unwrap();
    state.shutdown().await;
}
