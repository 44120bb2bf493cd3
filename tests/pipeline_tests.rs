mod common;

use common::MemorySource;
use easyeda2kicad_rs::config::ConverterConfig;
use easyeda2kicad_rs::error::Error;
use easyeda2kicad_rs::library::{self, KicadVersion};
use easyeda2kicad_rs::pipeline::{
    ConversionQueue, ConversionRequest, ConversionStage, run_conversion,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;

fn request(lcsc_id: &str, prefix: &Path) -> ConversionRequest {
    ConversionRequest::new(lcsc_id, prefix)
}

#[tokio::test]
async fn full_conversion_writes_symbol_footprint_and_model() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("parts");
    let source = MemorySource::with_parts();
    let mut stages = Vec::new();
    let mut record = |stage: ConversionStage, percent: u8, _: &str| stages.push((stage, percent));

    let result = run_conversion(&request("C7593", &prefix), &source, &ConverterConfig::default(), &mut record)
        .await
        .unwrap();

    let symbol_lib = fs::read_to_string(dir.path().join("parts.kicad_sym")).unwrap();
    assert!(symbol_lib.starts_with("(kicad_symbol_lib"));
    assert!(symbol_lib.contains("(symbol \"NE555\""));
    assert!(symbol_lib.contains("(property \"Footprint\" \"parts:SOIC-8\""));
    let found = library::find_block(&symbol_lib, KicadVersion::V6, "c7593").unwrap();
    assert_eq!(found.name, "NE555");

    let footprint_path = result.footprint_path.clone().unwrap();
    assert_eq!(footprint_path, dir.path().join("parts.pretty").join("SOIC-8.kicad_mod"));
    let footprint = fs::read_to_string(&footprint_path).unwrap();
    assert!(footprint.contains("(pad 1 smd rect (at 12.70 12.70 0.00)"));
    assert!(footprint.contains("(model \"../parts.3dshapes/SOIC-8.wrl\""));

    let wrl = result.model_paths.wrl.clone().unwrap();
    assert_eq!(wrl, dir.path().join("parts.3dshapes").join("SOIC-8.wrl"));
    assert!(fs::read_to_string(&wrl).unwrap().starts_with("#VRML V2.0 utf8"));
    assert!(result.model_paths.step.clone().unwrap().is_file());

    assert_eq!(source.requests(), 1);
    assert_eq!(stages.first(), Some(&(ConversionStage::Fetching, 0)));
    assert_eq!(stages.last(), Some(&(ConversionStage::Completed, 100)));
    assert!(stages.windows(2).all(|pair| pair[0].1 <= pair[1].1));
    assert!(stages.contains(&(ConversionStage::Fetching, 25)));
}

#[tokio::test]
async fn existing_symbol_needs_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("parts");
    let source = MemorySource::with_parts();
    let config = ConverterConfig::default();
    let mut req = request("C7593", &prefix);
    req.generate_footprint = false;
    req.generate_model = false;
    let mut ignore = |_: ConversionStage, _: u8, _: &str| {};

    run_conversion(&req, &source, &config, &mut ignore).await.unwrap();
    let first = fs::read_to_string(dir.path().join("parts.kicad_sym")).unwrap();

    let err = run_conversion(&req, &source, &config, &mut ignore).await.unwrap_err();
    match err {
        Error::AlreadyExists { kind, name, lcsc_id } => {
            assert_eq!(kind, "Symbol");
            assert_eq!(name, "NE555");
            assert_eq!(lcsc_id, "C7593");
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(fs::read_to_string(dir.path().join("parts.kicad_sym")).unwrap(), first);

    req.overwrite = true;
    let result = run_conversion(&req, &source, &config, &mut ignore).await.unwrap();
    assert!(result.messages.iter().any(|m| m.contains("Updated existing symbol")));
    let updated = fs::read_to_string(dir.path().join("parts.kicad_sym")).unwrap();
    assert_eq!(updated, first);
    assert_eq!(updated.matches("(symbol \"NE555\"").count(), 1);
}

#[tokio::test]
async fn existing_footprint_needs_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("parts");
    let source = MemorySource::with_parts();
    let mut req = request("C17414", &prefix);
    req.generate_symbol = false;
    req.generate_model = false;
    let mut ignore = |_: ConversionStage, _: u8, _: &str| {};

    run_conversion(&req, &source, &ConverterConfig::default(), &mut ignore)
        .await
        .unwrap();
    let err = run_conversion(&req, &source, &ConverterConfig::default(), &mut ignore)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyExists { kind: "Footprint", .. }));
    assert!(err.to_string().contains("R0805"));
}

#[tokio::test]
async fn foreign_blocks_survive_an_insert() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("parts");
    let existing = "(kicad_symbol_lib (version 20211014) (generator kicad_symbol_editor)\n  (symbol \"Other\" (in_bom yes) (on_board yes)\n    (property \"Reference\" \"X\" (id 0) (at 0 0 0))\n  )\n)\n";
    fs::write(dir.path().join("parts.kicad_sym"), existing).unwrap();

    let source = MemorySource::with_parts();
    let mut req = request("C7593", &prefix);
    req.generate_footprint = false;
    req.generate_model = false;
    let mut ignore = |_: ConversionStage, _: u8, _: &str| {};
    run_conversion(&req, &source, &ConverterConfig::default(), &mut ignore)
        .await
        .unwrap();

    let content = fs::read_to_string(dir.path().join("parts.kicad_sym")).unwrap();
    assert!(content.contains("  (symbol \"Other\" (in_bom yes) (on_board yes)\n    (property \"Reference\" \"X\" (id 0) (at 0 0 0))\n  )\n"));
    assert!(library::contains_component(&content, KicadVersion::V6, "NE555"));
    assert!(content.trim_end().ends_with(')'));
}

#[tokio::test]
async fn legacy_library_gets_flat_block() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("legacy");
    let source = MemorySource::with_parts();
    let mut req = request("C7593", &prefix);
    req.kicad_version = KicadVersion::V5;
    req.generate_footprint = false;
    req.generate_model = false;
    let mut ignore = |_: ConversionStage, _: u8, _: &str| {};

    let result = run_conversion(&req, &source, &ConverterConfig::default(), &mut ignore)
        .await
        .unwrap();
    assert_eq!(result.symbol_path, Some(dir.path().join("legacy.lib")));

    let content = fs::read_to_string(dir.path().join("legacy.lib")).unwrap();
    assert!(content.starts_with("EESchema-LIBRARY Version 2.4\n#encoding utf-8\n"));
    assert!(content.contains("\n#\n# NE555\n#\nDEF NE555 U "));
    assert!(content.contains("F6 \"C7593\""));
    assert_eq!(
        library::find_block(&content, KicadVersion::V5, "C7593").map(|b| b.footprint),
        Some(Some("legacy:SOIC-8".to_string()))
    );
}

#[tokio::test]
async fn fetch_problems_are_reported_with_the_part() {
    let dir = tempfile::tempdir().unwrap();
    let source = MemorySource::with_parts();
    let mut last_stage = None;
    let mut record = |stage: ConversionStage, _: u8, _: &str| last_stage = Some(stage);

    let err = run_conversion(
        &request("C999", &dir.path().join("parts")),
        &source,
        &ConverterConfig::default(),
        &mut record,
    )
    .await
    .unwrap_err();
    assert_eq!(err.to_string(), "Failed to fetch data for C999: HTTP 404");
    assert_eq!(last_stage, Some(ConversionStage::Failed));

    let mut ignore = |_: ConversionStage, _: u8, _: &str| {};
    let err = run_conversion(
        &request("C1", &dir.path().join("parts")),
        &source,
        &ConverterConfig::default(),
        &mut ignore,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::EmptyData(id) if id == "C1"));
}

#[tokio::test]
async fn invalid_request_touches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let source = MemorySource::with_parts();
    let mut ignore = |_: ConversionStage, _: u8, _: &str| {};

    let err = run_conversion(
        &request("7593", &dir.path().join("out/parts")),
        &source,
        &ConverterConfig::default(),
        &mut ignore,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
    assert_eq!(source.requests(), 0);
    assert!(!dir.path().join("out").exists());
}

#[tokio::test]
async fn missing_model_is_a_message_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let source = MemorySource::with_parts();
    let mut req = request("C17414", &dir.path().join("parts"));
    req.generate_symbol = false;
    req.generate_footprint = false;
    let mut ignore = |_: ConversionStage, _: u8, _: &str| {};

    let result = run_conversion(&req, &source, &ConverterConfig::default(), &mut ignore)
        .await
        .unwrap();
    assert!(result.model_paths.wrl.is_none());
    assert_eq!(result.messages, vec!["No 3D model found for C17414".to_string()]);
    assert!(dir.path().join("parts.3dshapes").is_dir());
    assert!(!dir.path().join("parts.kicad_sym").exists());
}

#[tokio::test]
async fn default_library_uses_configured_folder_and_token() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConverterConfig {
        library_dir: dir.path().to_path_buf(),
        ..Default::default()
    };
    let source = MemorySource::with_parts();
    let mut req = request("C7593", Path::new(""));
    req.generate_symbol = false;
    req.generate_model = false;
    let mut ignore = |_: ConversionStage, _: u8, _: &str| {};

    let result = run_conversion(&req, &source, &config, &mut ignore).await.unwrap();
    let footprint = fs::read_to_string(result.footprint_path.unwrap()).unwrap();
    assert!(footprint.contains("(model \"${EASYEDA2KICAD}/easyeda2kicad.3dshapes/SOIC-8.wrl\""));
    assert!(dir.path().join("easyeda2kicad.pretty").is_dir());
}

#[tokio::test]
async fn queue_runs_jobs_in_order_on_one_library() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("parts");
    let queue = ConversionQueue::start(Arc::new(MemorySource::with_parts()), ConverterConfig::default());

    assert!(matches!(
        queue.submit(request("X1", &prefix)),
        Err(Error::InvalidInput(_))
    ));

    let first = queue.submit(request("C7593", &prefix)).unwrap();
    let second = queue.submit(request("C17414", &prefix)).unwrap();
    let missing = queue.submit(request("C999", &prefix)).unwrap();
    assert!(first < second && second < missing);

    let done = queue.wait(second).await.unwrap();
    assert_eq!(done.stage, ConversionStage::Completed);
    assert_eq!(done.percent, 100);
    assert!(done.result.is_some());

    let failed = queue.wait(missing).await.unwrap();
    assert_eq!(failed.stage, ConversionStage::Failed);
    assert_eq!(failed.error.as_deref(), Some("Failed to fetch data for C999: HTTP 404"));

    let snapshot = queue.shutdown().await;
    let ids: Vec<u64> = snapshot.iter().map(|task| task.id).collect();
    assert_eq!(ids, vec![first, second, missing]);
    assert_eq!(snapshot[0].stage, ConversionStage::Completed);

    let content = fs::read_to_string(dir.path().join("parts.kicad_sym")).unwrap();
    let index = library::index_by_lcsc_id(&content, KicadVersion::V6);
    assert!(index.contains_key("C7593"));
    assert!(index.contains_key("C17414"));
}

#[tokio::test]
async fn queue_snapshots_are_immutable() {
    let dir = tempfile::tempdir().unwrap();
    let queue = ConversionQueue::start(Arc::new(MemorySource::with_parts()), ConverterConfig::default());
    let before = queue.snapshot();
    let id = queue.submit(request("C17414", &dir.path().join("parts"))).unwrap();
    queue.wait(id).await.unwrap();

    assert!(before.is_empty());
    assert_eq!(queue.snapshot().len(), 1);
    queue.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn finished_tasks_always_carry_their_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("parts");
    for _ in 0..200 {
        let queue = ConversionQueue::start(Arc::new(MemorySource::with_parts()), ConverterConfig::default());
        let missing = queue.submit(request("C999", &prefix)).unwrap();
        let failed = queue.wait(missing).await.unwrap();
        assert_eq!(failed.stage, ConversionStage::Failed);
        assert!(failed.error.is_some());

        let mut req = request("C17414", &prefix);
        req.overwrite = true;
        let ok = queue.submit(req).unwrap();
        let done = queue.wait(ok).await.unwrap();
        assert_eq!(done.stage, ConversionStage::Completed);
        assert!(done.result.is_some());
        queue.shutdown().await;
    }
}

#[tokio::test]
async fn waiting_on_an_unknown_task_is_rejected() {
    let queue = ConversionQueue::start(Arc::new(MemorySource::with_parts()), ConverterConfig::default());
    assert!(matches!(queue.wait(42).await, Err(Error::InvalidInput(_))));
    queue.shutdown().await;
}

#[tokio::test]
async fn model_placement_does_not_depend_on_model_export() {
    let source = MemorySource::with_parts();
    let mut ignore = |_: ConversionStage, _: u8, _: &str| {};
    let mut footprints = Vec::new();
    for generate_model in [false, true] {
        let dir = tempfile::tempdir().unwrap();
        let mut req = request("C7593", &dir.path().join("parts"));
        req.generate_symbol = false;
        req.generate_model = generate_model;
        let result = run_conversion(&req, &source, &ConverterConfig::default(), &mut ignore)
            .await
            .unwrap();
        footprints.push(fs::read_to_string(result.footprint_path.unwrap()).unwrap());
    }
    let offset = |text: &str| {
        text.lines()
            .find(|line| line.contains("(offset"))
            .map(str::to_string)
    };
    assert!(offset(&footprints[0]).is_some());
    assert_eq!(offset(&footprints[0]), offset(&footprints[1]));
    assert_eq!(footprints[0], footprints[1]);
}
