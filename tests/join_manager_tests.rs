//! Integration tests for the join manager facade (spec §8).

use join_manager::join::{CsvOptions, InMemoryProvider, Manager, ManagerConfig, UploadedFile};

fn manager(dir: &std::path::Path, max_days: u32, max_files: u32) -> Manager {
    Manager::from_config(Some(ManagerConfig {
        source_dir: dir.to_path_buf(),
        max_days,
        max_files,
    }))
    .unwrap()
}

fn buildings_provider() -> InMemoryProvider {
    InMemoryProvider::new(
        "feature",
        vec![("id", true)],
        vec!["id", "geometry", "name"],
    )
}

fn csv_options(contents: &str) -> CsvOptions {
    CsvOptions {
        collection_key: "id".to_string(),
        join_key: "id".to_string(),
        join_file: UploadedFile {
            name: "upload.csv".to_string(),
            content_type: "text/csv".to_string(),
            buffer: contents.as_bytes().to_vec(),
        },
        join_fields: String::new(),
        csv_delimiter: ',',
        csv_header_row: 1,
        csv_data_start_row: 2,
    }
}

#[test]
fn scenario_happy_path_process_list_read_join_remove() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path(), 0, 0);
    let provider = buildings_provider();

    let table = manager
        .process_csv(
            "buildings",
            &provider,
            &csv_options("id,city,population\n1,Springfield,35000\n2,Shelbyville,28000\n"),
        )
        .unwrap();
    assert_eq!(table.number_of_rows, 2);

    let listed = manager.list("buildings").unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, table.id);

    let read_back = manager.read("buildings", &table.id.to_string()).unwrap();
    assert_eq!(read_back.join_fields, vec!["city", "population"]);

    let mut feature = serde_json::json!({
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "properties": {"id": 1}},
            {"type": "Feature", "properties": {"id": 3}},
        ]
    });
    let joined = manager
        .perform_join("buildings", &table.id.to_string(), &mut feature)
        .unwrap();
    assert_eq!(joined, 1);
    assert_eq!(feature["numberJoined"], serde_json::json!(1));
    assert_eq!(
        feature["features"][0]["properties"]["city"],
        serde_json::json!("Springfield")
    );
    assert_eq!(feature["features"][1]["properties"]["joined"], serde_json::json!(false));

    let removed = manager.remove("buildings", &table.id.to_string()).unwrap();
    assert!(removed);
    assert!(manager.list("buildings").unwrap().is_empty());
}

#[test]
fn scenario_duplicate_key_aborts_whole_ingest() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path(), 0, 0);
    let provider = buildings_provider();

    let err = manager
        .process_csv("buildings", &provider, &csv_options("id,city\n1,A\n1,B\n"))
        .unwrap_err();
    assert!(matches!(err, join_manager::join::JoinError::DuplicateKey(_)));

    // No partial persistence: nothing was written for this collection.
    assert!(manager.list("buildings").unwrap().is_empty());
}

#[test]
fn scenario_offset_header_row() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path(), 0, 0);
    let provider = buildings_provider();

    let mut opts = csv_options("# source: county GIS\n# generated 2026-01-01\nid,city\n1,A\n2,B\n");
    opts.csv_header_row = 3;
    opts.csv_data_start_row = 4;

    let table = manager.process_csv("buildings", &provider, &opts).unwrap();
    assert_eq!(table.number_of_rows, 2);
}

#[test]
fn scenario_column_collision_with_provider_fields_is_elided() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path(), 0, 0);
    let provider = buildings_provider();

    // "name" collides with the provider's own feature schema.
    let table = manager
        .process_csv(
            "buildings",
            &provider,
            &csv_options("id,name,population\n1,A,100\n"),
        )
        .unwrap();
    assert_eq!(table.join_fields, vec!["population"]);
}

#[test]
fn scenario_explicit_join_fields_whitelist() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path(), 0, 0);
    let provider = buildings_provider();

    let mut opts = csv_options("id,city,population,area\n1,A,100,50.5\n");
    opts.join_fields = "area,city".to_string();

    let table = manager.process_csv("buildings", &provider, &opts).unwrap();
    assert_eq!(table.join_fields, vec!["area", "city"]);
}

#[test]
fn scenario_retention_sweep_enforces_max_files_keeping_newest() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path(), 0, 2);
    let provider = buildings_provider();

    // `process_csv` sweeps after every ingest, so the cap is enforced
    // incrementally rather than only at the end.
    for n in 0..4 {
        manager
            .process_csv(
                "buildings",
                &provider,
                &csv_options(&format!("id,city\n1,Row{n}\n")),
            )
            .unwrap();
        // Force strictly increasing timestamps across iterations so the
        // sweep's "keep newest" rule has a deterministic outcome.
        std::thread::sleep(std::time::Duration::from_millis(5));
    }

    assert_eq!(manager.list("buildings").unwrap().len(), 2);
}

#[test]
fn scenario_orphan_file_is_reaped_on_read() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path(), 0, 0);
    let provider = buildings_provider();

    let table = manager
        .process_csv("buildings", &provider, &csv_options("id,city\n1,A\n"))
        .unwrap();

    let data_path = dir.path().join(format!("table-{}.json", table.id));
    std::fs::remove_file(&data_path).unwrap();

    let err = manager.read("buildings", &table.id.to_string()).unwrap_err();
    assert!(matches!(err, join_manager::join::JoinError::MissingFile(_)));

    // Reaped: a retention sweep afterwards finds nothing left to do.
    let report = manager.sweep().unwrap();
    assert_eq!(report, join_manager::join::SweepReport::default());
}

#[test]
fn scenario_orphan_file_is_reaped_on_list() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path(), 0, 0);
    let provider = buildings_provider();

    let table = manager
        .process_csv("buildings", &provider, &csv_options("id,city\n1,A\n"))
        .unwrap();

    let data_path = dir.path().join(format!("table-{}.json", table.id));
    std::fs::remove_file(&data_path).unwrap();

    let listed = manager.list("buildings").unwrap();
    assert!(listed.is_empty());

    // Reaped during list: nothing left for the sweep to clean up.
    let report = manager.sweep().unwrap();
    assert_eq!(report, join_manager::join::SweepReport::default());
}

#[test]
fn scenario_orphan_is_removable() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path(), 0, 0);
    let provider = buildings_provider();

    let table = manager
        .process_csv("buildings", &provider, &csv_options("id,city\n1,A\n"))
        .unwrap();

    let data_path = dir.path().join(format!("table-{}.json", table.id));
    std::fs::remove_file(&data_path).unwrap();

    let removed = manager.remove("buildings", &table.id.to_string()).unwrap();
    assert!(removed);
}

#[test]
fn scenario_empty_collection_key_rejects_unknown_field() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path(), 0, 0);
    let provider = buildings_provider();

    let mut opts = csv_options("id,city\n1,A\n");
    opts.collection_key = "not_a_key_field".to_string();

    let err = manager.process_csv("buildings", &provider, &opts).unwrap_err();
    assert!(matches!(
        err,
        join_manager::join::JoinError::CollectionKeyNotInProvider(_)
    ));
}

#[test]
fn disabled_manager_from_config_none_rejects_all_operations() {
    let manager = Manager::from_config(None).unwrap();
    assert!(!manager.is_enabled());
    assert_eq!(manager.sweep().unwrap(), join_manager::join::SweepReport::default());

    let err = manager.list("buildings").unwrap_err();
    assert!(matches!(err, join_manager::join::JoinError::MissingOption(_)));
}
