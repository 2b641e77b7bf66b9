//! End-to-end conversion tests: archive to source tree and back, with the
//! canonical checksum as the equality oracle.

use canvasml_checksum::compare_archives;
use canvasml_doc::{pack, source_layout, unpack, Archive};
use serde_json::json;

fn entry(archive: &mut Archive, name: &str, value: serde_json::Value) {
    archive.write_json(name, &value).unwrap();
}

/// Full template record the way production archives write them: every
/// member present even when defaulted.
fn template(name: &str, version: &str) -> serde_json::Value {
    json!({
        "Id": format!("template://{name}"),
        "Name": name,
        "Version": version,
        "Variant": null,
        "IsComponentDefinition": false,
        "IsComponentTemplate": false,
        "PerInstance": false,
        "CustomProperties": [],
        "NestedTemplates": []
    })
}

/// An app with one screen holding a label, a data source and an asset blob.
fn hello_archive() -> Archive {
    let mut archive = Archive::new();
    entry(
        &mut archive,
        "Header.json",
        json!({
            "DocVersion": "1.324",
            "LastSavedDateTimeUTC": "2024-05-01T10:23:45.1234567Z"
        }),
    );
    entry(
        &mut archive,
        "Properties.json",
        json!({
            "Name": "Hello App",
            "LogoFileName": "logo4a7c.png",
            "Connections": {"shared_orders": {"DataSources": ["Orders"]}}
        }),
    );
    entry(
        &mut archive,
        "References/DataSources.json",
        json!({
            "DataSources": [
                {"Name": "Orders", "Type": "ConnectedDataSourceInfo"}
            ]
        }),
    );
    entry(
        &mut archive,
        "References/Templates.json",
        json!([template("screen", "1.0"), template("label", "2.5.0")]),
    );
    entry(
        &mut archive,
        "Controls/3.json",
        json!({
            "Name": "Screen1",
            "ControlUniqueId": "3",
            "Template": template("screen", "1.0"),
            "StyleName": "defaultScreen",
            "Rules": [
                {"Property": "Fill", "InvariantScript": "Color.White", "Category": "Design"},
                {"Property": "OnVisible", "InvariantScript": "Set(greeting, \"Hello\")", "Category": "Behavior"}
            ],
            "Children": [
                {
                    "Name": "Label1",
                    "ControlUniqueId": "7",
                    "Template": template("label", "2.5.0"),
                    "StyleName": "defaultLabel",
                    "Rules": [
                        {"Property": "Text", "InvariantScript": "\"Hello\"", "Category": "Data"},
                        {"Property": "X", "InvariantScript": "40", "Category": "Design"}
                    ],
                    "Children": [],
                    "IsGroupControl": false,
                    "HasDynamicProperties": false,
                    "DynamicProperties": []
                }
            ],
            "IsGroupControl": false,
            "HasDynamicProperties": false,
            "DynamicProperties": []
        }),
    );
    archive.insert("Assets/Images/logo4a7c.png", vec![0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a]);
    archive
}

#[test]
fn test_round_trip_is_checksum_equal() {
    let original = hello_archive();
    let unpacked = unpack(&original).unwrap();
    let packed = pack(&unpacked.source).unwrap();

    let mismatches = compare_archives(
        &original.clone().into_entries(),
        &packed.archive.clone().into_entries(),
    );
    assert!(mismatches.is_empty(), "round trip changed entries: {mismatches:?}");
}

#[test]
fn test_sources_are_readable() {
    let unpacked = unpack(&hello_archive()).unwrap();
    let screen = std::str::from_utf8(unpacked.source.get("Src/Screen1.cml").unwrap()).unwrap();
    assert_eq!(
        screen,
        "Screen1 As screen:\n    Fill: =Color.White\n    OnVisible: =Set(greeting, \"Hello\")\n    Label1 As label:\n        Text: =\"Hello\"\n        X: =40\n"
    );
}

#[test]
fn test_round_trip_without_entropy_is_semantically_equal() {
    let original = hello_archive();
    let unpacked = unpack(&original).unwrap();

    let mut source = unpacked.source.clone();
    source.remove(source_layout::ENTROPY);
    let packed = pack(&source).unwrap();

    // Volatile details moved, so bytes differ somewhere.
    let mismatches = compare_archives(
        &original.clone().into_entries(),
        &packed.archive.clone().into_entries(),
    );
    assert!(!mismatches.is_empty());

    // The formulas did not.
    let reunpacked = unpack(&packed.archive).unwrap();
    assert_eq!(
        reunpacked.source.get("Src/Screen1.cml"),
        unpacked.source.get("Src/Screen1.cml")
    );

    // And a second pack of the same sources is deterministic.
    let again = pack(&source).unwrap();
    assert_eq!(packed.archive, again.archive);
}

#[test]
fn test_repacked_archive_unpacks_to_identical_sources() {
    let unpacked = unpack(&hello_archive()).unwrap();
    let packed = pack(&unpacked.source).unwrap();
    let reunpacked = unpack(&packed.archive).unwrap();
    assert_eq!(unpacked.source, reunpacked.source);
}
