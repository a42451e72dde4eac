mod common;

use std::fs;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{backups_in, FaultyFs, Network, ZERO_DOC};
use vpos_reset::config_store::ConfigStore;
use vpos_reset::fs::LocalFs;
use vpos_reset::journal::Journal;
use vpos_reset::types::RESET_FIELD;

fn local_store(net: &Network) -> ConfigStore {
    ConfigStore::new(Arc::new(LocalFs), Journal::open(net.log_file()).unwrap())
}

#[test]
fn write_then_read_returns_new_value_and_keeps_backup() {
    let net = Network::new();
    let doc = net.add_checkout(2, 31, ZERO_DOC);
    let store = local_store(&net);

    assert!(store.write_field(&doc, RESET_FIELD, 1));
    assert_eq!(fs::read_to_string(&doc).unwrap(), "<Config><ResetVPOSData>1</ResetVPOSData></Config>");
    assert_eq!(store.read_field(&doc, RESET_FIELD), Some(1));

    let backups = backups_in(&net.data_dir(2, 31));
    assert_eq!(backups.len(), 1);
    let name = backups[0].file_name().unwrap().to_str().unwrap().to_string();
    assert!(name.starts_with("vpos_state_backup_"), "{name}");
    assert!(name.ends_with(".cfg"), "{name}");
    // vpos_state_backup_ + yyyyMMdd_HHmmss + .cfg
    assert_eq!(name.len(), "vpos_state_backup_".len() + 15 + ".cfg".len());
    assert_eq!(fs::read_to_string(&backups[0]).unwrap(), ZERO_DOC);

    let log = net.log_text();
    assert!(log.contains("[INFO] Backup created: "));
    assert!(log.contains("[SUCCESS] Updated ResetVPOSData: 0 → 1 - File: "));
}

#[test]
fn unrelated_content_survives_a_rewrite() {
    let net = Network::new();
    let original = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
                    <Config>\n  <!-- keep me -->\n  <Lane id=\"7\">Express</Lane>\n  \
                    <State>\n    <ResetVPOSData>0</ResetVPOSData>\n  </State>\n</Config>\n";
    let doc = net.add_checkout(3, 32, original);
    let store = local_store(&net);

    assert!(store.write_field(&doc, RESET_FIELD, 42));
    assert_eq!(
        fs::read_to_string(&doc).unwrap(),
        original.replace(">0<", ">42<")
    );
}

#[test]
fn failed_backup_leaves_document_untouched() {
    let net = Network::new();
    let doc = net.add_checkout(2, 31, ZERO_DOC);
    let before = fs::read(&doc).unwrap();
    let fs_impl = Arc::new(FaultyFs { fail_copy: true, ..Default::default() });
    let store = ConfigStore::new(fs_impl.clone(), Journal::open(net.log_file()).unwrap());

    assert!(!store.write_field(&doc, RESET_FIELD, 1));
    assert_eq!(fs::read(&doc).unwrap(), before);
    assert_eq!(fs_impl.writes.load(Ordering::SeqCst), 0);
    assert!(backups_in(&net.data_dir(2, 31)).is_empty());
    assert!(net.log_text().contains("[ERROR] Failed to create backup for: "));
}

#[test]
fn missing_field_aborts_after_backup() {
    let net = Network::new();
    let doc = net.add_checkout(2, 31, "<Config><Other>1</Other></Config>");
    let store = local_store(&net);

    assert!(!store.write_field(&doc, RESET_FIELD, 1));
    assert_eq!(fs::read_to_string(&doc).unwrap(), "<Config><Other>1</Other></Config>");
    assert_eq!(backups_in(&net.data_dir(2, 31)).len(), 1);
    assert!(net.log_text().contains("[ERROR] ResetVPOSData element not found in: "));
}

#[test]
fn missing_document_is_soft() {
    let net = Network::new();
    let store = local_store(&net);
    let doc = net.doc_path(4, 31);

    assert_eq!(store.read_field(&doc, RESET_FIELD), None);
    assert!(!store.write_field(&doc, RESET_FIELD, 1));
    assert!(!store.validate(&doc, RESET_FIELD));
    let log = net.log_text();
    assert!(log.contains("[WARNING] Configuration file not found: "));
    assert!(log.contains("[ERROR] Configuration file not found: "));
}

#[test]
fn wrong_root_and_garbage_read_as_none() {
    let net = Network::new();
    let store = local_store(&net);
    let wrong_root = net.add_checkout(2, 31, "<Settings><ResetVPOSData>0</ResetVPOSData></Settings>");
    let garbage = net.add_checkout(2, 32, "not xml at all <<<");
    let non_numeric = net.add_checkout(3, 31, "<Config><ResetVPOSData>yes</ResetVPOSData></Config>");

    assert_eq!(store.read_field(&wrong_root, RESET_FIELD), None);
    assert_eq!(store.read_field(&garbage, RESET_FIELD), None);
    assert_eq!(store.read_field(&non_numeric, RESET_FIELD), None);
    assert!(!store.validate(&wrong_root, RESET_FIELD));
}

#[test]
fn validate_accepts_expected_structure() {
    let net = Network::new();
    let store = local_store(&net);
    let doc = net.add_checkout(2, 31, "<Config><A/><ResetVPOSData>3</ResetVPOSData></Config>");
    assert!(store.validate(&doc, RESET_FIELD));
    assert_eq!(store.read_field(&doc, RESET_FIELD), Some(3));
}
