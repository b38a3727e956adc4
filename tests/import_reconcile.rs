mod common;

use common::fixtures::{conversation, message, scenario_one, scenario_two, write_export};
use common::{count_rows, test_db, test_log};
use tempfile::TempDir;
use threadkeep::model::{ImportStatus, MAIN_BRANCH};
use threadkeep::{ImportConfig, Importer, ThreadkeepError};

#[test]
fn scenario_one_first_import_then_duplicate_rejected() {
    let _log = test_log("scenario_one_first_import_then_duplicate_rejected");
    let temp = TempDir::new().unwrap();
    let path = scenario_one(temp.path());
    let mut storage = test_db();

    let stats = Importer::new(&mut storage, ImportConfig::default())
        .import(&path)
        .unwrap();
    assert_eq!(stats.conversations_imported, 1);
    assert_eq!(stats.messages_imported, 2);
    assert_eq!(stats.branches_created, 0);

    let branches = storage.list_branches("c1").unwrap();
    assert_eq!(branches.len(), 1);
    assert_eq!(branches[0].name, MAIN_BRANCH);
    assert!(branches[0].is_main());

    let before = (
        count_rows(&storage, "conversations"),
        count_rows(&storage, "messages"),
        count_rows(&storage, "branches"),
        count_rows(&storage, "import_history"),
    );
    let err = Importer::new(&mut storage, ImportConfig::default())
        .import(&path)
        .unwrap_err();
    assert!(
        matches!(err, ThreadkeepError::DuplicateImport { .. }),
        "unexpected error: {err}"
    );
    let after = (
        count_rows(&storage, "conversations"),
        count_rows(&storage, "messages"),
        count_rows(&storage, "branches"),
        count_rows(&storage, "import_history"),
    );
    assert_eq!(before, after, "rejected import must not touch the store");
}

#[test]
fn scenario_two_superset_export_forks_and_keeps_history() {
    let _log = test_log("scenario_two_superset_export_forks_and_keeps_history");
    let temp = TempDir::new().unwrap();
    let mut storage = test_db();

    Importer::new(&mut storage, ImportConfig::default())
        .import(&scenario_one(temp.path()))
        .unwrap();
    let original = storage.list_messages("c1").unwrap();
    let conversation_id = storage.get_conversation("c1").unwrap().unwrap().id;

    let stats = Importer::new(&mut storage, ImportConfig::default())
        .import(&scenario_two(temp.path()))
        .unwrap();
    assert_eq!(stats.conversations_imported, 0);
    assert_eq!(stats.conversations_updated, 1);
    assert_eq!(stats.messages_skipped, 2);
    assert_eq!(stats.messages_imported, 1);
    assert_eq!(stats.branches_created, 1);
    assert_eq!(stats.status(), ImportStatus::Success);

    let conversation = storage.get_conversation("c1").unwrap().unwrap();
    assert_eq!(conversation.id, conversation_id, "conversation updated in place");
    assert_eq!(conversation.message_count, 3);

    let messages = storage.list_messages("c1").unwrap();
    assert_eq!(&messages[..2], &original[..], "stored rows are untouched");

    let branches = storage.list_branches("c1").unwrap();
    assert_eq!(branches.len(), 2);
    let main = &branches[0];
    let fork = &branches[1];
    assert_eq!(fork.parent_branch_id, Some(main.id));
    assert!(fork.name.starts_with("branch-"));

    let m1 = &messages[0];
    let m3 = &messages[2];
    assert_eq!(m3.uuid, "m3");
    assert_eq!(m3.branch_id, fork.id);
    assert_eq!(m3.parent_id, Some(m1.id));
    assert_eq!(m3.sequence, 2);
}

#[test]
fn fork_detected_within_a_single_import() {
    let _log = test_log("fork_detected_within_a_single_import");
    let temp = TempDir::new().unwrap();
    let path = scenario_two(temp.path());
    let mut storage = test_db();

    let stats = Importer::new(&mut storage, ImportConfig::default())
        .import(&path)
        .unwrap();
    assert_eq!(stats.messages_imported, 3);
    assert_eq!(stats.branches_created, 1);

    let branches = storage.list_branches("c1").unwrap();
    let (main_id, _) = storage.get_message_branch("m2").unwrap().unwrap();
    let (fork_id, _) = storage.get_message_branch("m3").unwrap().unwrap();
    assert_eq!(main_id, branches[0].id);
    assert_ne!(fork_id, main_id);
}

#[test]
fn missing_parent_lands_on_main_without_error() {
    let _log = test_log("missing_parent_lands_on_main_without_error");
    let temp = TempDir::new().unwrap();
    let path = write_export(
        temp.path(),
        "dangling.json",
        &[conversation(
            "c1",
            vec![
                message("m1", "human", Some("deleted-upstream")),
                message("m2", "assistant", Some("m1")),
            ],
        )],
    );
    let mut storage = test_db();

    let stats = Importer::new(&mut storage, ImportConfig::default())
        .import(&path)
        .unwrap();
    assert!(stats.errors.is_empty());
    assert_eq!(stats.messages_imported, 2);

    let main = storage.list_branches("c1").unwrap()[0].id;
    assert_eq!(storage.get_message_branch("m1").unwrap(), Some((main, None)));
}

#[test]
fn later_conversation_can_reference_earlier_one() {
    let _log = test_log("later_conversation_can_reference_earlier_one");
    let temp = TempDir::new().unwrap();
    let path = write_export(
        temp.path(),
        "cross.json",
        &[
            conversation("c1", vec![message("a1", "human", None)]),
            conversation("c2", vec![message("b1", "assistant", Some("a1"))]),
        ],
    );
    let mut storage = test_db();

    let stats = Importer::new(&mut storage, ImportConfig::default())
        .import(&path)
        .unwrap();
    assert_eq!(stats.conversations_imported, 2);
    assert_eq!(stats.branches_created, 0);

    let a1 = &storage.list_messages("c1").unwrap()[0];
    let b1 = &storage.list_messages("c2").unwrap()[0];
    assert_eq!(b1.parent_id, Some(a1.id));
    assert_eq!(b1.branch_id, storage.list_branches("c2").unwrap()[0].id);
}

#[test]
fn message_stored_by_earlier_import_under_other_conversation_is_skipped() {
    let _log = test_log("message_stored_by_earlier_import_under_other_conversation_is_skipped");
    let temp = TempDir::new().unwrap();
    let mut storage = test_db();
    let first = write_export(
        temp.path(),
        "first.json",
        &[conversation("c1", vec![message("m1", "human", None)])],
    );
    Importer::new(&mut storage, ImportConfig::default())
        .import(&first)
        .unwrap();

    let second = write_export(
        temp.path(),
        "second.json",
        &[conversation(
            "c2",
            vec![
                message("m1", "human", None),
                message("m2", "assistant", Some("m1")),
            ],
        )],
    );
    let stats = Importer::new(&mut storage, ImportConfig::default())
        .import(&second)
        .unwrap();

    assert!(stats.errors.is_empty(), "errors: {:?}", stats.errors);
    assert_eq!(stats.status(), ImportStatus::Success);
    assert_eq!(stats.conversations_imported, 1);
    assert_eq!(stats.messages_imported, 1);
    assert_eq!(stats.messages_skipped, 1);

    let m1 = &storage.list_messages("c1").unwrap()[0];
    let c2 = storage.list_messages("c2").unwrap();
    assert_eq!(c2.len(), 1);
    assert_eq!(c2[0].uuid, "m2");
    assert_eq!(c2[0].parent_id, Some(m1.id));
    assert_eq!(c2[0].branch_id, storage.list_branches("c2").unwrap()[0].id);
    assert_eq!(count_rows(&storage, "messages"), 2);

    let history = storage.list_imports(Some(1)).unwrap();
    assert_eq!(history[0].status, ImportStatus::Success);
}

#[test]
fn text_falls_back_to_content_blocks() {
    let _log = test_log("text_falls_back_to_content_blocks");
    let temp = TempDir::new().unwrap();
    let mut block_message = message("m1", "assistant", None);
    block_message["text"] = serde_json::Value::String(String::new());
    block_message["content"] = serde_json::json!([
        {"type": "thinking", "thinking": "hmm"},
        {"type": "text", "text": "from the block"},
        {"type": "text", "text": "second block"}
    ]);
    let path = write_export(
        temp.path(),
        "blocks.json",
        &[conversation("c1", vec![block_message])],
    );
    let mut storage = test_db();

    Importer::new(&mut storage, ImportConfig::default())
        .import(&path)
        .unwrap();
    assert_eq!(storage.list_messages("c1").unwrap()[0].text, "from the block");
}

#[test]
fn renamed_conversation_is_updated_in_place() {
    let _log = test_log("renamed_conversation_is_updated_in_place");
    let temp = TempDir::new().unwrap();
    let mut storage = test_db();
    Importer::new(&mut storage, ImportConfig::default())
        .import(&scenario_one(temp.path()))
        .unwrap();

    let mut renamed = conversation(
        "c1",
        vec![
            message("m1", "human", None),
            message("m2", "assistant", Some("m1")),
        ],
    );
    renamed["name"] = serde_json::Value::String("Renamed".to_string());
    renamed["updated_at"] = serde_json::Value::String("2024-06-01T00:00:00Z".to_string());
    let path = write_export(temp.path(), "renamed.json", &[renamed]);

    let stats = Importer::new(&mut storage, ImportConfig::default())
        .import(&path)
        .unwrap();
    assert_eq!(stats.messages_imported, 0);

    let stored = storage.get_conversation("c1").unwrap().unwrap();
    assert_eq!(stored.name, "Renamed");
    assert_eq!(stored.updated_at.to_rfc3339(), "2024-06-01T00:00:00+00:00");
    assert_eq!(stored.message_count, 2);
    assert_eq!(count_rows(&storage, "messages"), 2);
}
