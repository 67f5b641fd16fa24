use std::{collections::HashSet, sync::Arc};

use chrono::NaiveDate;
use tempfile::TempDir;

use crate::reminder::ValidationError;

use super::*;

struct TestContext {
    dir: TempDir,
    storage: JsonReminderStorage,
}

impl TestContext {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonReminderStorage::open(dir.path().join("lembretes.json")).await;

        Self { dir, storage }
    }

    fn document_path(&self) -> PathBuf {
        self.dir.path().join("lembretes.json")
    }

    fn read_document_bytes(&self) -> Vec<u8> {
        std::fs::read(self.document_path()).unwrap()
    }

    async fn reopen(&self) -> JsonReminderStorage {
        JsonReminderStorage::open(self.document_path()).await
    }
}

#[tokio::test]
async fn missing_document_is_created_on_open() {
    let ctx = TestContext::new().await;

    let document: serde_json::Value = serde_json::from_slice(&ctx.read_document_bytes()).unwrap();

    assert_eq!(document, serde_json::json!({ "lembretes": [] }));
    assert!(ctx.storage.get_all().await.is_empty());
}

#[tokio::test]
async fn missing_parent_directories_are_created() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("deeper").join("lembretes.json");

    let storage = JsonReminderStorage::open(&path).await;

    assert!(path.exists());
    assert_eq!(storage.path(), path.as_path());
}

#[tokio::test]
async fn malformed_document_is_left_untouched_until_next_save() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lembretes.json");
    std::fs::write(&path, "{ not json").unwrap();

    let storage = JsonReminderStorage::open(&path).await;

    assert!(storage.get_all().await.is_empty());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");

    storage
        .insert(NewReminder::new("Drink water", "08:00"))
        .await
        .unwrap();

    let reloaded = JsonReminderStorage::open(&path).await;
    assert_eq!(reloaded.get_all().await.len(), 1);
}

#[tokio::test]
async fn inserted_reminders_get_unique_increasing_ids() {
    let ctx = TestContext::new().await;

    let mut ids = Vec::new();
    for i in 0..100 {
        let reminder = ctx
            .storage
            .insert(NewReminder::new(format!("Reminder {i}"), "10:00"))
            .await
            .unwrap();
        ids.push(reminder.id);
    }

    let unique: HashSet<_> = ids.iter().copied().collect();
    assert_eq!(unique.len(), ids.len());
    assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
}

#[tokio::test]
async fn ids_are_not_reused_after_reopening() {
    let ctx = TestContext::new().await;
    let first = ctx
        .storage
        .insert(NewReminder::new("First", "10:00"))
        .await
        .unwrap();
    ctx.storage.remove(first.id).await.unwrap();
    let second = ctx
        .storage
        .insert(NewReminder::new("Second", "10:00"))
        .await
        .unwrap();

    let reopened = ctx.reopen().await;
    let third = reopened
        .insert(NewReminder::new("Third", "10:00"))
        .await
        .unwrap();

    assert!(second.id > first.id);
    assert!(third.id > second.id);
}

#[tokio::test]
async fn inserted_reminder_is_normalized() {
    let ctx = TestContext::new().await;

    let reminder = ctx
        .storage
        .insert(NewReminder::new("  Drink water  ", " 08:00 "))
        .await
        .unwrap();

    assert_eq!(reminder.text, "Drink water");
    assert_eq!(reminder.fire_at, "08:00");
    assert!(reminder.active);
    assert_eq!(reminder.last_fired_on, None);
    assert_eq!(ctx.storage.get(reminder.id).await, Some(reminder));
}

#[tokio::test]
async fn reopening_yields_identical_reminders() {
    let ctx = TestContext::new().await;
    let fired_on = NaiveDate::from_ymd_opt(2025, 5, 31).unwrap();

    let water = ctx
        .storage
        .insert(NewReminder::new("Drink water", "08:00"))
        .await
        .unwrap();
    ctx.storage
        .insert(NewReminder::new("Stretch", "10:30").inactive())
        .await
        .unwrap();
    ctx.storage
        .update(UpdateReminder::new(water.id).last_fired_on(Some(fired_on)))
        .await
        .unwrap();

    let reopened = ctx.reopen().await;

    assert_eq!(reopened.get_all().await, ctx.storage.get_all().await);
    assert_eq!(
        reopened.get(water.id).await.unwrap().last_fired_on,
        Some(fired_on)
    );
}

#[tokio::test]
async fn document_uses_the_persisted_field_names() {
    let ctx = TestContext::new().await;
    let reminder = ctx
        .storage
        .insert(NewReminder::new("Beber água", "07:45"))
        .await
        .unwrap();
    ctx.storage
        .update(
            UpdateReminder::new(reminder.id)
                .last_fired_on(Some(NaiveDate::from_ymd_opt(2025, 1, 2).unwrap())),
        )
        .await
        .unwrap();

    let raw = String::from_utf8(ctx.read_document_bytes()).unwrap();
    let document: serde_json::Value = serde_json::from_str(&raw).unwrap();

    assert!(raw.contains("Beber água"), "text should be stored as UTF-8");
    assert!(raw.contains("\n  "), "document should be indented");
    assert_eq!(
        document,
        serde_json::json!({
            "lembretes": [{
                "id": reminder.id,
                "texto": "Beber água",
                "horario": "07:45",
                "ativo": true,
                "ultimo_disparo_em": "2025-01-02"
            }]
        })
    );
}

#[tokio::test]
async fn document_with_missing_optional_fields_is_loaded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lembretes.json");
    std::fs::write(
        &path,
        r#"{"lembretes": [{"id": 7, "texto": "Old", "horario": "06:00"}]}"#,
    )
    .unwrap();

    let storage = JsonReminderStorage::open(&path).await;
    let reminder = storage.get(7).await.unwrap();

    assert!(reminder.active);
    assert_eq!(reminder.last_fired_on, None);
}

#[tokio::test]
async fn invalid_time_is_rejected_and_document_is_unchanged() {
    let ctx = TestContext::new().await;
    ctx.storage
        .insert(NewReminder::new("Existing", "12:00"))
        .await
        .unwrap();
    let before = ctx.read_document_bytes();

    let result = ctx.storage.insert(NewReminder::new("x", "25:99")).await;

    assert!(matches!(
        result,
        Err(StorageError::Validation(ValidationError::InvalidFireTime(_)))
    ));
    assert_eq!(ctx.read_document_bytes(), before);
    assert_eq!(ctx.storage.get_all().await.len(), 1);
}

#[tokio::test]
async fn blank_text_is_rejected() {
    let ctx = TestContext::new().await;

    let result = ctx.storage.insert(NewReminder::new("   ", "12:00")).await;

    assert!(matches!(
        result,
        Err(StorageError::Validation(ValidationError::EmptyText))
    ));
    assert!(ctx.storage.get_all().await.is_empty());
}

#[tokio::test]
async fn update_replaces_only_the_given_fields() {
    let ctx = TestContext::new().await;
    let fired_on = NaiveDate::from_ymd_opt(2025, 5, 31).unwrap();
    let reminder = ctx
        .storage
        .insert(NewReminder::new("Drink water", "08:00"))
        .await
        .unwrap();
    ctx.storage
        .update(UpdateReminder::new(reminder.id).last_fired_on(Some(fired_on)))
        .await
        .unwrap();

    let updated = ctx
        .storage
        .update(UpdateReminder::new(reminder.id).text(" Drink tea ").fire_at("09:15"))
        .await
        .unwrap();

    assert_eq!(updated.text, "Drink tea");
    assert_eq!(updated.fire_at, "09:15");
    assert!(updated.active);
    assert_eq!(updated.last_fired_on, Some(fired_on));
    assert_eq!(ctx.reopen().await.get(reminder.id).await, Some(updated));
}

#[tokio::test]
async fn invalid_update_leaves_reminder_unchanged() {
    let ctx = TestContext::new().await;
    let reminder = ctx
        .storage
        .insert(NewReminder::new("Drink water", "08:00"))
        .await
        .unwrap();

    let result = ctx
        .storage
        .update(UpdateReminder::new(reminder.id).text("Changed").fire_at("8h"))
        .await;

    assert!(matches!(result, Err(StorageError::Validation(_))));
    assert_eq!(ctx.storage.get(reminder.id).await, Some(reminder));
}

#[tokio::test]
async fn updating_unknown_reminder_fails_with_not_found() {
    let ctx = TestContext::new().await;

    let result = ctx
        .storage
        .update(UpdateReminder::new(42).active(false))
        .await;

    assert!(matches!(result, Err(StorageError::NotFound(42))));
}

#[tokio::test]
async fn toggling_keeps_the_fired_date() {
    let ctx = TestContext::new().await;
    let fired_on = NaiveDate::from_ymd_opt(2025, 5, 31).unwrap();
    let reminder = ctx
        .storage
        .insert(NewReminder::new("Drink water", "08:00"))
        .await
        .unwrap();
    ctx.storage
        .update(UpdateReminder::new(reminder.id).last_fired_on(Some(fired_on)))
        .await
        .unwrap();

    let toggled = ctx.storage.toggle_active(reminder.id).await.unwrap();
    assert!(!toggled.active);
    assert_eq!(toggled.last_fired_on, Some(fired_on));

    let toggled = ctx.storage.toggle_active(reminder.id).await.unwrap();
    assert!(toggled.active);
    assert!(matches!(
        ctx.storage.toggle_active(reminder.id + 1).await,
        Err(StorageError::NotFound(_))
    ));
}

#[tokio::test]
async fn removing_deletes_and_ignores_unknown_ids() {
    let ctx = TestContext::new().await;
    let keep = ctx
        .storage
        .insert(NewReminder::new("Keep", "08:00"))
        .await
        .unwrap();
    let dropped = ctx
        .storage
        .insert(NewReminder::new("Drop", "09:00"))
        .await
        .unwrap();

    ctx.storage.remove(dropped.id).await.unwrap();
    ctx.storage.remove(dropped.id).await.unwrap();
    ctx.storage.remove(12345).await.unwrap();

    assert_eq!(ctx.storage.get_all().await, vec![keep.clone()]);
    assert_eq!(ctx.reopen().await.get_all().await, vec![keep]);
}

#[tokio::test]
async fn listing_keeps_insertion_order() {
    let ctx = TestContext::new().await;
    for (text, fire_at) in [("c", "23:00"), ("a", "01:00"), ("b", "12:00")] {
        ctx.storage
            .insert(NewReminder::new(text, fire_at))
            .await
            .unwrap();
    }

    let texts: Vec<_> = ctx
        .storage
        .get_all()
        .await
        .into_iter()
        .map(|reminder| reminder.text)
        .collect();

    assert_eq!(texts, vec!["c", "a", "b"]);
}

#[tokio::test]
async fn export_writes_a_copy_and_leaves_primary_alone() {
    let ctx = TestContext::new().await;
    ctx.storage
        .insert(NewReminder::new("Drink water", "08:00"))
        .await
        .unwrap();
    let primary_before = ctx.read_document_bytes();
    let export_path = ctx.dir.path().join("exports").join("backup.json");

    ctx.storage.export(&export_path).await.unwrap();

    assert_eq!(std::fs::read(&export_path).unwrap(), primary_before);
    assert_eq!(ctx.read_document_bytes(), primary_before);
    assert_eq!(ctx.storage.path(), ctx.document_path().as_path());

    let exported = JsonReminderStorage::open(&export_path).await;
    assert_eq!(exported.get_all().await, ctx.storage.get_all().await);
}

#[tokio::test]
async fn failed_save_keeps_previous_state() {
    let dir = tempfile::tempdir().unwrap();
    let parent = dir.path().join("data");
    let storage = JsonReminderStorage::open(parent.join("lembretes.json")).await;
    let existing = storage
        .insert(NewReminder::new("Existing", "08:00"))
        .await
        .unwrap();

    std::fs::remove_dir_all(&parent).unwrap();
    std::fs::write(&parent, "not a directory").unwrap();

    let result = storage.insert(NewReminder::new("Lost", "09:00")).await;
    assert!(matches!(result, Err(StorageError::Persistence(_))));

    let result = storage
        .update(UpdateReminder::new(existing.id).text("Changed"))
        .await;
    assert!(matches!(result, Err(StorageError::Persistence(_))));

    assert_eq!(storage.get_all().await, vec![existing]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_inserts_are_all_persisted() {
    let ctx = TestContext::new().await;
    let storage = Arc::new(ctx.reopen().await);

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let storage = Arc::clone(&storage);
            tokio::spawn(async move {
                storage
                    .insert(NewReminder::new(format!("Reminder {i}"), "10:00"))
                    .await
                    .unwrap()
                    .id
            })
        })
        .collect();

    let mut ids = HashSet::new();
    for handle in handles {
        ids.insert(handle.await.unwrap());
    }

    assert_eq!(ids.len(), 20);
    assert_eq!(ctx.reopen().await.get_all().await.len(), 20);
}

#[tokio::test]
async fn timed_out_saves_never_reach_the_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lembretes.json");
    std::fs::write(&path, r#"{"lembretes": []}"#).unwrap();
    let storage = JsonReminderStorage::open_with_timeout(&path, Duration::ZERO).await;
    let text = "x".repeat(2048);

    let mut timed_out = 0;
    for _ in 0..50 {
        match storage.insert(NewReminder::new(text.as_str(), "07:30")).await {
            Ok(_) => {}
            Err(StorageError::Persistence(PersistenceError::Timeout { .. })) => timed_out += 1,
            Err(err) => panic!("unexpected error: {err}"),
        }

        let on_disk = JsonReminderStorage::open(&path).await.get_all().await;
        assert_eq!(on_disk, storage.get_all().await);
    }

    assert!(timed_out > 0);
}

#[tokio::test]
async fn exhausted_ids_fail_the_insert_instead_of_wrapping() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lembretes.json");
    std::fs::write(
        &path,
        r#"{"lembretes": [{"id": 9223372036854775807, "texto": "Last", "horario": "06:00"}]}"#,
    )
    .unwrap();
    let storage = JsonReminderStorage::open(&path).await;
    let before = std::fs::read(&path).unwrap();

    let result = storage.insert(NewReminder::new("One more", "07:00")).await;

    assert!(matches!(result, Err(StorageError::IdsExhausted(ReminderId::MAX))));
    assert_eq!(storage.get_all().await.len(), 1);
    assert_eq!(std::fs::read(&path).unwrap(), before);
}
