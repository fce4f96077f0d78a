mod common;
use common::{fields, setup_store, FlakyStore, GatedStore};
use kurs_core::controller::{UNKNOWN_LABEL, UNRESOLVED};
use kurs_core::form::NO_SELECTION;
use kurs_core::{Catalog, EntityKind, FieldValue, RecordStore, SubmitOutcome};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use url::Url;

fn counter() -> (Arc<AtomicUsize>, impl Fn(&str) + Send + Sync + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let inner = Arc::clone(&count);
    (count, move |_: &str| {
        inner.fetch_add(1, Ordering::SeqCst);
    })
}

#[tokio::test]
async fn test_controller_resolves_references_for_display() -> anyhow::Result<()> {
    let store = Arc::new(setup_store()?);
    let ada = store
        .create("teilnehmer", fields(json!({"name": "Ada"})))
        .await?;
    store
        .create(
            "anmeldungen",
            fields(json!({"teilnehmer": format!("teilnehmer/{}", ada.record_id)})),
        )
        .await?;
    store
        .create(
            "anmeldungen",
            fields(json!({"teilnehmer": "teilnehmer/abc123"})),
        )
        .await?;
    store
        .create("anmeldungen", fields(json!({"bezahlt": true})))
        .await?;

    let controller = Catalog::default().controller(EntityKind::Anmeldungen, store.clone());
    assert!(controller.is_loading());
    controller.load().await;
    assert!(!controller.is_loading());

    let mut labels: Vec<String> = controller
        .records()
        .iter()
        .map(|r| controller.display_reference(r, "teilnehmer"))
        .collect();
    labels.sort();
    assert_eq!(labels, vec![UNRESOLVED, UNRESOLVED, "Ada"]);

    assert_eq!(
        controller.resolve_reference("teilnehmer", Some(&json!("not-a-reference"))),
        UNRESOLVED
    );
    assert_eq!(controller.resolve_reference("bezahlt", None), UNRESOLVED);
    Ok(())
}

#[tokio::test]
async fn test_controller_create_encodes_references() -> anyhow::Result<()> {
    let store = Arc::new(setup_store()?);
    let ada = store
        .create("teilnehmer", fields(json!({"name": "Ada"})))
        .await?;
    let kurs = store
        .create("kurse", fields(json!({"titel": "Rust", "preis": 299})))
        .await?;

    let (changes, listener) = counter();
    let controller = Catalog::default()
        .controller(EntityKind::Anmeldungen, store.clone())
        .on_data_change(listener);
    controller.load().await;

    let schema = controller.schema();
    let options = schema.get("teilnehmer").unwrap().options.clone().unwrap();
    assert_eq!(options.len(), 1);
    assert_eq!(options[0].value, ada.record_id);
    assert_eq!(options[0].label, "Ada");

    controller.open_create();
    let form = controller.form();
    assert!(form.is_open());
    form.edit("teilnehmer", ada.record_id.as_str());
    form.edit("kurs", kurs.record_id.as_str());
    form.edit("bezahlt", true);

    assert_eq!(controller.save().await?, SubmitOutcome::Completed);
    assert!(!form.is_open());
    assert_eq!(changes.load(Ordering::SeqCst), 1);

    let records = controller.records();
    assert_eq!(records.len(), 1);
    let stored = &records[0];
    assert_eq!(
        stored.text("teilnehmer"),
        format!("teilnehmer/{}", ada.record_id)
    );
    assert_eq!(stored.text("kurs"), format!("kurse/{}", kurs.record_id));
    assert!(stored.flag("bezahlt"));
    assert_eq!(controller.display_reference(stored, "kurs"), "Rust");
    Ok(())
}

#[tokio::test]
async fn test_controller_edit_decodes_and_clears_reference() -> anyhow::Result<()> {
    let store = Arc::new(setup_store()?);
    let dozent = store
        .create("dozenten", fields(json!({"name": "Grace"})))
        .await?;
    let raum = store
        .create(
            "raeume",
            fields(json!({"raumname": "Seminarraum 1", "gebaeude": "Hauptgebäude"})),
        )
        .await?;
    let kurs = store
        .create(
            "kurse",
            fields(json!({
                "titel": "Rust",
                "dozent": format!("dozenten/{}", dozent.record_id),
                "raum": format!("raeume/{}", raum.record_id),
                "max_teilnehmer": 20
            })),
        )
        .await?;

    let controller = Catalog::default().controller(EntityKind::Kurse, store.clone());
    controller.load().await;
    assert_eq!(
        controller.display_reference(&controller.records()[0], "raum"),
        "Seminarraum 1 (Hauptgebäude)"
    );

    let initial = controller.initial_data(&controller.records()[0]);
    assert_eq!(initial["dozent"], FieldValue::Text(dozent.record_id.clone()));
    assert_eq!(initial["raum"], FieldValue::Text(raum.record_id.clone()));

    controller.open_edit(&kurs.record_id)?;
    let form = controller.form();
    assert_eq!(form.value("raum"), Some(FieldValue::Text(raum.record_id.clone())));
    assert_eq!(form.value("max_teilnehmer"), Some(FieldValue::Number(20.0)));
    form.edit("raum", NO_SELECTION);
    assert_eq!(controller.save().await?, SubmitOutcome::Completed);

    let stored = controller.record(&kurs.record_id).unwrap();
    assert_eq!(stored.get("raum"), Some(&Value::Null));
    assert_eq!(
        stored.text("dozent"),
        format!("dozenten/{}", dozent.record_id)
    );
    assert_eq!(stored.text("titel"), "Rust");
    assert_eq!(controller.display_reference(&stored, "raum"), UNRESOLVED);
    assert!(controller.selected().is_none());
    Ok(())
}

#[tokio::test]
async fn test_controller_encode_references_null_cases() -> anyhow::Result<()> {
    let store = Arc::new(setup_store()?);
    let controller = Catalog::default().controller(EntityKind::Kurse, store);

    let mut draft = kurs_core::FieldMap::new();
    draft.insert("titel".to_string(), "Rust".into());
    draft.insert("dozent".to_string(), FieldValue::empty());
    draft.insert("raum".to_string(), NO_SELECTION.into());
    let encoded = controller.encode_references(&draft)?;

    assert_eq!(encoded["titel"], json!("Rust"));
    assert_eq!(encoded["dozent"], Value::Null);
    assert_eq!(encoded["raum"], Value::Null);
    Ok(())
}

#[tokio::test]
async fn test_controller_schema_unknown_label() -> anyhow::Result<()> {
    let store = Arc::new(setup_store()?);
    store.create("dozenten", fields(json!({}))).await?;

    let controller = Catalog::default().controller(EntityKind::Kurse, store);
    controller.load().await;
    let schema = controller.schema();
    let options = schema.get("dozent").unwrap().options.clone().unwrap();
    assert_eq!(options[0].label, UNKNOWN_LABEL);
    assert_eq!(schema.get("raum").unwrap().options, Some(Vec::new()));
    Ok(())
}

#[tokio::test]
async fn test_controller_load_failure_keeps_state() -> anyhow::Result<()> {
    let store = FlakyStore::new(setup_store()?);
    store
        .create("raeume", fields(json!({"raumname": "A"})))
        .await?;

    let controller = Catalog::default().controller(EntityKind::Raeume, store.clone());
    controller.load().await;
    assert_eq!(controller.len(), 1);

    store.set_failing(true);
    controller.load().await;
    assert_eq!(controller.len(), 1);
    assert!(controller.try_load().await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_controller_initial_load_failure_finishes_loading() -> anyhow::Result<()> {
    let store = FlakyStore::new(setup_store()?);
    store.set_failing(true);
    let controller = Catalog::default().controller(EntityKind::Dozenten, store);
    controller.load().await;
    assert!(!controller.is_loading());
    assert!(controller.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_controller_save_failure_keeps_dialog_open() -> anyhow::Result<()> {
    let store = FlakyStore::new(setup_store()?);
    let (changes, listener) = counter();
    let controller = Catalog::default()
        .controller(EntityKind::Dozenten, store.clone())
        .on_data_change(listener);
    controller.load().await;

    controller.open_create();
    controller.form().edit("name", "Grace");
    store.set_failing(true);
    assert!(controller.save().await.is_err());
    assert!(controller.form().is_open());
    assert!(!controller.form().is_saving());
    assert_eq!(changes.load(Ordering::SeqCst), 0);

    store.set_failing(false);
    assert_eq!(controller.save().await?, SubmitOutcome::Completed);
    assert_eq!(controller.len(), 1);
    assert_eq!(controller.records()[0].text("name"), "Grace");
    assert_eq!(changes.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_controller_open_edit_unknown_record() -> anyhow::Result<()> {
    let store = Arc::new(setup_store()?);
    let controller = Catalog::default().controller(EntityKind::Teilnehmer, store);
    controller.load().await;
    assert!(controller.open_edit("missing").is_err());
    assert!(!controller.form().is_open());
    Ok(())
}

#[tokio::test]
async fn test_controller_toggle_flag_partial_update() -> anyhow::Result<()> {
    let store = FlakyStore::new(setup_store()?);
    let created = store
        .create(
            "anmeldungen",
            fields(json!({"kurs": "kurse/k1", "bezahlt": false})),
        )
        .await?;
    let (changes, listener) = counter();
    let controller = Catalog::default()
        .controller(EntityKind::Anmeldungen, store.clone())
        .on_data_change(listener);
    controller.load().await;

    controller.toggle_flag(&created.record_id, "bezahlt").await;
    let toggled = controller.record(&created.record_id).unwrap();
    assert!(toggled.flag("bezahlt"));
    assert_eq!(toggled.text("kurs"), "kurse/k1");
    assert_eq!(changes.load(Ordering::SeqCst), 1);

    store.set_failing(true);
    controller.toggle_flag(&created.record_id, "bezahlt").await;
    assert!(controller.record(&created.record_id).unwrap().flag("bezahlt"));
    assert_eq!(changes.load(Ordering::SeqCst), 1);
    assert_eq!(store.updates.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_controller_referencing_count() -> anyhow::Result<()> {
    let store = Arc::new(setup_store()?);
    let rust = store.create("kurse", fields(json!({"titel": "Rust"}))).await?;
    let go = store.create("kurse", fields(json!({"titel": "Go"}))).await?;
    for _ in 0..3 {
        store
            .create(
                "anmeldungen",
                fields(json!({"kurs": format!("kurse/{}", rust.record_id)})),
            )
            .await?;
    }
    store
        .create("anmeldungen", fields(json!({"kurs": null})))
        .await?;

    let controller = Catalog::default().controller(EntityKind::Kurse, store);
    controller.load().await;
    assert_eq!(
        controller.referencing_count("anmeldungen", "kurs", &rust.record_id),
        3
    );
    assert_eq!(
        controller.referencing_count("anmeldungen", "kurs", &go.record_id),
        0
    );
    assert_eq!(controller.companion_records("anmeldungen").len(), 4);
    Ok(())
}

#[tokio::test]
async fn test_controller_delete_confirmation() -> anyhow::Result<()> {
    let store = FlakyStore::new(setup_store()?);
    let created = store
        .create("teilnehmer", fields(json!({"name": "Ada"})))
        .await?;
    let (changes, listener) = counter();
    let controller = Catalog::default()
        .controller(EntityKind::Teilnehmer, store.clone())
        .on_data_change(listener);
    controller.load().await;

    assert_eq!(controller.confirm_delete().await?, SubmitOutcome::Suppressed);

    controller.request_delete(&created.record_id);
    store.set_failing(true);
    assert!(controller.confirm_delete().await.is_err());
    assert_eq!(controller.pending_delete(), Some(created.record_id.clone()));
    assert!(!controller.is_deleting());
    assert_eq!(controller.len(), 1);

    store.set_failing(false);
    assert_eq!(controller.confirm_delete().await?, SubmitOutcome::Completed);
    assert!(controller.pending_delete().is_none());
    assert!(controller.is_empty());
    assert_eq!(changes.load(Ordering::SeqCst), 1);

    controller.request_delete("other");
    controller.cancel_delete();
    assert!(controller.pending_delete().is_none());
    Ok(())
}

#[tokio::test]
async fn test_controller_record_url_references() -> anyhow::Result<()> {
    let store = Arc::new(setup_store()?);
    let dozent = store
        .create("dozenten", fields(json!({"name": "Grace"})))
        .await?;
    let base = Url::parse("https://records.example.org/rest/")?;
    let controller = Catalog::default()
        .with_record_base(Some(base))
        .controller(EntityKind::Kurse, store);
    controller.load().await;

    controller.open_create();
    controller.form().edit("titel", "Compilers");
    controller.form().edit("dozent", dozent.record_id.as_str());
    controller.save().await?;

    let records = controller.records();
    let stored = &records[0];
    assert_eq!(
        stored.text("dozent"),
        format!(
            "https://records.example.org/rest/apps/dozenten/records/{}",
            dozent.record_id
        )
    );
    assert_eq!(controller.display_reference(stored, "dozent"), "Grace");
    assert_eq!(stored.get("raum"), Some(&Value::Null));
    Ok(())
}

#[tokio::test]
async fn test_controller_reopen_during_save_keeps_selection() -> anyhow::Result<()> {
    let store = GatedStore::new(setup_store()?);
    let a = store.create("teilnehmer", fields(json!({"name": "A"}))).await?;
    let b = store.create("teilnehmer", fields(json!({"name": "B"}))).await?;
    let controller = Catalog::default().controller(EntityKind::Teilnehmer, store.clone());
    controller.load().await;

    controller.open_edit(&a.record_id)?;
    controller.form().edit("name", "A renamed");
    store.arm();

    let pending = controller.save();
    let interrupt = async {
        tokio::task::yield_now().await;
        controller.form().cancel();
        let reopened = controller.open_edit(&b.record_id);
        store.release();
        reopened
    };
    let (outcome, reopened) = tokio::join!(pending, interrupt);
    reopened?;
    assert_eq!(outcome?, SubmitOutcome::Completed);

    assert!(controller.form().is_open());
    assert_eq!(controller.selected(), Some(b.record_id.clone()));

    controller.form().edit("name", "B renamed");
    assert_eq!(controller.save().await?, SubmitOutcome::Completed);
    assert!(controller.selected().is_none());

    let mut names: Vec<String> = controller
        .records()
        .iter()
        .map(|r| r.text("name").to_string())
        .collect();
    names.sort();
    assert_eq!(names, vec!["A renamed", "B renamed"]);
    Ok(())
}
