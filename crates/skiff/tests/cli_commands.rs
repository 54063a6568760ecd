// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Admin commands against a real database.

use skiff::commands::cron::AddArgs;
use skiff::commands::{CronCommand, SessionCommand, open_storage};
use skiff_config::SkiffConfig;
use skiff_core::{SessionKey, SessionRecord};

fn config(dir: &tempfile::TempDir) -> SkiffConfig {
    let mut config = SkiffConfig::default();
    config.storage.database_path = dir.path().join("skiff.db").display().to_string();
    config
}

fn daily(name: &str) -> AddArgs {
    AddArgs {
        name: name.to_string(),
        message: "good morning".to_string(),
        every: None,
        cron: Some("0 9 * * *".to_string()),
        tz: Some("Europe/Moscow".to_string()),
        at: None,
        deliver: true,
        channel: Some("telegram".to_string()),
        to: Some("42".to_string()),
        keep: false,
    }
}

fn job_id(added: &str) -> String {
    added
        .strip_prefix("Added job ")
        .and_then(|rest| rest.split_whitespace().next())
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn cron_job_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir);
    let storage = open_storage(&config).await.unwrap();
    let run = |cmd: CronCommand| {
        let config = config.clone();
        let storage = storage.clone();
        async move { cmd.run(&config, storage).await }
    };

    let added = run(CronCommand::Add(daily("morning"))).await.unwrap();
    let id = job_id(&added);
    assert!(added.contains("Europe/Moscow"));

    let listed = run(CronCommand::List { all: false }).await.unwrap();
    assert!(listed.contains("morning"));
    assert!(listed.contains("enabled"));

    run(CronCommand::Disable { id: id.clone() }).await.unwrap();
    assert_eq!(
        run(CronCommand::List { all: false }).await.unwrap(),
        "No scheduled jobs.\n"
    );
    assert!(
        run(CronCommand::List { all: true })
            .await
            .unwrap()
            .contains("disabled")
    );

    let enabled = run(CronCommand::Enable { id: id.clone() }).await.unwrap();
    assert!(enabled.contains("next run 20"));

    let triggered = run(CronCommand::Run { id: id.clone() }).await.unwrap();
    assert!(triggered.contains("due now"));

    run(CronCommand::Remove { id: id.clone() }).await.unwrap();
    assert!(run(CronCommand::Remove { id }).await.is_err());
}

#[tokio::test]
async fn invalid_schedule_is_rejected_and_not_stored() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir);
    let storage = open_storage(&config).await.unwrap();

    let mut args = daily("broken");
    args.tz = Some("Atlantis/Capital".to_string());
    assert!(CronCommand::Add(args).run(&config, storage.clone()).await.is_err());

    let mut args = daily("past");
    args.cron = None;
    args.tz = None;
    args.at = Some("2001-01-01T00:00:00Z".to_string());
    assert!(CronCommand::Add(args).run(&config, storage.clone()).await.is_err());

    let listed = CronCommand::List { all: true }
        .run(&config, storage)
        .await
        .unwrap();
    assert_eq!(listed, "No scheduled jobs.\n");
}

#[tokio::test]
async fn session_inspection_and_reset() {
    let dir = tempfile::tempdir().unwrap();
    let storage = open_storage(&config(&dir)).await.unwrap();
    let key = SessionKey::new("telegram", "42");
    storage
        .append_record(&key, &SessionRecord::user("what's the weather"))
        .await
        .unwrap();
    storage
        .append_record(&key, &SessionRecord::assistant("sunny", Vec::new()))
        .await
        .unwrap();

    let list = SessionCommand::List.run(storage.clone()).await.unwrap();
    assert!(list.contains("telegram:42"));
    assert!(list.contains("1 user messages"));

    let shown = SessionCommand::Show {
        key: "telegram:42".into(),
        limit: Some(1),
    }
    .run(storage.clone())
    .await
    .unwrap();
    assert!(shown.contains("assistant: sunny"));
    assert!(!shown.contains("weather"));

    SessionCommand::ResetCount {
        key: "telegram:42".into(),
    }
    .run(storage.clone())
    .await
    .unwrap();
    assert_eq!(storage.user_message_count(&key).await.unwrap(), 0);
    assert_eq!(storage.load_records(&key).await.unwrap().len(), 2);
}
