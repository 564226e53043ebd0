use std::fs;

use notebook_shadow::models::{load_all_job_files, load_job_file, load_jobs};
use notebook_shadow::services::{AnswerStore, BilingualAnswer};

const JOB_A: &str = r#"
notebook_id = "nb-a"
target_langs = ["en", "ja"]

[[items]]
id = "100"
subject = "Refund"
descriptionText = "Order arrived broken"
available_langs = ["en"]
replyTo = 1

[[items.conversations]]
id = 1
incoming = true
bodyText = "Please refund"
"#;

const JOB_B: &str = r#"
notebook_id = "nb-b"
prompt_template = "Answer: ${工单内容}"

[[items]]
id = "200"
subject = "Shipping"
"#;

#[test]
fn test_load_single_job_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.toml");
    fs::write(&path, JOB_A).unwrap();

    let job = tokio_test::block_on(load_job_file(&path)).unwrap();

    assert_eq!(job.notebook_id.as_deref(), Some("nb-a"));
    assert_eq!(job.items.len(), 1);
    assert_eq!(job.items[0].reply_to, Some(1));
    let item = &job.items[0];
    assert_eq!(item.description.as_deref(), Some("Order arrived broken"));
    assert_eq!(item.conversations[0].body_text, "Please refund");
    assert!(item.conversations[0].incoming);
    assert_eq!(item.available_langs, vec!["en".to_string()]);
}

#[test]
fn test_load_folder_merges_in_name_order() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("b.toml"), JOB_B).unwrap();
    fs::write(dir.path().join("a.toml"), JOB_A).unwrap();
    fs::write(dir.path().join("broken.toml"), "items = 3").unwrap();
    fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let folder = dir.path().to_string_lossy().to_string();
    let job = tokio_test::block_on(load_all_job_files(&folder)).unwrap();

    // 覆盖项以第一个设置了它的文件为准
    assert_eq!(job.notebook_id.as_deref(), Some("nb-a"));
    assert_eq!(job.target_langs, Some(vec!["en".to_string(), "ja".to_string()]));
    assert_eq!(job.prompt_template.as_deref(), Some("Answer: ${工单内容}"));
    assert_eq!(job.item_ids(), vec!["100".to_string(), "200".to_string()]);

    let same = tokio_test::block_on(load_jobs(&folder)).unwrap();
    assert_eq!(same.item_ids(), job.item_ids());
}

#[test]
fn test_load_missing_folder_fails() {
    let result = tokio_test::block_on(load_all_job_files("/definitely/not/here"));
    assert!(result.is_err());
}

#[tokio::test]
async fn test_answer_store_write_and_read() {
    let dir = tempfile::tempdir().unwrap();
    let store = AnswerStore::new(dir.path().join("replies"));
    let answer = BilingualAnswer {
        target_text: "Hello\nthere".to_string(),
        reference_text: "你好".to_string(),
        parsed: true,
    };

    assert!(!store.exists("100", "en"));
    let path = store.write("100", "en", &answer).await.unwrap();

    assert!(path.ends_with("100_en.toml"));
    assert!(store.exists("100", "en"));
    assert!(!store.exists("100", "ja"));

    let record = store.read("100", "en").await.unwrap().unwrap();
    assert_eq!(record.target_text, "Hello\nthere");
    assert_eq!(record.reference_text, "你好");
    assert!(record.parsed);
    assert!(store.read("100", "ja").await.unwrap().is_none());
}
