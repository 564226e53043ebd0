mod common;

use std::sync::Arc;
use std::time::Duration;

use notebook_shadow::config::RetryPolicy;
use notebook_shadow::models::ExistingVariants;
use notebook_shadow::orchestrator::{
    AbortSignal, BatchProgress, BatchTaskExecutor, JobState, UnitState,
};
use notebook_shadow::ShadowError;

use common::{ids, FakeHost, FakeSource};

fn retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 5,
        retry_delay: Duration::from_secs(1),
    }
}

fn executor(source: Arc<FakeSource>, host: Arc<FakeHost>) -> BatchTaskExecutor {
    BatchTaskExecutor::new(source, host, retry())
}

#[tokio::test(start_paused = true)]
async fn test_existing_variant_is_skipped_but_counted() {
    let source = Arc::new(FakeSource::new());
    let host = Arc::new(FakeHost::new());
    let exec = executor(source.clone(), host.clone());

    let mut existing = ExistingVariants::new();
    existing.insert("2", "cn");

    let outcome = exec
        .run_batch(&ids(&["1", "2", "3"]), &ids(&["en", "cn"]), &existing)
        .await
        .unwrap();

    assert_eq!(outcome.progress, BatchProgress { current: 6, total: 6 });
    assert!(!outcome.aborted);
    assert_eq!(outcome.succeeded(), 5);
    assert_eq!(outcome.skipped(), 1);
    assert_eq!(source.calls(), 5);
    assert!(!source.prompts().contains(&"2|cn".to_string()));
    assert_eq!(
        source.prompts(),
        ids(&["1|en", "1|cn", "2|en", "3|en", "3|cn"])
    );
    assert_eq!(host.stored().len(), 5);
    assert_eq!(host.refreshes(), 1);
    assert_eq!(host.clears(), 1);
    assert!(outcome.jobs.iter().all(|j| j.state == JobState::Succeeded));
    assert!(exec
        .reporter()
        .logs()
        .contains(&"✅ Batch translation flow completed.".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_fully_existing_item_is_marked_skipped() {
    let source = Arc::new(FakeSource::new());
    let host = Arc::new(FakeHost::new());
    let exec = executor(source.clone(), host);

    let existing = ExistingVariants::from_items(&[notebook_shadow::WorkItem {
        id: "1".to_string(),
        subject: String::new(),
        description: None,
        conversations: vec![],
        reply_to: None,
        available_langs: ids(&["en", "cn"]),
    }]);

    let outcome = exec
        .run_batch(&ids(&["1"]), &ids(&["en", "cn"]), &existing)
        .await
        .unwrap();

    assert_eq!(outcome.progress.current, 2);
    assert_eq!(source.calls(), 0);
    assert_eq!(outcome.jobs[0].state, JobState::Skipped);
}

#[tokio::test(start_paused = true)]
async fn test_retry_then_succeed() {
    let source = Arc::new(FakeSource::new().failing("1", 2));
    let host = Arc::new(FakeHost::new());
    let exec = executor(source.clone(), host.clone());

    let started = tokio::time::Instant::now();
    let outcome = exec
        .run_batch(&ids(&["1"]), &ids(&["en"]), &ExistingVariants::new())
        .await
        .unwrap();

    assert!(!outcome.aborted);
    assert_eq!(outcome.units[0].attempts, 3);
    assert_eq!(outcome.units[0].state, UnitState::Succeeded);
    assert_eq!(outcome.jobs[0].retry_count, 2);
    // 两次失败之间各等 1 秒，第一次尝试前不等待
    assert!(started.elapsed() >= Duration::from_secs(2));
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(host.stored(), vec![("1".to_string(), "en".to_string())]);
}

#[tokio::test(start_paused = true)]
async fn test_five_failures_abort_whole_batch() {
    let source = Arc::new(FakeSource::new().failing("2", u32::MAX));
    let host = Arc::new(FakeHost::new());
    let exec = executor(source.clone(), host.clone());

    let outcome = exec
        .run_batch(&ids(&["1", "2", "3"]), &ids(&["en", "cn"]), &ExistingVariants::new())
        .await
        .unwrap();

    assert!(outcome.aborted);
    assert!(exec.abort_signal().is_set());
    // item 1 两个单元 + item 2 的 en 尝试 5 次
    assert_eq!(source.calls(), 7);
    assert!(source.prompts().iter().all(|p| !p.starts_with("3|")));
    assert_eq!(outcome.progress, BatchProgress { current: 3, total: 6 });
    assert_eq!(outcome.failed(), 1);
    assert_eq!(outcome.jobs[1].state, JobState::Failed);
    assert_eq!(outcome.jobs[2].state, JobState::Pending);

    // 收尾照常执行
    assert_eq!(host.refreshes(), 1);
    assert_eq!(host.clears(), 1);
    let logs = exec.reporter().logs();
    assert!(logs.contains(&"❌ [Batch] Ticket #2 failed after 5 retries. Aborting.".to_string()));
    assert_eq!(logs.last().map(String::as_str), Some("🛑 Batch translation stopped."));
}

#[tokio::test(start_paused = true)]
async fn test_external_abort_halts_before_next_unit() {
    let abort = AbortSignal::new();
    let source = Arc::new(FakeSource {
        abort_after: Some((3, abort.clone())),
        ..FakeSource::new()
    });
    let host = Arc::new(FakeHost::new());
    let exec = executor(source.clone(), host.clone()).with_abort_signal(abort.clone());

    let outcome = exec
        .run_batch(&ids(&["1", "2", "3"]), &ids(&["en", "cn"]), &ExistingVariants::new())
        .await
        .unwrap();

    // 进行中的第 3 个单元不被打断，之后不再开始新单元
    assert_eq!(source.calls(), 3);
    assert_eq!(host.stored().len(), 3);
    assert!(outcome.aborted);
    assert_eq!(outcome.progress.current, 3);
    assert_eq!(host.refreshes(), 1);
    assert_eq!(host.clears(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_abort_is_reset_at_batch_start() {
    let source = Arc::new(FakeSource::new());
    let host = Arc::new(FakeHost::new());
    let exec = executor(source.clone(), host);

    exec.abort_signal().set();
    let outcome = exec
        .run_batch(&ids(&["1"]), &ids(&["en"]), &ExistingVariants::new())
        .await
        .unwrap();

    assert!(!outcome.aborted);
    assert_eq!(source.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_batch_is_refused() {
    let source = Arc::new(FakeSource {
        delay: Some(Duration::from_secs(1)),
        ..FakeSource::new()
    });
    let host = Arc::new(FakeHost::new());
    let exec = executor(source.clone(), host.clone());

    let items = ids(&["1"]);
    let langs = ids(&["en"]);
    let existing = ExistingVariants::new();
    let (first, second) = tokio::join!(
        exec.run_batch(&items, &langs, &existing),
        exec.run_batch(&items, &langs, &existing)
    );

    assert!(first.is_ok());
    assert!(matches!(second, Err(ShadowError::Busy)));
    assert_eq!(source.calls(), 1);
    assert_eq!(host.refreshes(), 1);
    assert!(!exec.is_busy());
}

#[tokio::test(start_paused = true)]
async fn test_interrupt_at_start_is_not_cleared_by_reset() {
    let source = Arc::new(FakeSource {
        delay: Some(Duration::from_secs(1)),
        ..FakeSource::new()
    });
    let host = Arc::new(FakeHost::new());
    let exec = executor(source.clone(), host.clone());

    // 中断在批次开始时立即到达
    let outcome = exec
        .run_batch_until(
            &ids(&["1", "2"]),
            &ids(&["en", "cn"]),
            &ExistingVariants::new(),
            std::future::ready(()),
        )
        .await
        .unwrap();

    assert!(outcome.aborted);
    assert_eq!(source.calls(), 1);
    assert_eq!(host.stored().len(), 1);
    assert_eq!(outcome.progress, BatchProgress { current: 1, total: 4 });
    assert_eq!(host.refreshes(), 1);
    assert!(exec.abort_signal().is_set());
}
