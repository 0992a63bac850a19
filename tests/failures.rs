mod common;

use std::{fs, time::Duration};

use event_indexer::{
    IndexerError, ScannerState, artifact_paths, assert_event_count, assert_progress,
    load_event_set,
};

use crate::common::{raw_artifact_records, read_checkpoint, setup};

#[tokio::test]
async fn failed_window_is_retried_without_losing_progress() -> anyhow::Result<()> {
    let setup = setup(250, [110, 160, 210, 250]);
    setup.source.fail_next_get_logs(3);

    let handle = setup.builder().build(setup.source.clone())?.start();
    handle.wait_until(|p| p.is_caught_up()).await;
    handle.stop().await?;

    assert_eq!(
        setup.source.requested_windows(),
        vec![100..=149, 100..=149, 100..=149, 100..=149, 150..=199, 200..=249, 250..=250]
    );
    assert_event_count!(setup.output_dir(), 4);
    assert_eq!(raw_artifact_records(setup.output_dir()).len(), 4);

    Ok(())
}

#[tokio::test]
async fn mid_backfill_failure_resumes_at_the_failed_window() -> anyhow::Result<()> {
    let setup = setup(250, [110, 160, 210, 250]);
    let handle = setup.builder().build(setup.source.clone())?.start();
    handle.wait_until(|p| p.is_caught_up()).await;
    handle.stop().await?;

    // second pass over fresh blocks, failing once the scanner is mid-way
    setup.source.set_latest(400);
    setup.source.add_logs_at([300, 399]);
    setup.source.fail_next_get_logs(usize::MAX);
    let windows_before = setup.source.requested_windows().len();

    let handle = setup
        .builder()
        .retry_backoff(Duration::from_millis(20))
        .build(setup.source.clone())?
        .start();
    let mut progress = handle.progress_stream();
    let backoff = assert_progress!(progress, p if p.state == ScannerState::ErrorBackoff);
    assert_eq!(backoff.next_block, 251);

    setup.source.fail_next_get_logs(0);
    let progress = handle.wait_until(|p| p.is_caught_up()).await;
    assert_eq!(progress.next_block, 401);
    handle.stop().await?;

    let windows = &setup.source.requested_windows()[windows_before..];
    assert!(windows.iter().all(|w| *w.start() >= 251));
    assert_eq!(windows.last(), Some(&(351..=400)));
    assert_event_count!(setup.output_dir(), 6);

    Ok(())
}

#[tokio::test]
async fn timestamp_failure_retries_the_whole_window() -> anyhow::Result<()> {
    let setup = setup(150, [110, 120, 130]);
    setup.source.fail_next_block_timestamp(2);

    let handle = setup.builder().build(setup.source.clone())?.start();
    handle.wait_until(|p| p.is_caught_up()).await;
    let summary = handle.stop().await?;

    assert_eq!(summary.events_indexed, 3);
    assert_eq!(raw_artifact_records(setup.output_dir()).len(), 3);
    assert_eq!(setup.source.requested_windows()[..3], [100..=149, 100..=149, 100..=149]);

    Ok(())
}

#[tokio::test]
async fn latest_block_failure_at_startup_is_retried() -> anyhow::Result<()> {
    let setup = setup(150, [120]);
    setup.source.fail_next_latest(3);

    let handle = setup.builder().build(setup.source.clone())?.start();
    let progress = handle.wait_until(|p| p.state == ScannerState::LivePolling).await;
    assert_eq!(progress.next_block, 151);
    handle.stop().await?;

    assert_event_count!(setup.output_dir(), 1);
    Ok(())
}

#[tokio::test]
async fn live_latest_failure_waits_for_next_poll() -> anyhow::Result<()> {
    let setup = setup(150, [120]);
    let handle = setup.builder().build(setup.source.clone())?.start();
    handle.wait_until(|p| p.state == ScannerState::LivePolling).await;

    setup.source.fail_next_latest(2);
    setup.source.add_logs_at([170]);
    setup.source.set_latest(170);

    let progress = handle.wait_until(|p| p.next_block > 170).await;
    assert_eq!(progress.state, ScannerState::LivePolling);
    handle.stop().await?;

    assert_event_count!(setup.output_dir(), 2);
    Ok(())
}

#[tokio::test]
async fn stop_flushes_buffer_and_persists_checkpoint() -> anyhow::Result<()> {
    let setup = setup(250, [100, 150, 200, 250]);
    let handle = setup
        .builder()
        .flush_threshold(1_000)
        .checkpoint_interval(1_000)
        .build(setup.source.clone())?
        .start();

    let progress = handle.wait_until(|p| p.is_caught_up()).await;
    assert_eq!(progress.buffered_events, 4);
    assert!(artifact_paths(setup.output_dir())?.is_empty());
    assert_eq!(read_checkpoint(setup.output_dir()), None);

    let summary = handle.stop().await?;

    assert_eq!(summary.next_block, 251);
    assert_eq!(summary.artifacts_written, 1);
    assert_eq!(read_checkpoint(setup.output_dir()), Some(251));
    assert_eq!(load_event_set(setup.output_dir())?.len(), 4);

    Ok(())
}

#[tokio::test]
async fn stop_during_backoff_abandons_the_window() -> anyhow::Result<()> {
    let setup = setup(250, [110]);
    setup.source.fail_next_get_logs(usize::MAX);

    let handle = setup
        .builder()
        .retry_backoff(Duration::from_secs(3_600))
        .build(setup.source.clone())?
        .start();
    handle.wait_until(|p| p.state == ScannerState::ErrorBackoff).await;

    let summary = tokio::time::timeout(Duration::from_secs(5), handle.stop()).await??;

    assert_eq!(summary.next_block, 100);
    assert_eq!(summary.windows_processed, 0);
    assert_eq!(read_checkpoint(setup.output_dir()), Some(100));
    assert!(artifact_paths(setup.output_dir())?.is_empty());

    Ok(())
}

#[tokio::test]
async fn exhausted_storage_retries_are_fatal() -> anyhow::Result<()> {
    let setup = setup(250, [110, 160]);
    let output_dir = setup.output_dir().join("out");
    let scanner = crate::common::scanner_builder(&output_dir)
        .flush_threshold(1)
        .build(setup.source.clone())?;

    // the writer opened the directory; replace it with a plain file
    fs::remove_dir_all(&output_dir)?;
    fs::write(&output_dir, "not a directory")?;

    let handle = scanner.start();
    let result = tokio::time::timeout(Duration::from_secs(5), handle.wait()).await?;

    match result {
        Err(IndexerError::StorageExhausted { attempts, .. }) => assert_eq!(attempts, 3),
        other => panic!("expected StorageExhausted, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn storage_failure_recovers_within_retry_budget() -> anyhow::Result<()> {
    let setup = setup(250, [110, 160]);
    let output_dir = setup.output_dir().join("out");
    let scanner = crate::common::scanner_builder(&output_dir)
        .flush_threshold(1)
        .storage_retries(5)
        .storage_retry_delay(Duration::from_millis(50))
        .build(setup.source.clone())?;

    fs::remove_dir_all(&output_dir)?;
    let restore = {
        let output_dir = output_dir.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(80)).await;
            fs::create_dir_all(&output_dir)
        })
    };

    let handle = scanner.start();
    let progress = tokio::time::timeout(Duration::from_secs(5), handle.wait_until(|p| p.is_caught_up()))
        .await?;
    assert_eq!(progress.next_block, 251);
    restore.await??;

    let summary = handle.stop().await?;
    assert_eq!(summary.next_block, 251);
    assert_eq!(summary.events_indexed, 2);
    assert_eq!(read_checkpoint(&output_dir), Some(251));
    assert_event_count!(&output_dir, 2);

    Ok(())
}
