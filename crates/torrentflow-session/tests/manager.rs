use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use torrentflow_config::ManagerConfig;
use torrentflow_core::{
    FileEntry, InfoHash, TransferError, TransferInspector, TransferMetadata, TransferStatus,
    TransferWorkflow,
};
use torrentflow_events::Event;
use torrentflow_session::{LoopbackEngine, METADATA_PLACEHOLDER, SessionManager};
use torrentflow_telemetry::Metrics;
use torrentflow_test_support::events::{drain_ready, next_matching};
use torrentflow_test_support::fixtures::{DescriptorFixture, FixtureFile, scratch_dir};

const MAGNET_HEX: &str = "c12fe1c06bba254a9dc9f519b335aa7c1367a88a";

fn manager_in(download_dir: &Path) -> Result<(SessionManager, LoopbackEngine)> {
    let engine = LoopbackEngine::new();
    let config = ManagerConfig {
        metadata_timeout: Duration::from_secs(60),
        ..ManagerConfig::with_download_dir(download_dir)
    };
    let manager = SessionManager::new(Arc::new(engine.clone()), config, Metrics::new()?);
    Ok((manager, engine))
}

fn magnet(dn: Option<&str>) -> String {
    dn.map_or_else(
        || format!("magnet:?xt=urn:btih:{MAGNET_HEX}"),
        |name| format!("magnet:?xt=urn:btih:{MAGNET_HEX}&dn={name}"),
    )
}

fn album() -> DescriptorFixture {
    DescriptorFixture::new("album", 16_384)
        .with_file(FixtureFile::new(&["disc1", "01.flac"], vec![1; 20_000]))
        .with_file(FixtureFile::new(&["cover.jpg"], vec![2; 3_000]))
}

#[tokio::test(start_paused = true)]
async fn magnet_without_metadata_times_out_exactly_once() -> Result<()> {
    let dir = scratch_dir();
    let (manager, _engine) = manager_in(dir.path())?;
    let mut stream = manager.subscribe(None);
    let started = tokio::time::Instant::now();

    let id = manager.add_magnet(&magnet(None)).await?;
    assert_eq!(id.to_hex(), MAGNET_HEX);

    let snapshot = manager.get(id).await?;
    assert_eq!(snapshot.name, METADATA_PLACEHOLDER);
    assert_eq!(snapshot.status, TransferStatus::Paused);
    assert!(snapshot.progress.abs() < f64::EPSILON);

    let timeout = next_matching(&mut stream, Duration::from_secs(120), |env| {
        matches!(env.event, Event::MetadataTimeout { .. })
    })
    .await
    .context("metadata timeout event")?;
    assert!(started.elapsed() >= Duration::from_secs(60));
    assert_eq!(timeout.event.info_hash(), Some(id));

    let again = next_matching(&mut stream, Duration::from_secs(600), |env| {
        matches!(env.event, Event::MetadataTimeout { .. })
    })
    .await;
    assert!(again.is_none());
    assert_eq!(manager.metrics().snapshot().metadata_timeouts_total, 1);
    assert_eq!(manager.list().await.len(), 1);
    assert!(manager.get(id).await.is_ok());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn magnet_metadata_arrival_requests_pieces() -> Result<()> {
    let dir = scratch_dir();
    let (manager, engine) = manager_in(dir.path())?;
    let mut stream = manager.subscribe(None);
    let id = manager.add_magnet(&magnet(Some("ubuntu"))).await?;
    assert_eq!(manager.get(id).await?.name, "ubuntu");
    assert_eq!(engine.request_count(id), Some(0));

    tokio::time::sleep(Duration::from_secs(3)).await;
    engine.resolve_metadata(
        id,
        TransferMetadata {
            name: "ubuntu.iso".into(),
            piece_length: 16_384,
            piece_count: 4,
            files: vec![FileEntry {
                path: "ubuntu.iso".into(),
                display_name: "ubuntu.iso".into(),
                length: 60_000,
            }],
        },
    );

    let added = next_matching(&mut stream, Duration::from_secs(5), |env| {
        matches!(env.event, Event::TransferAdded { .. })
    })
    .await
    .context("added event")?;
    assert_eq!(added.event.info_hash(), Some(id));
    assert_eq!(engine.request_count(id), Some(1));
    let resolved = manager.get(id).await?;
    assert_eq!(resolved.size, 60_000);
    assert_eq!(resolved.name, "ubuntu.iso");

    let late = next_matching(&mut stream, Duration::from_secs(120), |env| {
        matches!(env.event, Event::MetadataTimeout { .. })
    })
    .await;
    assert!(late.is_none());
    Ok(())
}

#[tokio::test]
async fn invalid_and_duplicate_magnets_are_rejected() -> Result<()> {
    let dir = scratch_dir();
    let (manager, engine) = manager_in(dir.path())?;

    let err = manager
        .add_magnet("http://example.com/file.torrent")
        .await
        .expect_err("not a magnet");
    assert!(matches!(err, TransferError::InvalidInput { .. }));

    manager.add_magnet(&magnet(None)).await?;
    let err = manager
        .add_magnet(&magnet(Some("again")))
        .await
        .expect_err("duplicate");
    assert!(matches!(err, TransferError::DuplicateId { .. }));
    assert_eq!(manager.list().await.len(), 1);
    assert_eq!(engine.transfer_count(), 1);
    Ok(())
}

#[tokio::test]
async fn engine_failures_leave_the_registry_untouched() -> Result<()> {
    let dir = scratch_dir();
    let (manager, engine) = manager_in(dir.path())?;
    engine.reject_adds(Some("session closed"));

    let err = manager
        .add_magnet(&magnet(None))
        .await
        .expect_err("engine refuses");
    assert!(matches!(
        err,
        TransferError::EngineFailure {
            operation: "add_magnet",
            ..
        }
    ));
    assert!(manager.registry().is_empty().await);
    let rendered = manager.metrics().render()?;
    assert!(rendered.contains("outcome=\"engine_failure\""));
    Ok(())
}

#[tokio::test]
async fn descriptor_files_are_added_and_downloaded() -> Result<()> {
    let dir = scratch_dir();
    let fixture = album();
    let descriptor = fixture.write_descriptor(dir.path());
    let (manager, engine) = manager_in(&dir.path().join("downloads"))?;
    let mut stream = manager.subscribe(None);

    let id = manager.add_descriptor_file(&descriptor).await?;
    assert_eq!(id.to_hex(), fixture.info_hash_hex());
    assert_eq!(engine.request_count(id), Some(1));

    let snapshot = manager.get(id).await?;
    assert_eq!(snapshot.name, "album");
    assert_eq!(snapshot.size, fixture.total_length());
    assert_eq!(snapshot.files.len(), 2);
    assert_eq!(snapshot.files[0].name, "disc1/01.flac");

    let events = drain_ready(&mut stream).await;
    assert!(events.iter().any(|env| matches!(
        env.event,
        Event::TransferAdded { ref name, .. } if name == "album"
    )));
    Ok(())
}

#[tokio::test]
async fn unreadable_descriptors_fail_with_specific_errors() -> Result<()> {
    let dir = scratch_dir();
    let (manager, _engine) = manager_in(dir.path())?;

    let missing = dir.path().join("missing.torrent");
    let err = manager
        .add_descriptor_file(&missing)
        .await
        .expect_err("missing file");
    assert!(matches!(err, TransferError::DescriptorNotFound { ref path } if path == &missing));

    let garbage = dir.path().join("garbage.torrent");
    std::fs::write(&garbage, b"this is not bencode")?;
    let err = manager
        .add_descriptor_file(&garbage)
        .await
        .expect_err("garbage file");
    assert!(matches!(err, TransferError::ParseError { path: Some(_), .. }));
    assert!(manager.list().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn removal_with_delete_files_clears_payload() -> Result<()> {
    let dir = scratch_dir();
    let downloads = dir.path().join("downloads");
    let fixture = album();
    let descriptor = fixture.write_descriptor(dir.path());
    let payload = fixture.write_payload(&downloads);
    let (manager, engine) = manager_in(&downloads)?;
    let id = manager.add_descriptor_file(&descriptor).await?;

    let report = manager.remove(id, true).await?;
    assert!(report.is_complete());
    assert_eq!(report.deleted.len(), payload.len());
    for path in &payload {
        assert!(!path.exists(), "{} still present", path.display());
    }
    assert!(!downloads.join("album").exists());
    assert_eq!(engine.is_dropped(id), Some(true));
    assert!(manager.list().await.is_empty());
    assert!(matches!(
        manager.get(id).await,
        Err(TransferError::NotFound { .. })
    ));
    assert!(matches!(
        manager.remove(id, true).await,
        Err(TransferError::NotFound { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn removal_reports_files_it_could_not_delete() -> Result<()> {
    let dir = scratch_dir();
    let downloads = dir.path().join("downloads");
    let fixture = album();
    let descriptor = fixture.write_descriptor(dir.path());
    let payload = fixture.write_payload(&downloads);
    std::fs::remove_file(&payload[1])?;
    let (manager, _engine) = manager_in(&downloads)?;
    let id = manager.add_descriptor_file(&descriptor).await?;

    let report = manager.remove(id, true).await?;
    assert_eq!(report.deleted, vec![payload[0].clone()]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, payload[1]);
    assert!(manager.list().await.is_empty());
    assert!(matches!(
        report.into_result(),
        Err(TransferError::PartialDeletionFailure { ref failed, .. }) if failed.len() == 1
    ));
    Ok(())
}

#[tokio::test]
async fn removal_without_delete_keeps_files() -> Result<()> {
    let dir = scratch_dir();
    let downloads = dir.path().join("downloads");
    let fixture = album();
    let descriptor = fixture.write_descriptor(dir.path());
    let payload = fixture.write_payload(&downloads);
    let (manager, _engine) = manager_in(&downloads)?;
    let id = manager.add_descriptor_file(&descriptor).await?;

    let report = manager.remove(id, false).await?;
    assert!(report.deleted.is_empty() && report.failed.is_empty());
    assert!(payload.iter().all(|path| path.exists()));
    Ok(())
}

#[tokio::test]
async fn pause_is_idempotent_and_resume_restarts_requests() -> Result<()> {
    let dir = scratch_dir();
    let fixture = album();
    let descriptor = fixture.write_descriptor(dir.path());
    let (manager, engine) = manager_in(dir.path())?;
    let id = manager.add_descriptor_file(&descriptor).await?;
    engine.set_peers(id, 4, 6, 1);
    assert_eq!(manager.tick_now().await.snapshots[0].status, TransferStatus::Downloading);

    manager.pause(id).await?;
    let once = manager.get(id).await?;
    manager.pause(id).await?;
    let twice = manager.get(id).await?;
    assert_eq!(once.status, TransferStatus::Stalled);
    assert_eq!(once.status, twice.status);
    assert_eq!(once.peers, twice.peers);
    assert_eq!(engine.is_requesting(id), Some(false));

    manager.resume(id).await?;
    manager.resume(id).await?;
    assert_eq!(engine.is_requesting(id), Some(true));

    let missing = InfoHash::from_bytes([0xee; 20]);
    assert!(matches!(
        manager.pause(missing).await,
        Err(TransferError::NotFound { .. })
    ));
    assert!(matches!(
        manager.resume(missing).await,
        Err(TransferError::NotFound { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn local_files_are_seeded_without_downloading() -> Result<()> {
    let sources = scratch_dir();
    let first = sources.path().join("notes.txt");
    let second = sources.path().join("photo.png");
    std::fs::write(&first, vec![7; 300_000])?;
    std::fs::write(&second, vec![8; 1_000])?;
    let downloads = scratch_dir();
    let (manager, engine) = manager_in(downloads.path())?;

    let id = manager
        .add_local_for_seeding(vec![first.clone(), second.clone()])
        .await?;
    assert_eq!(engine.is_seed_only(id), Some(true));
    assert_eq!(engine.request_count(id), Some(0));

    let snapshot = manager.get(id).await?;
    assert_eq!(snapshot.name, "notes.txt");
    assert_eq!(snapshot.size, 301_000);
    assert_eq!(snapshot.status, TransferStatus::Completed);
    assert!((snapshot.progress - 100.0).abs() < f64::EPSILON);

    engine.set_peers(id, 2, 2, 0);
    assert_eq!(manager.get(id).await?.status, TransferStatus::Seeding);

    let err = manager
        .add_local_for_seeding(Vec::new())
        .await
        .expect_err("empty list");
    assert!(matches!(err, TransferError::InvalidInput { .. }));

    manager.remove(id, true).await?;
    assert!(first.exists() && second.exists());
    Ok(())
}

#[tokio::test]
async fn a_failing_session_does_not_stall_the_tick() -> Result<()> {
    let dir = scratch_dir();
    let fixture = album();
    let descriptor = fixture.write_descriptor(dir.path());
    let (manager, engine) = manager_in(dir.path())?;
    let healthy = manager.add_descriptor_file(&descriptor).await?;
    let broken = manager.add_magnet(&magnet(None)).await?;
    engine.fail_counters(broken, Some("handle invalidated"));
    let mut stream = manager.subscribe(None);

    let batch = manager.tick_now().await;
    assert_eq!(batch.snapshots.len(), 1);
    assert_eq!(batch.snapshots[0].id, healthy);

    let events = drain_ready(&mut stream).await;
    assert!(events.iter().any(|env| matches!(
        env.event,
        Event::SamplingFailed { info_hash, .. } if info_hash == broken
    )));
    assert!(events
        .iter()
        .any(|env| matches!(env.event, Event::TransfersUpdated(_))));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn zero_tick_interval_is_raised_before_broadcasting() -> Result<()> {
    let dir = scratch_dir();
    let engine = LoopbackEngine::new();
    let config = ManagerConfig {
        tick_interval: Duration::ZERO,
        ..ManagerConfig::with_download_dir(dir.path())
    };
    let manager = SessionManager::new(Arc::new(engine.clone()), config, Metrics::new()?);
    assert_eq!(manager.config().tick_interval, Duration::from_millis(100));

    let id = manager.add_magnet(&magnet(Some("tick"))).await?;
    let mut stream = manager.subscribe(None);
    manager.start();
    let envelope = next_matching(&mut stream, Duration::from_secs(2), |env| {
        matches!(env.event, Event::TransfersUpdated(_))
    })
    .await
    .context("batch after zero tick")?;
    let Event::TransfersUpdated(batch) = envelope.event else {
        anyhow::bail!("unexpected event kind");
    };
    assert_eq!(batch.snapshots.len(), 1);
    assert_eq!(batch.snapshots[0].id, id);
    manager.shutdown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn started_manager_broadcasts_until_shutdown() -> Result<()> {
    let dir = scratch_dir();
    let (manager, engine) = manager_in(dir.path())?;
    let id = manager.add_magnet(&magnet(Some("live"))).await?;
    engine.set_peers(id, 1, 1, 0);
    let mut stream = manager.subscribe(None);
    manager.start();
    manager.start();

    let mut batches = 0;
    while batches < 3 {
        let envelope = next_matching(&mut stream, Duration::from_secs(2), |env| {
            matches!(env.event, Event::TransfersUpdated(_))
        })
        .await
        .context("periodic batch")?;
        if let Event::TransfersUpdated(batch) = envelope.event {
            assert_eq!(batch.snapshots.len(), 1);
            assert_eq!(batch.stats.total_peers, 1);
        }
        batches += 1;
    }

    manager.shutdown().await;
    let _ = drain_ready(&mut stream).await;
    let after = next_matching(&mut stream, Duration::from_secs(5), |env| {
        matches!(env.event, Event::TransfersUpdated(_))
    })
    .await;
    assert!(after.is_none());
    assert!(manager.metrics().snapshot().ticks_total >= 3);
    Ok(())
}
