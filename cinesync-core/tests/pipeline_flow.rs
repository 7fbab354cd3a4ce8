mod common;

use std::path::PathBuf;

use cinesync_core::{CoreError, MonitorEvent, Origin, ProcessOutcome};
use cinesync_model::{
    DecisionKind, ErrorKind, OperatorDecision, ProcessingStage,
};
use common::Harness;

#[tokio::test]
async fn episode_is_linked_into_season_folder() {
    let h = Harness::new();
    h.provider.add_show(100, "Show Name", 2019);
    let source = h.add_source("Show.Name.S02E05.1080p.mkv");

    let outcome = h.coordinator.process_path(&source).await;

    let expected = h
        .library()
        .join("Shows/Show Name (2019)/Season 02/Show Name - S02E05.mkv");
    assert_eq!(outcome, ProcessOutcome::Linked(expected.clone()));
    assert_eq!(std::fs::read_link(&expected).unwrap(), source);

    let record = h.coordinator.record(&source).await.unwrap();
    assert_eq!(record.stage, ProcessingStage::Linked);
    assert_eq!(record.link_path, Some(expected));
    assert_eq!(record.retry_count, 0);
}

#[tokio::test]
async fn rerun_on_linked_record_writes_nothing() {
    let h = Harness::new();
    h.provider.add_movie(7, "Heat", 1995);
    let source = h.add_source("Heat.1995.1080p.mkv");

    assert!(matches!(
        h.coordinator.process_path(&source).await,
        ProcessOutcome::Linked(_)
    ));
    h.coordinator.wait_idle().await;
    let submitted = h.writer.stats().submitted;
    let calls = h.provider.calls();

    let outcome = h.coordinator.process_path(&source).await;
    assert_eq!(
        outcome,
        ProcessOutcome::AlreadyLinked(h.library().join("Movies/Heat (1995)/Heat (1995).mkv"))
    );
    assert_eq!(h.writer.stats().submitted, submitted);
    assert_eq!(h.provider.calls(), calls, "resolution is reused");
    assert_eq!(h.links.index().len(), 1);
}

#[tokio::test]
async fn same_title_ambiguity_parks_each_file() {
    let h = Harness::new();
    h.provider.add_show(1, "The Office", 2005);
    h.provider.add_show(2, "The Office", 2001);
    let first = h.add_source("The.Office.S01E01.mkv");
    let second = h.add_source("The.Office.S01E02.mkv");

    assert_eq!(h.coordinator.process_path(&first).await, ProcessOutcome::AwaitingDecision);
    assert_eq!(h.coordinator.process_path(&second).await, ProcessOutcome::AwaitingDecision);

    let pending = h.coordinator.pending_decisions().await;
    assert_eq!(pending.len(), 2);
    for decision in &pending {
        let DecisionKind::Disambiguation { candidates } = &decision.kind else {
            panic!("expected a disambiguation, got {decision:?}");
        };
        assert_eq!(candidates.len(), 2);
    }

    let outcome = h
        .coordinator
        .submit_decision(&first, OperatorDecision::AcceptCandidate(0))
        .await
        .unwrap();
    assert!(matches!(outcome, ProcessOutcome::Linked(_)), "{outcome:?}");

    // the other file keeps its own decision
    let remaining = h.coordinator.pending_decisions().await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].source_path, second);
    assert_eq!(
        h.coordinator.record(&second).await.unwrap().stage,
        ProcessingStage::AwaitingDisambiguation
    );
}

#[tokio::test]
async fn transient_failures_stop_at_retry_ceiling() {
    let h = Harness::with_config(|config| {
        config.workers.retry.max_resolve_retries = 3;
    });
    h.provider.add_movie(7, "Heat", 1995);
    h.provider.set_unavailable(true);
    let source = h.add_source("Heat.1995.mkv");

    for attempt in 1..=2 {
        match h.coordinator.process_path(&source).await {
            ProcessOutcome::RetryScheduled { attempt: got, .. } => assert_eq!(got, attempt),
            other => panic!("attempt {attempt}: {other:?}"),
        }
    }
    assert_eq!(
        h.coordinator.process_path(&source).await,
        ProcessOutcome::Failed(ErrorKind::ResolverTransient)
    );
    assert_eq!(h.provider.calls(), 3);

    let failed = h.coordinator.failed_records().await;
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].retry_count, 3);
    assert_eq!(
        failed[0].last_error.as_ref().map(|e| e.kind),
        Some(ErrorKind::ResolverTransient)
    );

    // a later scan does not pick the failed record back up
    assert!(!h.coordinator.enqueue(source.clone(), Origin::Scan).await);
}

#[tokio::test]
async fn unparseable_file_is_skipped() {
    let h = Harness::new();
    let source = h.add_source("sample.mkv");

    assert_eq!(
        h.coordinator.process_path(&source).await,
        ProcessOutcome::Skipped(ErrorKind::ParseFailure)
    );
    assert_eq!(h.provider.calls(), 0);
}

#[tokio::test]
async fn unknown_title_fails_not_found() {
    let h = Harness::new();
    let source = h.add_source("Nothing.Like.It.2011.mkv");

    assert_eq!(
        h.coordinator.process_path(&source).await,
        ProcessOutcome::Failed(ErrorKind::NotFound)
    );
}

#[tokio::test]
async fn occupied_destination_waits_for_operator() {
    let h = Harness::new();
    h.provider.add_movie(7, "Heat", 1995);
    let source = h.add_source("Heat.1995.1080p.mkv");
    let destination = h.library().join("Movies/Heat (1995)/Heat (1995).mkv");
    std::fs::create_dir_all(destination.parent().unwrap()).unwrap();
    std::fs::write(&destination, b"someone else's file").unwrap();

    assert_eq!(h.coordinator.process_path(&source).await, ProcessOutcome::AwaitingDecision);
    let pending = h.coordinator.pending_decisions().await;
    assert_eq!(pending.len(), 1);
    assert!(pending[0].is_conflict());

    let err = h
        .coordinator
        .submit_decision(&source, OperatorDecision::AcceptCandidate(0))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidDecision(_)), "{err}");

    let outcome = h
        .coordinator
        .submit_decision(&source, OperatorDecision::Rename("Heat (1995) - Alt".into()))
        .await
        .unwrap();
    let renamed = h.library().join("Movies/Heat (1995)/Heat (1995) - Alt.mkv");
    assert_eq!(outcome, ProcessOutcome::Linked(renamed.clone()));
    assert_eq!(std::fs::read_link(&renamed).unwrap(), source);
    // the occupant is untouched
    assert_eq!(std::fs::read(&destination).unwrap(), b"someone else's file");
    assert!(h.coordinator.pending_decisions().await.is_empty());
}

#[tokio::test]
async fn overwrite_replaces_occupant() {
    let h = Harness::new();
    h.provider.add_movie(7, "Heat", 1995);
    let source = h.add_source("Heat.1995.mkv");
    let destination = h.library().join("Movies/Heat (1995)/Heat (1995).mkv");
    std::fs::create_dir_all(destination.parent().unwrap()).unwrap();
    std::fs::write(&destination, b"stale").unwrap();

    assert_eq!(h.coordinator.process_path(&source).await, ProcessOutcome::AwaitingDecision);
    let outcome = h
        .coordinator
        .submit_decision(&source, OperatorDecision::Overwrite)
        .await
        .unwrap();
    assert_eq!(outcome, ProcessOutcome::Linked(destination.clone()));
    assert_eq!(std::fs::read_link(&destination).unwrap(), source);
}

#[tokio::test]
async fn removal_deletes_link_and_leaves_tombstone() {
    let h = Harness::new();
    h.provider.add_show(100, "Show Name", 2019);
    let source = h.add_source("Show Name/Season 2/Show.Name.S02E05.mkv");
    h.coordinator.start(2).await;

    let ProcessOutcome::Linked(link) = h.coordinator.process_path(&source).await else {
        panic!("expected a link");
    };
    std::fs::remove_dir_all(h.source_root().join("Show Name")).unwrap();
    h.coordinator
        .handle_event(MonitorEvent::Removed(h.source_root().join("Show Name")))
        .await;
    h.coordinator.wait_idle().await;

    assert!(std::fs::symlink_metadata(&link).is_err());
    // empty show folders are pruned up to the library root
    assert!(!h.library().join("Shows").exists());
    assert!(h.links.index().is_empty());

    let record = h.coordinator.record(&source).await.unwrap();
    assert_eq!(record.stage, ProcessingStage::Removed);
    assert_eq!(record.link_path, None);
    h.coordinator.shutdown().await;
}

#[tokio::test]
async fn scan_queues_every_video_once() {
    let h = Harness::new();
    h.provider.add_movie(7, "Heat", 1995);
    h.provider.add_show(100, "Show Name", 2019);
    h.add_source("Heat.1995.mkv");
    h.add_source("Heat.1995.nfo");
    h.add_source("Show Name/Show.Name.S01E01.mkv");
    h.add_source("Show Name/Show.Name.S01E02.mkv");

    h.coordinator.start(3).await;
    assert_eq!(h.coordinator.initial_scan().await, 3);
    h.coordinator.wait_idle().await;

    let linked = h
        .coordinator
        .records()
        .filter(|record| record.stage == ProcessingStage::Linked)
        .await;
    assert_eq!(linked.len(), 3);
    assert_eq!(h.links.index().len(), 3);
    assert_eq!(h.store.record_count().await, 3);
    h.coordinator.shutdown().await;
}

#[tokio::test]
async fn reprocess_resolves_again() {
    let h = Harness::with_config(|config| {
        config.workers.retry.max_resolve_retries = 1;
    });
    h.provider.add_movie(7, "Heat", 1995);
    let source = h.add_source("Heat.1995.mkv");
    h.provider.set_unavailable(true);
    assert_eq!(
        h.coordinator.process_path(&source).await,
        ProcessOutcome::Failed(ErrorKind::ResolverTransient)
    );

    h.provider.set_unavailable(false);
    h.coordinator.start(1).await;
    h.coordinator.reprocess(&source).await.unwrap();
    h.coordinator.wait_idle().await;

    let record = h.coordinator.record(&source).await.unwrap();
    assert_eq!(record.stage, ProcessingStage::Linked);
    assert_eq!(record.retry_count, 0);

    let missing = PathBuf::from("/nowhere/else.mkv");
    assert!(matches!(
        h.coordinator.reprocess(&missing).await,
        Err(CoreError::UnknownRecord(_))
    ));
    h.coordinator.shutdown().await;
}

#[tokio::test]
async fn restart_restores_records_and_links() {
    let h = Harness::new();
    h.provider.add_movie(7, "Heat", 1995);
    let source = h.add_source("Heat.1995.mkv");
    let ProcessOutcome::Linked(link) = h.coordinator.process_path(&source).await else {
        panic!("expected a link");
    };
    h.coordinator.wait_idle().await;

    let (coordinator, links) = h.restarted();
    assert_eq!(coordinator.restore(h.store.as_ref()).await.unwrap(), 1);
    assert_eq!(links.index().link_for_source(&source), Some(link.clone()));

    let calls = h.provider.calls();
    assert_eq!(
        coordinator.process_path(&source).await,
        ProcessOutcome::AlreadyLinked(link)
    );
    assert_eq!(h.provider.calls(), calls);
}

#[tokio::test]
async fn folders_above_the_source_root_do_not_set_content_flags() {
    let h = Harness::with_config(|config| {
        config.paths.source_dirs = vec![config.paths.source_dirs[0].join("family")];
        config.separation.kids = true;
    });
    h.provider.add_movie(7, "Heat", 1995);
    h.provider.add_movie(8, "Coco", 2017);
    let heat = h.add_source("Heat.1995.mkv");
    let coco = h.add_source("Kids/Coco.2017.mkv");

    assert_eq!(
        h.coordinator.process_path(&heat).await,
        ProcessOutcome::Linked(h.library().join("Movies/Heat (1995)/Heat (1995).mkv"))
    );
    // a kids folder below the root still routes the file
    assert_eq!(
        h.coordinator.process_path(&coco).await,
        ProcessOutcome::Linked(h.library().join("KidsMovies/Coco (2017)/Coco (2017).mkv"))
    );
}

#[tokio::test]
async fn anime_named_source_root_is_not_anime_content() {
    let h = Harness::with_config(|config| {
        config.paths.source_dirs = vec![config.paths.source_dirs[0].join("anime")];
        config.separation.anime = true;
    });
    h.provider.add_show(100, "Show Name", 2019);
    let source = h.add_source("Show.Name.S02E05.mkv");

    assert_eq!(
        h.coordinator.process_path(&source).await,
        ProcessOutcome::Linked(
            h.library()
                .join("Shows/Show Name (2019)/Season 02/Show Name - S02E05.mkv")
        )
    );
    let record = h.coordinator.record(&source).await.unwrap();
    assert!(!record.identity.unwrap().flags.anime);
}

#[tokio::test]
async fn resolution_tiers_with_unnamed_1080p_tier() {
    let h = Harness::with_config(|config| config.resolution.enabled = true);
    h.provider.add_show(100, "Show Name", 2019);
    let full_hd = h.add_source("Show.Name.S02E05.1080p.mkv");
    let hd = h.add_source("Show.Name.S02E06.720p.mkv");

    assert_eq!(
        h.coordinator.process_path(&full_hd).await,
        ProcessOutcome::Linked(
            h.library()
                .join("Shows/Show Name (2019)/Season 02/Show Name - S02E05.mkv")
        )
    );
    assert_eq!(
        h.coordinator.process_path(&hd).await,
        ProcessOutcome::Linked(
            h.library()
                .join("Shows/HD720/Show Name (2019)/Season 02/Show Name - S02E06.mkv")
        )
    );
}

#[tokio::test]
async fn named_1080p_tier_nests_under_shows() {
    let h = Harness::with_config(|config| {
        config.resolution.enabled = true;
        config.resolution.show_tiers.fhd_1080p = "FullHD".into();
    });
    h.provider.add_show(100, "Show Name", 2019);
    let source = h.add_source("Show.Name.S02E05.1080p.mkv");

    let expected = h
        .library()
        .join("Shows/FullHD/Show Name (2019)/Season 02/Show Name - S02E05.mkv");
    assert_eq!(
        h.coordinator.process_path(&source).await,
        ProcessOutcome::Linked(expected.clone())
    );
    assert_eq!(std::fs::read_link(&expected).unwrap(), source);
}

fn candidate_years(decision: &cinesync_model::PendingDecision) -> Vec<Option<u16>> {
    let DecisionKind::Disambiguation { candidates } = &decision.kind else {
        panic!("expected a disambiguation, got {decision:?}");
    };
    candidates.iter().map(|candidate| candidate.year()).collect()
}

#[tokio::test]
async fn same_title_different_years_get_separate_decisions() {
    let h = Harness::new();
    h.provider.add_movie(1, "Heist", 2005);
    h.provider.add_movie(3, "Heist", 2005);
    h.provider.add_movie(2, "Heist", 2001);
    h.provider.add_movie(4, "Heist", 2001);
    let newer = h.add_source("Heist (2005)/Heist.2005.mkv");
    let older = h.add_source("Heist (2001)/Heist.2001.mkv");

    assert_eq!(h.coordinator.process_path(&newer).await, ProcessOutcome::AwaitingDecision);
    assert_eq!(h.coordinator.process_path(&older).await, ProcessOutcome::AwaitingDecision);
    assert_eq!(h.provider.calls(), 2, "one search per title and year");

    let pending = h.coordinator.pending_decisions().await;
    assert_eq!(pending.len(), 2);
    for decision in &pending {
        let year = if decision.source_path == newer { 2005 } else { 2001 };
        assert_eq!(candidate_years(decision), vec![Some(year), Some(year)]);
    }

    let outcome = h
        .coordinator
        .submit_decision(&newer, OperatorDecision::AcceptCandidate(0))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ProcessOutcome::Linked(h.library().join("Movies/Heist (2005)/Heist (2005).mkv"))
    );

    // the 2005 answer does not leak into the 2001 lookup
    assert_eq!(h.coordinator.process_path(&older).await, ProcessOutcome::AwaitingDecision);
    let remaining = h.coordinator.pending_decisions().await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].source_path, older);
    assert_eq!(candidate_years(&remaining[0]), vec![Some(2001), Some(2001)]);
}

#[tokio::test]
async fn same_title_different_years_resolve_independently() {
    let h = Harness::new();
    h.provider.add_movie(1, "Heist", 2005);
    h.provider.add_movie(2, "Heist", 2001);
    let newer = h.add_source("Heist (2005)/Heist.2005.mkv");
    let older = h.add_source("Heist (2001)/Heist.2001.mkv");

    assert_eq!(
        h.coordinator.process_path(&newer).await,
        ProcessOutcome::Linked(h.library().join("Movies/Heist (2005)/Heist (2005).mkv"))
    );
    assert_eq!(
        h.coordinator.process_path(&older).await,
        ProcessOutcome::Linked(h.library().join("Movies/Heist (2001)/Heist (2001).mkv"))
    );
    assert_eq!(h.links.index().len(), 2);
}

#[tokio::test]
async fn reprocess_forgets_cached_ambiguity() {
    let h = Harness::new();
    h.provider.add_movie(1, "Heist", 2005);
    h.provider.add_movie(3, "Heist", 2005);
    let source = h.add_source("Heist.2005.mkv");
    assert_eq!(h.coordinator.process_path(&source).await, ProcessOutcome::AwaitingDecision);
    let calls = h.provider.calls();

    h.coordinator.start(1).await;
    h.coordinator.reprocess(&source).await.unwrap();
    h.coordinator.wait_idle().await;

    assert_eq!(h.provider.calls(), calls + 1, "lookup went back to the provider");
    assert_eq!(
        h.coordinator.record(&source).await.unwrap().stage,
        ProcessingStage::AwaitingDisambiguation
    );
    assert_eq!(h.coordinator.pending_decisions().await.len(), 1);
    h.coordinator.shutdown().await;
}
