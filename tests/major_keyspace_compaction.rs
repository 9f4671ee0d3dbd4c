mod common;

use std::{io, rc::Rc};

use common::{eventually, ids, shard, Cluster, TableSpec};
use keyspace_compaction::{
    compaction::{
        force_keyspace_compaction, CompactionError, FORCE_KEYSPACE_COMPACTION, MAJOR_COMPACTION,
    },
    replica::{
        mem::{CompactionGate, MemDatabase},
        Database, Table, TableError,
    },
    task::{TaskProgress, TaskState},
};

const KEYSPACE: &str = "ks";

#[tokio::test]
async fn compacts_smallest_table_first() {
    let t = ids(3);
    let cluster = Cluster::start(vec![vec![
        TableSpec::new(t[0], 100),
        TableSpec::new(t[1], 10),
        TableSpec::new(t[2], 1000),
    ]]);

    let handle = force_keyspace_compaction(&cluster.sharded, KEYSPACE, t.clone())
        .await
        .expect("start");
    handle.done().await.expect("compaction succeeds");

    assert_eq!(cluster.journal.completed_on(shard(0)), vec![t[1], t[0], t[2]]);
    assert_eq!(cluster.journal.max_concurrency(shard(0)), 1);
    let status = handle.status();
    assert_eq!(status.state, TaskState::Done);
    assert_eq!(status.type_name, MAJOR_COMPACTION);
    assert_eq!(status.keyspace, KEYSPACE);
    assert_eq!(status.shard, None);
    assert_eq!(status.parent_id, None);
}

#[tokio::test]
async fn table_dropped_before_its_turn_is_skipped() {
    let t = ids(3);
    let gate = CompactionGate::new();
    let cluster = Cluster::start(vec![vec![
        TableSpec::new(t[0], 1).gated(&gate),
        TableSpec::new(t[1], 2),
        TableSpec::new(t[2], 3),
    ]]);

    let handle = force_keyspace_compaction(&cluster.sharded, KEYSPACE, t.clone())
        .await
        .expect("start");
    gate.entered().await;
    cluster.drop_table(shard(0), t[1]).await;
    gate.release();
    handle.done().await.expect("drops are not failures");

    assert_eq!(cluster.journal.started_on(shard(0)), vec![t[0], t[2]]);
    assert_eq!(cluster.journal.completed_on(shard(0)), vec![t[0], t[2]]);
}

#[tokio::test]
async fn table_dropped_while_compacting_is_skipped() {
    let t = ids(2);
    let gate = CompactionGate::new();
    let cluster = Cluster::start(vec![vec![
        TableSpec::new(t[0], 1).gated(&gate),
        TableSpec::new(t[1], 2),
    ]]);

    let handle = force_keyspace_compaction(&cluster.sharded, KEYSPACE, t.clone())
        .await
        .expect("start");
    gate.entered().await;
    cluster.drop_table(shard(0), t[0]).await;
    gate.release();
    handle.done().await.expect("drop mid-compaction is skipped");

    assert_eq!(cluster.journal.started_on(shard(0)), vec![t[0], t[1]]);
    assert_eq!(cluster.journal.completed_on(shard(0)), vec![t[1]]);
}

#[tokio::test]
async fn hard_failure_stops_the_shard_and_is_returned() {
    let t = ids(3);
    let cluster = Cluster::start(vec![vec![
        TableSpec::new(t[0], 1),
        TableSpec::new(t[1], 2).failing(TableError::from(io::Error::other("disk full"))),
        TableSpec::new(t[2], 3),
    ]]);

    let handle = force_keyspace_compaction(&cluster.sharded, KEYSPACE, t.clone())
        .await
        .expect("start");
    let err = handle.done().await.expect_err("second table fails");

    match err {
        CompactionError::Failed {
            op,
            keyspace,
            table,
            source: TableError::Io(_),
        } => {
            assert_eq!(op, FORCE_KEYSPACE_COMPACTION);
            assert_eq!(keyspace, KEYSPACE);
            assert_eq!(table, t[1]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(cluster.journal.started_on(shard(0)), vec![t[0], t[1]]);
    assert_eq!(cluster.journal.completed_on(shard(0)), vec![t[0]]);

    let status = handle.status();
    assert_eq!(status.state, TaskState::Failed);
    let message = status.error.expect("failure recorded");
    assert!(message.contains(&t[1].to_string()), "{message}");
}

#[tokio::test]
async fn every_table_dropped_still_succeeds() {
    let t = ids(3);
    let cluster = Cluster::start(vec![t.iter().map(|id| TableSpec::new(*id, 1)).collect()]);
    for table in &t {
        cluster.drop_table(shard(0), *table).await;
    }

    let handle = force_keyspace_compaction(&cluster.sharded, KEYSPACE, t)
        .await
        .expect("start");
    handle.done().await.expect("nothing left to compact");

    assert!(cluster.journal.events().is_empty());
    assert_eq!(handle.status().state, TaskState::Done);
}

#[tokio::test]
async fn empty_table_list_succeeds() {
    let cluster = Cluster::start(vec![Vec::new(), Vec::new()]);

    let handle = force_keyspace_compaction(&cluster.sharded, KEYSPACE, Vec::new())
        .await
        .expect("start");
    handle.done().await.expect("no tables");

    assert_eq!(cluster.manager.list(true).len(), 3);
}

#[tokio::test]
async fn failing_shard_does_not_stop_its_siblings() {
    let t = ids(3);
    let healthy = vec![
        TableSpec::new(t[0], 1),
        TableSpec::new(t[1], 2),
        TableSpec::new(t[2], 3),
    ];
    let broken = vec![
        TableSpec::new(t[0], 1),
        TableSpec::new(t[1], 2).failing(TableError::Internal("corrupt sstable".into())),
        TableSpec::new(t[2], 3),
    ];
    let cluster = Cluster::start(vec![healthy, broken]);

    let handle = force_keyspace_compaction(&cluster.sharded, KEYSPACE, t.clone())
        .await
        .expect("start");
    let err = handle.done().await.expect_err("shard 1 fails");

    assert!(
        matches!(&err, CompactionError::Failed { table, source: TableError::Internal(_), .. } if *table == t[1]),
        "{err}"
    );
    assert_eq!(cluster.journal.completed_on(shard(0)), t);
    assert_eq!(cluster.journal.completed_on(shard(1)), vec![t[0]]);
    for table in &t {
        assert_eq!(cluster.compactions(shard(0), *table).await, 1);
    }
    assert_eq!(cluster.compactions(shard(1), t[2]).await, 0);
}

#[tokio::test]
async fn abort_keeps_finished_work_and_stops_before_the_next_table() {
    let t = ids(3);
    let gate = CompactionGate::new();
    let cluster = Cluster::start(vec![vec![
        TableSpec::new(t[0], 1),
        TableSpec::new(t[1], 2).gated(&gate),
        TableSpec::new(t[2], 3),
    ]]);

    let handle = force_keyspace_compaction(&cluster.sharded, KEYSPACE, t.clone())
        .await
        .expect("start");
    gate.entered().await;
    handle.abort();
    gate.release();
    let err = handle.done().await.expect_err("aborted");

    assert!(matches!(err, CompactionError::Cancelled), "{err}");
    assert_eq!(cluster.journal.completed_on(shard(0)), vec![t[0], t[1]]);
    assert_eq!(cluster.journal.started_on(shard(0)), vec![t[0], t[1]]);
    assert_eq!(
        cluster.manager.progress(handle.id()).expect("progress"),
        TaskProgress {
            completed: 2,
            total: 3
        }
    );
}

#[tokio::test]
async fn abort_is_reported_when_children_have_nothing_left() {
    let t = ids(1);
    let gate = CompactionGate::new();
    let cluster = Cluster::start(vec![vec![TableSpec::new(t[0], 1).gated(&gate)], Vec::new()]);

    let handle = force_keyspace_compaction(&cluster.sharded, KEYSPACE, t.clone())
        .await
        .expect("start");
    gate.entered().await;
    let manager = &cluster.manager;
    let coordinator = handle.id();
    eventually(|| {
        manager
            .children(coordinator)
            .expect("children")
            .iter()
            .filter(|child| child.shard == Some(shard(1)))
            .any(|child| {
                manager
                    .status(child.id)
                    .is_ok_and(|status| status.state == TaskState::Done)
            })
    })
    .await;
    handle.abort();
    gate.release();
    let err = handle.done().await.expect_err("aborted");

    assert!(matches!(err, CompactionError::Cancelled), "{err}");
    assert_eq!(cluster.journal.completed_on(shard(0)), vec![t[0]]);
    for child in manager.children(coordinator).expect("children") {
        let status = manager.status(child.id).expect("child status");
        assert_eq!(status.state, TaskState::Done);
    }
    assert_eq!(handle.status().state, TaskState::Failed);
}

#[tokio::test]
async fn shards_compact_in_parallel() {
    let t = ids(2);
    let gate = CompactionGate::new();
    let blocked = vec![TableSpec::new(t[0], 1).gated(&gate), TableSpec::new(t[1], 2)];
    let free = vec![TableSpec::new(t[0], 1), TableSpec::new(t[1], 2)];
    let cluster = Cluster::start(vec![blocked, free]);

    let handle = force_keyspace_compaction(&cluster.sharded, KEYSPACE, t.clone())
        .await
        .expect("start");
    gate.entered().await;
    let journal = &cluster.journal;
    eventually(|| journal.completed_on(shard(1)).len() == 2).await;

    assert!(journal.completed_on(shard(0)).is_empty());
    assert_eq!(handle.status().state, TaskState::Running);

    gate.release();
    handle.done().await.expect("compaction succeeds");
    assert_eq!(journal.completed_on(shard(0)), t);
    assert_eq!(journal.completed_on(shard(1)), t);
}

#[tokio::test]
async fn one_internal_child_per_shard() {
    let t = ids(3);
    let layout = (0..3)
        .map(|_| t.iter().map(|id| TableSpec::new(*id, 10)).collect())
        .collect();
    let cluster = Cluster::start(layout);

    let handle = force_keyspace_compaction(&cluster.sharded, KEYSPACE, t.clone())
        .await
        .expect("start");
    handle.done().await.expect("compaction succeeds");

    let visible = cluster.manager.list(false);
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, handle.id());
    assert_eq!(cluster.manager.list(true).len(), 4);

    let children = cluster.manager.children(handle.id()).expect("children");
    let mut shards: Vec<_> = children
        .iter()
        .map(|child| child.shard.expect("children are shard-local"))
        .collect();
    shards.sort();
    assert_eq!(shards, vec![shard(0), shard(1), shard(2)]);
    for child in children {
        let status = cluster.manager.status(child.id).expect("child status");
        assert!(status.is_internal);
        assert_eq!(status.parent_id, Some(handle.id()));
        assert_eq!(status.correlation_id, Some(handle.id()));
        assert_eq!(status.sequence_number, handle.status().sequence_number);
        assert_eq!(status.type_name, MAJOR_COMPACTION);
        assert_eq!(status.state, TaskState::Done);
    }
    assert_eq!(
        cluster.manager.progress(handle.id()).expect("progress"),
        TaskProgress {
            completed: 9,
            total: 9
        }
    );

    cluster.manager.release(handle.id()).expect("release");
    assert!(cluster.manager.list(true).is_empty());
}

#[tokio::test]
async fn repeated_runs_compact_again() {
    let t = ids(2);
    let cluster = Cluster::start(vec![vec![TableSpec::new(t[0], 5), TableSpec::new(t[1], 1)]]);

    for _ in 0..2 {
        force_keyspace_compaction(&cluster.sharded, KEYSPACE, t.clone())
            .await
            .expect("start")
            .done()
            .await
            .expect("compaction succeeds");
    }

    assert_eq!(cluster.compactions(shard(0), t[0]).await, 2);
    assert_eq!(cluster.compactions(shard(0), t[1]).await, 2);
    assert_eq!(
        cluster.journal.completed_on(shard(0)),
        vec![t[1], t[0], t[1], t[0]]
    );
}

#[tokio::test]
async fn repeated_table_ids_are_compacted_once() {
    let t = ids(2);
    let cluster = Cluster::start(vec![vec![TableSpec::new(t[0], 1), TableSpec::new(t[1], 2)]]);

    let tables = vec![t[1], t[0], t[1], t[0]];
    let handle = force_keyspace_compaction(&cluster.sharded, KEYSPACE, tables)
        .await
        .expect("start");
    handle.done().await.expect("compaction succeeds");

    assert_eq!(cluster.journal.completed_on(shard(0)), vec![t[0], t[1]]);
}

#[tokio::test]
async fn sizes_are_read_at_start_of_each_run() {
    let t = ids(2);
    let cluster = Cluster::start(vec![vec![TableSpec::new(t[0], 1), TableSpec::new(t[1], 2)]]);

    let resized = t[0];
    cluster
        .sharded
        .invoke_on(shard(0), move |db: Rc<MemDatabase>| async move {
            db.find_table(&resized)
                .expect("table exists")
                .set_live_disk_space_used(50);
        })
        .await
        .expect("invoke");

    force_keyspace_compaction(&cluster.sharded, KEYSPACE, t.clone())
        .await
        .expect("start")
        .done()
        .await
        .expect("compaction succeeds");

    assert_eq!(cluster.journal.completed_on(shard(0)), vec![t[1], t[0]]);
    let sizes = cluster
        .sharded
        .invoke_on(shard(0), |db: Rc<MemDatabase>| async move {
            db.table_ids()
                .iter()
                .map(|id| db.find_table(id).map(|table| table.stats().live_disk_space_used))
                .collect::<Result<Vec<_>, _>>()
        })
        .await
        .expect("invoke")
        .expect("tables exist");
    assert_eq!(sizes.iter().sum::<i64>(), 52);
}
