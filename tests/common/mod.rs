//! Cluster fixture shared by the integration suites.

#![allow(dead_code)]

use std::{rc::Rc, sync::Arc, time::Duration};

use keyspace_compaction::{
    replica::{
        mem::{CompactionGate, CompactionJournal, MemDatabase, MemTable},
        Database, TableError, TableId,
    },
    sharded::{ShardId, Sharded},
    task::TaskManager,
    ShardedOptions,
};

#[derive(Clone)]
pub struct TableSpec {
    id: TableId,
    size: i64,
    failure: Option<TableError>,
    gate: Option<Arc<CompactionGate>>,
}

impl TableSpec {
    pub fn new(id: TableId, size: i64) -> Self {
        Self {
            id,
            size,
            failure: None,
            gate: None,
        }
    }

    pub fn failing(self, err: TableError) -> Self {
        Self {
            failure: Some(err),
            ..self
        }
    }

    pub fn gated(self, gate: &Arc<CompactionGate>) -> Self {
        Self {
            gate: Some(Arc::clone(gate)),
            ..self
        }
    }
}

pub struct Cluster {
    pub manager: Arc<TaskManager>,
    pub sharded: Sharded<MemDatabase>,
    pub journal: CompactionJournal,
}

impl Cluster {
    /// One shard per entry of `layout`, each holding the listed tables.
    pub fn start(layout: Vec<Vec<TableSpec>>) -> Self {
        let manager = TaskManager::new();
        let journal = CompactionJournal::new();
        let shards = layout.len();
        let factory_manager = Arc::clone(&manager);
        let factory_journal = journal.clone();
        let sharded = Sharded::start(
            ShardedOptions::default()
                .shards(shards)
                .thread_name("compaction-test"),
            move |shard: ShardId| {
                let db = MemDatabase::new(factory_manager.module("compaction", shard));
                for spec in &layout[shard.get() as usize] {
                    let mut table =
                        MemTable::new(spec.id, spec.size).with_journal(factory_journal.clone());
                    if let Some(err) = &spec.failure {
                        table = table.with_failure(err.clone());
                    }
                    if let Some(gate) = &spec.gate {
                        table = table.with_gate(Arc::clone(gate));
                    }
                    db.add_table(table);
                }
                db
            },
        )
        .expect("start shards");
        Self {
            manager,
            sharded,
            journal,
        }
    }

    pub async fn drop_table(&self, shard: ShardId, table: TableId) {
        self.sharded
            .invoke_on(shard, move |db: Rc<MemDatabase>| async move {
                db.drop_table(&table).is_some()
            })
            .await
            .expect("invoke");
    }

    pub async fn compactions(&self, shard: ShardId, table: TableId) -> u64 {
        self.sharded
            .invoke_on(shard, move |db: Rc<MemDatabase>| async move {
                db.find_table(&table).map(|table| table.compactions())
            })
            .await
            .expect("invoke")
            .expect("table exists")
    }
}

impl Drop for Cluster {
    fn drop(&mut self) {
        self.sharded.shutdown();
    }
}

pub fn ids(count: usize) -> Vec<TableId> {
    (0..count).map(|_| TableId::new()).collect()
}

pub fn shard(index: u32) -> ShardId {
    ShardId::new(index)
}

/// Poll `condition` until it holds, failing the test after five seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
