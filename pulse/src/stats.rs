//! # 分区消费计数

use std::{
    collections::BTreeMap,
    fmt,
    sync::{Mutex, MutexGuard, PoisonError},
};

/// 单个分区的计数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PartitionCount {
    /// 已计数的消息数
    pub count: u64,
    /// 最后计数消息的偏移量
    pub last_offset: Option<i64>,
}

type Table = BTreeMap<String, BTreeMap<i32, PartitionCount>>;

/// 线程安全的主题/分区计数表
///
/// 计数在表的整个生命周期内累积，不随会话重置。
#[derive(Debug, Default)]
pub struct StatsTable {
    inner: Mutex<Table>,
}

impl StatsTable {
    /// 构造空计数表
    pub fn new() -> Self {
        Self::default()
    }

    // 计数只做单调递增，锁中毒时表内容依然有效
    fn lock(&self) -> MutexGuard<'_, Table> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 登记分区，已存在时保持原计数
    pub fn register(&self, topic: &str, partition: i32) {
        self.lock()
            .entry(topic.to_string())
            .or_default()
            .entry(partition)
            .or_default();
    }

    /// 计数加一并返回新值
    pub fn increment_and_get(&self, topic: &str, partition: i32, offset: i64) -> u64 {
        let mut table = self.lock();
        let entry = table
            .entry(topic.to_string())
            .or_default()
            .entry(partition)
            .or_default();
        entry.count += 1;
        entry.last_offset = Some(offset);
        entry.count
    }

    /// 计数快照
    pub fn snapshot(&self) -> StatsSnapshot {
        let table = self.lock();
        let topics = table
            .iter()
            .map(|(topic, partitions)| {
                let total = partitions.values().map(|p| p.count).sum();
                (
                    topic.clone(),
                    TopicSummary {
                        partitions: partitions.clone(),
                        total,
                    },
                )
            })
            .collect();
        StatsSnapshot { topics }
    }
}

/// 单个主题的汇总
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TopicSummary {
    /// 各分区计数
    pub partitions: BTreeMap<i32, PartitionCount>,
    /// 主题合计
    pub total: u64,
}

/// 计数表快照，按主题、分区有序
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// 各主题汇总
    pub topics: BTreeMap<String, TopicSummary>,
}

impl StatsSnapshot {
    /// 指定分区的计数，未登记时为 `None`
    pub fn count(&self, topic: &str, partition: i32) -> Option<u64> {
        self.topics
            .get(topic)
            .and_then(|t| t.partitions.get(&partition))
            .map(|p| p.count)
    }

    /// 指定主题的合计，未登记时为 0
    pub fn total(&self, topic: &str) -> u64 {
        self.topics.get(topic).map_or(0, |t| t.total)
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (topic, summary) in &self.topics {
            for (partition, p) in &summary.partitions {
                match p.last_offset {
                    Some(offset) => writeln!(f, " {topic}[{partition}]: {} @{offset}", p.count)?,
                    None => writeln!(f, " {topic}[{partition}]: {}", p.count)?,
                }
            }
            writeln!(f, " {topic} TOTAL: {}", summary.total)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread};

    #[test]
    fn register_keeps_existing_count() {
        let stats = StatsTable::new();
        stats.register("orders", 0);
        stats.increment_and_get("orders", 0, 10);
        stats.increment_and_get("orders", 0, 11);
        stats.register("orders", 0);
        assert_eq!(stats.snapshot().count("orders", 0), Some(2));
    }

    #[test]
    fn register_starts_at_zero() {
        let stats = StatsTable::new();
        stats.register("payments", 2);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.count("payments", 2), Some(0));
        assert_eq!(snapshot.topics["payments"].partitions[&2].last_offset, None);
        assert_eq!(snapshot.count("payments", 1), None);
    }

    #[test]
    fn totals_sum_partitions() {
        let stats = StatsTable::new();
        stats.increment_and_get("orders", 0, 0);
        stats.increment_and_get("orders", 1, 0);
        stats.increment_and_get("orders", 1, 1);
        stats.increment_and_get("payments", 0, 5);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total("orders"), 3);
        assert_eq!(snapshot.total("payments"), 1);
        assert_eq!(snapshot.total("notifications"), 0);
        assert_eq!(snapshot.topics["orders"].partitions[&1].last_offset, Some(1));
    }

    #[test]
    fn summary_is_ordered() {
        let stats = StatsTable::new();
        stats.increment_and_get("payments", 1, 3);
        stats.increment_and_get("orders", 2, 7);
        stats.register("orders", 0);
        let text = stats.snapshot().to_string();
        assert_eq!(
            text,
            " orders[0]: 0\n orders[2]: 1 @7\n orders TOTAL: 1\n payments[1]: 1 @3\n payments TOTAL: 1\n"
        );
    }

    #[test]
    fn concurrent_increments() {
        let stats = Arc::new(StatsTable::new());
        let handles: Vec<_> = (0..4)
            .map(|partition| {
                let stats = Arc::clone(&stats);
                thread::spawn(move || {
                    for offset in 0..1000 {
                        stats.increment_and_get("orders", partition, offset);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total("orders"), 4000);
        assert_eq!(snapshot.count("orders", 3), Some(1000));
    }
}
