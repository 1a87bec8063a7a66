use std::collections::VecDeque;

use super::surface::Snapshot;
use crate::timeline::nearest_within;

/// 再生位置をキーにした描画結果のキャッシュ
///
/// 容量を超えたら最も古く挿入されたものから捨てる（アクセス順ではない）。
#[derive(Debug)]
pub struct RenderCache {
    entries: VecDeque<(f64, Snapshot)>,
    capacity: usize,
    tolerance: f64,
}

impl RenderCache {
    pub fn new(capacity: usize, tolerance: f64) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            tolerance,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 許容幅内で最も近いキーとそのスナップショット
    pub fn lookup(&self, t: f64) -> Option<(f64, &Snapshot)> {
        nearest_within(self.entries.iter(), t, self.tolerance, |(key, _)| *key)
            .map(|(key, snap)| (*key, snap))
    }

    pub fn insert(&mut self, t: f64, snapshot: Snapshot) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back((t, snapshot));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// 挿入順のキー
    pub fn keys(&self) -> impl Iterator<Item = f64> + '_ {
        self.entries.iter().map(|(key, _)| *key)
    }
}
