//! Nearest-timestamp matching shared by the renderer and its frame cache.

use std::sync::Arc;

use crate::pose::{sort_by_timestamp, KeypointRecord};

/// キーポイントとの照合許容幅（秒）
pub const MATCH_TOLERANCE: f64 = 0.2;

/// 描画キャッシュのヒット許容幅（秒）
pub const CACHE_TOLERANCE: f64 = 0.05;

/// `items` を走査し、`t` に最も近いキーを持つ要素を返す。
///
/// 距離が `tolerance` を超える場合は None。同距離なら先に見つかった方。
pub fn nearest_within<I, T, F>(items: I, t: f64, tolerance: f64, key: F) -> Option<T>
where
    I: IntoIterator<Item = T>,
    F: Fn(&T) -> f64,
{
    let mut best: Option<(f64, T)> = None;
    for item in items {
        let dist = (key(&item) - t).abs();
        match best {
            Some((best_dist, _)) if dist >= best_dist => {}
            _ => best = Some((dist, item)),
        }
    }
    best.filter(|(dist, _)| *dist <= tolerance).map(|(_, item)| item)
}

/// 1本の動画のキーポイント列（時刻順・読み取り専用のスナップショット）
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    records: Arc<[KeypointRecord]>,
}

impl Timeline {
    /// 時刻順に並べ替えてから保持する
    pub fn new(mut records: Vec<KeypointRecord>) -> Self {
        sort_by_timestamp(&mut records);
        Self {
            records: records.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[KeypointRecord] {
        &self.records
    }

    /// `t` に最も近いレコード（許容幅内のみ）
    ///
    /// 列は時刻順なので二分探索で前後2件だけを比べる。同距離なら前のレコード。
    pub fn nearest(&self, t: f64, tolerance: f64) -> Option<&KeypointRecord> {
        if t.is_nan() {
            return None;
        }
        let idx = self.records.partition_point(|r| r.timestamp < t);
        // 同時刻のレコードが並んでいるときはその先頭を候補にする
        let before = idx
            .checked_sub(1)
            .map(|i| {
                let ts = self.records[i].timestamp;
                self.records[..i].partition_point(|r| r.timestamp < ts)
            })
            .and_then(|i| self.records.get(i));
        let after = self.records.get(idx);
        nearest_within(before.into_iter().chain(after), t, tolerance, |r| r.timestamp)
    }

    /// 再生時間範囲 (最初, 最後)
    pub fn span(&self) -> Option<(f64, f64)> {
        let first = self.records.first()?;
        let last = self.records.last()?;
        Some((first.timestamp, last.timestamp))
    }
}
