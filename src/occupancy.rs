//! チャンクの使用状況の管理.
use fixedbitset::FixedBitSet;
use std::ops::Range;

/// 全サブプールのチャンクの使用状況を、チャンク毎に1bitで保持する構造体.
///
/// インデックス空間は`OffsetTable`と共有されており、
/// チャンクサイズの昇順に各サブプールの範囲が並んでいる.
///
/// 長さは構築時に一度だけ決定され、以後変わることはない.
/// 排他制御は行わないので、利用側でロックを取得した上で操作する必要がある.
#[derive(Debug, Clone)]
pub struct OccupancyTracker {
    bits: FixedBitSet,
}
impl OccupancyTracker {
    /// 全てのチャンクが未使用の状態の`OccupancyTracker`インスタンスを生成する.
    pub fn new(len: usize) -> Self {
        OccupancyTracker {
            bits: FixedBitSet::with_capacity(len),
        }
    }

    /// 管理対象のチャンクの数を返す.
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// 管理対象のチャンクが一つも無いかどうかを判定する.
    pub fn is_empty(&self) -> bool {
        self.bits.len() == 0
    }

    /// `index`番目のチャンクが使用中かどうかを判定する.
    ///
    /// 範囲外のインデックスに対しては`false`が返される.
    pub fn is_used(&self, index: usize) -> bool {
        self.bits.contains(index)
    }

    /// `index`番目のチャンクを使用中にする.
    ///
    /// # Panics
    ///
    /// `index`が範囲外の場合には、現在のスレッドがパニックする.
    pub fn mark_used(&mut self, index: usize) {
        self.bits.set(index, true);
    }

    /// `index`番目のチャンクを未使用にする.
    ///
    /// # Panics
    ///
    /// `index`が範囲外の場合には、現在のスレッドがパニックする.
    pub fn mark_free(&mut self, index: usize) {
        self.bits.set(index, false);
    }

    /// `range`の中で、最もインデックスが小さい未使用チャンクを探す.
    ///
    /// # Examples
    ///
    /// ```
    /// use mempool::occupancy::OccupancyTracker;
    ///
    /// let mut occupancy = OccupancyTracker::new(8);
    /// occupancy.mark_used(2);
    /// occupancy.mark_used(3);
    /// assert_eq!(occupancy.first_free(2..6), Some(4));
    /// assert_eq!(occupancy.first_free(2..4), None);
    /// ```
    pub fn first_free(&self, mut range: Range<usize>) -> Option<usize> {
        debug_assert!(range.end <= self.len(), "{:?}", range);
        range.find(|&i| !self.bits.contains(i))
    }

    /// 使用中のチャンクの数を返す.
    pub fn used(&self) -> usize {
        self.bits.count_ones(..)
    }

    /// `range`の中の使用中のチャンクの数を返す.
    pub fn used_in(&self, range: Range<usize>) -> usize {
        self.bits.count_ones(range)
    }
}
