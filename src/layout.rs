//! サブプール群のレイアウト計算.
//!
//! 各サブプールは、チャンクサイズの昇順に、
//! 占有状況のインデックス空間`[0, total_chunks)`とアリーナのバイト空間`[0, total_bytes)`を
//! 隙間なく分割して担当する.
use std::collections::BTreeMap;

use crate::config::MempoolConfig;

/// 一つのサブプールが担当する範囲の開始位置.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Offset {
    /// サブプールの最初のチャンクの(全サブプール共通の)インデックス.
    pub index: usize,

    /// サブプールの最初のチャンクの、アリーナ先頭からのバイトオフセット.
    pub address: usize,
}

/// チャンクサイズから`Offset`へのマップ.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OffsetTable(BTreeMap<usize, Offset>);
impl OffsetTable {
    /// サブプール群のオフセットテーブルを計算する.
    ///
    /// `config`はチャンクサイズの昇順に並んでいる必要がある.
    ///
    /// # Examples
    ///
    /// ```
    /// use mempool::config::{MempoolConfig, SubPoolDescriptor};
    /// use mempool::layout::{Offset, OffsetTable};
    ///
    /// let config = MempoolConfig::new(vec![SubPoolDescriptor::new(2, 512),
    ///                                      SubPoolDescriptor::new(2, 1024)]);
    /// let table = OffsetTable::new(&config);
    /// assert_eq!(table.get(512), Some(Offset { index: 0, address: 0 }));
    /// assert_eq!(table.get(1024), Some(Offset { index: 2, address: 1024 }));
    /// ```
    pub fn new(config: &MempoolConfig) -> Self {
        debug_assert!(config.is_sorted(), "{}", config);

        let mut table = BTreeMap::new();
        let mut offset = Offset::default();
        for sub_pool in config {
            table.insert(sub_pool.chunk_size, offset);
            offset.index += sub_pool.chunk_amount;
            offset.address += sub_pool.bytes();
        }
        OffsetTable(table)
    }

    /// `chunk_size`を持つサブプールのオフセットを返す.
    pub fn get(&self, chunk_size: usize) -> Option<Offset> {
        self.0.get(&chunk_size).cloned()
    }

    /// `(chunk_size, offset)`のペアを、チャンクサイズの昇順に走査するためのイテレータを返す.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (usize, Offset)> + '_ {
        self.0.iter().map(|(&size, &offset)| (size, offset))
    }

    /// エントリの数を返す.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// エントリが一つも無いかどうかを判定する.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// アリーナ先頭から`byte_offset`の位置を含むサブプールを探す.
    ///
    /// チャンクサイズの降順に走査して、最初に`offset.address <= byte_offset`を満たしたものを返す.
    /// オフセットはチャンクサイズに対して単調増加なので、これが`byte_offset`を含む範囲となる.
    /// (チャンク数が`0`のサブプールは、後続のサブプールと開始位置が重なるが、後続の方が先に見つかる)
    ///
    /// `byte_offset`がアリーナの範囲内かどうかは検査しない.
    pub fn resolve(&self, byte_offset: usize) -> Option<(usize, Offset)> {
        self.iter()
            .rev()
            .find(|(_, offset)| offset.address <= byte_offset)
    }
}
