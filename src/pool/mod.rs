//! メモリプール本体.
//!
//! # 割当戦略
//!
//! 割当要求に対しては、要求サイズ以上のチャンクサイズを持つサブプールの中で、
//! 一番チャンクサイズが小さいものが選択される.
//! (サブプールを跨いだBestFitは行わないので、選択されたサブプールに空きが無い場合には、
//! より大きなサブプールに空きがあったとしても割当は失敗する)
//!
//! 選択されたサブプールの中では、インデックスが一番小さい空きチャンクが割り当てられる.
//! そのため、解放直後のチャンクは、同じサブプールへの次の割当要求で再利用される.
use slog::Logger;
use std::ptr::NonNull;
use std::sync::{Mutex, MutexGuard, PoisonError};

pub use self::builder::MempoolBuilder;

use crate::arena::{Alignment, Arena};
use crate::config::{MempoolConfig, SubPoolDescriptor, TotalSize};
use crate::layout::OffsetTable;
use crate::metrics::MempoolMetrics;
use crate::occupancy::OccupancyTracker;
use crate::Result;

mod builder;

/// 固定容量のメモリプール.
///
/// 構築時に全サブプール分の領域を一つのアリーナとして確保し、
/// 以後は`alloc`と`free`によって、その中のチャンクの割当と解放を行う.
///
/// `alloc`と`free`は複数スレッドから同時に呼び出し可能(インスタンス毎のロックで直列化される).
///
/// # 注意
///
/// インスタンスが破棄されるとアリーナも解放されるので、
/// それ以降は`alloc`で得たアドレスにアクセスしてはいけない.
#[derive(Debug)]
pub struct Mempool {
    config: MempoolConfig,
    alignment: Alignment,
    total_size: TotalSize,
    offsets: OffsetTable,
    arena: Arena,
    state: Mutex<PoolState>,
    metrics: MempoolMetrics,
    logger: Logger,
}
impl Mempool {
    /// 全サブプールの合計バイト数の上限のデフォルト値.
    pub const DEFAULT_TOTAL_LIMIT: usize = 2048 * 1024;

    /// デフォルト設定でメモリプールを構築する.
    ///
    /// `MempoolBuilder::new().finish(config, alignment)`と等しい.
    ///
    /// # Examples
    ///
    /// ```
    /// use mempool::ErrorKind;
    /// use mempool::config::SubPoolDescriptor;
    /// use mempool::pool::Mempool;
    ///
    /// let config = vec![SubPoolDescriptor::new(1024, 1024), SubPoolDescriptor::new(1024, 512)];
    /// assert!(Mempool::new(config, 64).is_ok());
    ///
    /// // 合計サイズが上限を超えている
    /// let config = vec![SubPoolDescriptor::new(1024, 1024), SubPoolDescriptor::new(1024, 2048)];
    /// assert_eq!(Mempool::new(config, 64).err().map(|e| *e.kind()),
    ///            Some(ErrorKind::InvalidConfig));
    /// ```
    pub fn new<C>(config: C, alignment: usize) -> Result<Self>
    where
        C: Into<MempoolConfig>,
    {
        track!(MempoolBuilder::new().finish(config, alignment))
    }

    /// `size`バイト以上のチャンクを割り当てる.
    ///
    /// 以下の場合には`None`が返される:
    ///
    /// - `size`が最大のチャンクサイズを超えている
    /// - 選択されたサブプールに空きチャンクが無い
    ///
    /// 返されるアドレスは、常にアライメント境界に沿っている.
    pub fn alloc(&self, size: usize) -> Option<NonNull<u8>> {
        let class = match self.config.iter().position(|p| size <= p.chunk_size) {
            Some(class) => class,
            None => {
                debug!(self.logger, "Too large allocation request"; "size" => size);
                self.metrics.oversize_failures.increment();
                return None;
            }
        };
        let sub_pool = self.config.sub_pools()[class];
        let offset = self.offsets.get(sub_pool.chunk_size)?;

        let slot = {
            let mut state = self.lock_state();
            let range = offset.index..offset.index + sub_pool.chunk_amount;
            if let Some(index) = state.occupancy.first_free(range) {
                state.occupancy.mark_used(index);
                state.stats[class].count_allocation();
                Some(index - offset.index)
            } else {
                None
            }
        };
        let slot = match slot {
            Some(slot) => slot,
            None => {
                debug!(self.logger, "No free chunk"; "size" => size, "sub_pool" => %sub_pool);
                self.metrics.nospace_failures.increment();
                return None;
            }
        };
        self.metrics.allocated_chunks.increment();
        Some(self.arena.address(offset.address + slot * sub_pool.chunk_size))
    }

    /// `ptr`が指すチャンクを解放する.
    ///
    /// 解放に成功した場合には`ptr`が、そうではない場合には`None`が返される.
    /// 以下の場合には解放に失敗し、メモリプールの状態は一切変更されない:
    ///
    /// - `ptr`がアリーナの範囲外
    /// - `ptr`がアライメント境界に沿っていない
    /// - `ptr`がチャンクの先頭ではない
    /// - `ptr`が指すチャンクが割当済みではない
    ///
    /// # 事前条件
    ///
    /// - `ptr`はこのインスタンスの`alloc`によって以前に割り当てられたアドレスである
    pub fn free(&self, ptr: *mut u8) -> Option<NonNull<u8>> {
        let byte_offset = match self.arena.offset_of(ptr) {
            Some(byte_offset) => byte_offset,
            None => return self.reject_free(ptr, "out of the arena"),
        };
        if !self.alignment.is_aligned(byte_offset) {
            return self.reject_free(ptr, "misaligned");
        }

        // 範囲とアライメントの検査を通過していれば、所有するサブプールは必ず見つかる
        let (chunk_size, offset) = match self.offsets.resolve(byte_offset) {
            Some(entry) => entry,
            None => return self.reject_free(ptr, "no sub-pool owns the address"),
        };
        let relative = byte_offset - offset.address;
        if relative % chunk_size != 0 {
            return self.reject_free(ptr, "not a chunk boundary");
        }
        let index = offset.index + relative / chunk_size;
        let class = match self.config.position(chunk_size) {
            Some(class) => class,
            None => return self.reject_free(ptr, "unknown chunk size"),
        };

        {
            let mut state = self.lock_state();
            if !state.occupancy.is_used(index) {
                drop(state);
                return self.reject_free(ptr, "not allocated");
            }
            state.occupancy.mark_free(index);
            state.stats[class].count_release();
        }
        self.metrics.released_chunks.increment();
        NonNull::new(ptr)
    }

    /// `ptr`がアリーナの範囲内にあるかどうかを判定する.
    pub fn contains(&self, ptr: *const u8) -> bool {
        self.arena.contains(ptr)
    }

    /// チャンクサイズの昇順に並び替え済みの構成を返す.
    pub fn config(&self) -> &MempoolConfig {
        &self.config
    }

    /// アライメントを返す.
    pub fn alignment(&self) -> Alignment {
        self.alignment
    }

    /// 全サブプールの合計サイズを返す.
    pub fn total_size(&self) -> TotalSize {
        self.total_size
    }

    /// オフセットテーブルを返す.
    pub fn offset_table(&self) -> &OffsetTable {
        &self.offsets
    }

    /// 各サブプールの使用状況を、チャンクサイズの昇順で返す.
    pub fn stats(&self) -> Vec<ChunkStats> {
        self.lock_state().stats.clone()
    }

    /// 使用中のチャンクの数を返す.
    pub fn used_chunks(&self) -> usize {
        self.lock_state().occupancy.used()
    }

    /// メモリプールのメトリクスを返す.
    pub fn metrics(&self) -> &MempoolMetrics {
        &self.metrics
    }

    // 状態の更新は全ての検査を通過した後に行っているので、
    // ロックがポイゾニングしていても内部状態の整合性は保たれている.
    fn lock_state(&self) -> MutexGuard<PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reject_free(&self, ptr: *mut u8, reason: &str) -> Option<NonNull<u8>> {
        debug!(self.logger, "Invalid free request";
               "ptr" => format!("{:p}", ptr), "reason" => reason);
        self.metrics.invalid_frees.increment();
        None
    }
}
impl Drop for Mempool {
    fn drop(&mut self) {
        let state = self.lock_state();
        for stats in &state.stats {
            info!(self.logger, "Sub-pool usage";
                  "chunk_size" => stats.chunk_size,
                  "chunk_amount" => stats.chunk_amount,
                  "counter" => stats.counter,
                  "max_usage" => stats.max_usage);
        }
    }
}

/// サブプール毎の使用状況.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkStats {
    /// サブプールのチャンクサイズ.
    pub chunk_size: usize,

    /// サブプールのチャンク数.
    pub chunk_amount: usize,

    /// 現在割当中のチャンク数.
    pub counter: usize,

    /// これまでの`counter`の最大値.
    pub max_usage: usize,
}
impl ChunkStats {
    fn new(sub_pool: &SubPoolDescriptor) -> Self {
        ChunkStats {
            chunk_size: sub_pool.chunk_size,
            chunk_amount: sub_pool.chunk_amount,
            counter: 0,
            max_usage: 0,
        }
    }

    fn count_allocation(&mut self) {
        self.counter += 1;
        if self.counter > self.max_usage {
            self.max_usage = self.counter;
        }
    }

    fn count_release(&mut self) {
        debug_assert!(self.counter > 0);
        self.counter -= 1;
    }
}

#[derive(Debug)]
struct PoolState {
    occupancy: OccupancyTracker,
    stats: Vec<ChunkStats>,
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::ptr;
    use std::slice;
    use std::sync::Arc;
    use std::thread;
    use trackable::result::TestResult;

    use super::*;
    use crate::ErrorKind;

    #[test]
    fn construction_works() -> TestResult {
        track!(Mempool::new(MempoolConfig::default(), 64))?;
        track!(Mempool::new(config(&[(1024, 1024), (1024, 512)]), 64))?;
        Ok(())
    }

    #[test]
    fn too_small_alignment() {
        let e = Mempool::new(config(&[(1024, 1024), (1024, 2048)]), 0).err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::InvalidConfig));
    }

    #[test]
    fn chunk_size_not_multiple_of_alignment() {
        let e = Mempool::new(config(&[(4, 1024), (4, 100)]), 64).err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::InvalidConfig));
    }

    #[test]
    fn exceeds_total_limit() {
        let e = Mempool::new(config(&[(1024, 1024), (1024, 2048)]), 64).err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::InvalidConfig));
    }

    #[test]
    fn empty_pool_never_allocates() -> TestResult {
        let pool = track!(Mempool::new(MempoolConfig::default(), 64))?;
        assert_eq!(pool.alloc(0), None);
        assert_eq!(pool.alloc(1), None);
        assert_eq!(pool.free(ptr::null_mut()), None);
        assert_eq!(pool.total_size(), TotalSize::default());
        assert!(pool.stats().is_empty());
        Ok(())
    }

    #[test]
    fn alloc_works() -> TestResult {
        let pool = track!(Mempool::new(config(&[(2, 1024), (2, 512)]), 64))?;

        let a = pool.alloc(666).unwrap();
        assert_eq!(pool.alloc(777).map(addr), Some(addr(a) + 1024));
        assert_eq!(pool.alloc(777), None);

        let b = pool.alloc(420).unwrap();
        assert_eq!(pool.alloc(200).map(addr), Some(addr(b) + 512));
        assert_eq!(pool.alloc(42), None);

        // 512のサブプールは1024のサブプールの前に配置される
        assert_eq!(addr(b), addr(a) - 2 * 512);
        Ok(())
    }

    #[test]
    fn empty_config_with_huge_alignment() -> TestResult {
        let pool = track!(Mempool::new(MempoolConfig::default(), 1 << 44))?;
        assert_eq!(pool.alloc(1), None);
        assert_eq!(pool.total_size().bytes, 0);

        let pool = track!(Mempool::new(config(&[(0, 1 << 44)]), 1 << 44))?;
        assert_eq!(pool.alloc(1), None);
        assert_eq!(pool.metrics().nospace_failures(), 1);
        Ok(())
    }

    #[test]
    fn empty_sub_pool_does_not_fall_through() -> TestResult {
        let pool = track!(Mempool::new(config(&[(0, 64), (2, 128)]), 64))?;
        assert_eq!(pool.alloc(32), None);
        assert_eq!(pool.alloc(64), None);
        assert_eq!(pool.metrics().nospace_failures(), 2);

        let ptr = pool.alloc(65).unwrap();
        assert_eq!(pool.stats()[0], chunk_stats(64, 0, 0, 0));
        assert_eq!(pool.stats()[1], chunk_stats(128, 2, 1, 1));
        assert_eq!(pool.free(ptr.as_ptr()), Some(ptr));
        Ok(())
    }

    #[test]
    fn alloc_too_large() -> TestResult {
        let pool = track!(Mempool::new(config(&[(1024, 1024), (1024, 512)]), 64))?;
        assert!(pool.alloc(512).is_some());
        assert_eq!(pool.alloc(1025), None);
        assert_eq!(pool.alloc(2048), None);
        assert_eq!(pool.metrics().oversize_failures(), 2);
        Ok(())
    }

    #[test]
    fn alloc_returns_aligned_addresses_in_the_arena() -> TestResult {
        for &alignment in &[1, 16, 48, 64, 4096] {
            let pool = track!(Mempool::new(
                config(&[(3, alignment), (2, alignment * 3), (5, alignment * 8)]),
                alignment
            ))?;
            let base = addr(pool.arena.base());
            let end = base + pool.total_size().bytes;
            for &size in &[1, alignment, alignment * 2, alignment * 8] {
                while let Some(ptr) = pool.alloc(size) {
                    assert!(base <= addr(ptr) && addr(ptr) + size <= end);
                    assert_eq!(addr(ptr) % alignment, 0);
                    assert!(pool.contains(ptr.as_ptr()));
                }
            }
            assert_eq!(pool.used_chunks(), pool.total_size().chunks);
        }
        Ok(())
    }

    #[test]
    fn exhausted_sub_pool_does_not_affect_others() -> TestResult {
        let pool = track!(Mempool::new(config(&[(3, 64), (2, 256)]), 64))?;
        for _ in 0..3 {
            assert!(pool.alloc(64).is_some());
        }
        assert_eq!(pool.alloc(64), None);
        assert_eq!(pool.alloc(1), None);
        assert!(pool.alloc(65).is_some());
        assert!(pool.alloc(256).is_some());
        assert_eq!(pool.alloc(100), None);
        assert_eq!(pool.metrics().nospace_failures(), 3);
        Ok(())
    }

    #[test]
    fn free_works() -> TestResult {
        let pool = track!(Mempool::new(config(&[(1024, 1024), (1024, 512)]), 64))?;
        let ptr = pool.alloc(512).unwrap();
        assert_eq!(pool.free(ptr.as_ptr()), Some(ptr));
        assert_eq!(pool.used_chunks(), 0);
        assert_eq!(pool.metrics().in_use_chunks(), 0);
        Ok(())
    }

    #[test]
    fn freed_chunk_is_reused() -> TestResult {
        let pool = track!(Mempool::new(config(&[(4, 128), (4, 1024)]), 64))?;
        let a = pool.alloc(1000).unwrap();
        let b = pool.alloc(1000).unwrap();
        let c = pool.alloc(1000).unwrap();

        assert_eq!(pool.free(b.as_ptr()), Some(b));
        assert_eq!(pool.alloc(129), Some(b));

        assert_eq!(pool.free(c.as_ptr()), Some(c));
        assert_eq!(pool.free(a.as_ptr()), Some(a));
        assert_eq!(pool.alloc(1024), Some(a));
        assert_eq!(pool.alloc(1024), Some(c));
        Ok(())
    }

    #[test]
    fn free_out_of_the_arena() -> TestResult {
        let pool = track!(Mempool::new(config(&[(1024, 1024), (1024, 512)]), 64))?;
        let ptr = pool.alloc(512).unwrap();

        assert_eq!(pool.free(ptr.as_ptr().wrapping_sub(10)), None);
        assert_eq!(pool.free(ptr.as_ptr().wrapping_sub(64)), None);
        let end = addr(pool.arena.base()) + pool.total_size().bytes;
        assert_eq!(pool.free(end as *mut u8), None);
        assert_eq!(pool.free(ptr::null_mut()), None);

        assert_eq!(pool.used_chunks(), 1);
        assert_eq!(pool.stats()[0].counter, 1);
        assert_eq!(pool.metrics().invalid_frees(), 4);
        Ok(())
    }

    #[test]
    fn free_misaligned() -> TestResult {
        let pool = track!(Mempool::new(config(&[(2, 1024), (2, 512)]), 64))?;
        let ptr = pool.alloc(512).unwrap();

        assert_eq!(pool.free(ptr.as_ptr().wrapping_add(10)), None);
        assert_eq!(pool.used_chunks(), 1);
        assert_eq!(pool.stats()[0].counter, 1);
        Ok(())
    }

    #[test]
    fn free_inside_a_chunk() -> TestResult {
        let pool = track!(Mempool::new(config(&[(2, 1024), (2, 512)]), 64))?;
        let small = pool.alloc(512).unwrap();
        let large = pool.alloc(1024).unwrap();

        // アライメント境界には沿っているが、チャンクの先頭ではない
        assert_eq!(pool.free(small.as_ptr().wrapping_add(64)), None);
        assert_eq!(pool.free(large.as_ptr().wrapping_add(512)), None);
        assert_eq!(pool.used_chunks(), 2);
        Ok(())
    }

    #[test]
    fn double_free() -> TestResult {
        let pool = track!(Mempool::new(config(&[(2, 512)]), 64))?;
        let a = pool.alloc(512).unwrap();
        let b = pool.alloc(512).unwrap();

        assert_eq!(pool.free(a.as_ptr()), Some(a));
        assert_eq!(pool.free(a.as_ptr()), None);
        assert_eq!(pool.stats()[0].counter, 1);

        assert_eq!(pool.free(b.as_ptr()), Some(b));
        assert_eq!(pool.stats()[0].counter, 0);
        assert_eq!(pool.metrics().invalid_frees(), 1);
        Ok(())
    }

    #[test]
    fn free_with_inconsistent_config_is_rejected() -> TestResult {
        let mut pool = track!(Mempool::new(config(&[(2, 512)]), 64))?;
        let ptr = pool.alloc(512).unwrap();

        // オフセットテーブルには存在するが、構成には存在しないチャンクサイズ
        pool.config = config(&[(2, 1024)]);
        assert_eq!(pool.free(ptr.as_ptr()), None);
        assert_eq!(pool.metrics().invalid_frees(), 1);
        assert_eq!(pool.used_chunks(), 1);
        Ok(())
    }

    #[test]
    fn stats_track_peak_usage() -> TestResult {
        let pool = track!(Mempool::new(config(&[(4, 64), (2, 128)]), 64))?;
        let ptrs = (0..3).filter_map(|_| pool.alloc(64)).collect::<Vec<_>>();
        assert_eq!(ptrs.len(), 3);
        for ptr in &ptrs {
            assert!(pool.free(ptr.as_ptr()).is_some());
        }
        let ptr = pool.alloc(100).unwrap();
        let _ = pool.alloc(1).unwrap();

        let stats = pool.stats();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0], chunk_stats(64, 4, 1, 3));
        assert_eq!(stats[1], chunk_stats(128, 2, 1, 1));

        assert!(pool.free(ptr.as_ptr()).is_some());
        assert_eq!(pool.stats()[1], chunk_stats(128, 2, 0, 1));

        let m = pool.metrics();
        assert_eq!(m.allocated_chunks(), 5);
        assert_eq!(m.released_chunks(), 4);
        assert_eq!(m.in_use_chunks(), 1);
        Ok(())
    }

    #[test]
    fn chunks_are_writable() -> TestResult {
        let pool = track!(Mempool::new(config(&[(8, 64), (8, 256)]), 64))?;
        let mut ptrs = Vec::new();
        for i in 0..16 {
            let size = if i % 2 == 0 { 64 } else { 256 };
            let ptr = pool.alloc(size).unwrap();
            unsafe { ptr::write_bytes(ptr.as_ptr(), i as u8, size) };
            ptrs.push((ptr, size, i as u8));
        }
        for (ptr, size, tag) in ptrs {
            let bytes = unsafe { slice::from_raw_parts(ptr.as_ptr(), size) };
            assert!(bytes.iter().all(|&b| b == tag));
        }
        Ok(())
    }

    #[test]
    fn concurrent_alloc_and_free() -> TestResult {
        let pool = Arc::new(track!(Mempool::new(config(&[(32, 64), (32, 256)]), 64))?);
        let handles = (0..8)
            .map(|t| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    let mut live = Vec::new();
                    for i in 0..2000 {
                        let size = if (t + i) % 3 == 0 { 256 } else { 64 };
                        if let Some(ptr) = pool.alloc(size) {
                            let tag = t as u8;
                            unsafe { ptr::write_bytes(ptr.as_ptr(), tag, size) };
                            live.push((ptr.as_ptr() as usize, size, tag));
                        }
                        if live.len() > 4 || (i % 5 == 0 && !live.is_empty()) {
                            let (ptr, size, tag) = live.remove(0);
                            let bytes = unsafe { slice::from_raw_parts(ptr as *const u8, size) };
                            assert!(bytes.iter().all(|&b| b == tag));
                            assert!(pool.free(ptr as *mut u8).is_some());
                        }
                    }
                    live
                })
            })
            .collect::<Vec<_>>();

        let mut seen = HashSet::new();
        let mut live_count = 0;
        for handle in handles {
            let live = handle.join().expect("Thread panicked");
            for (ptr, size, tag) in live {
                assert!(seen.insert(ptr), "Same chunk is allocated twice");
                let bytes = unsafe { slice::from_raw_parts(ptr as *const u8, size) };
                assert!(bytes.iter().all(|&b| b == tag));
                live_count += 1;
            }
        }
        assert_eq!(pool.used_chunks(), live_count);
        assert_eq!(
            pool.stats().iter().map(|s| s.counter).sum::<usize>(),
            live_count
        );
        for &ptr in &seen {
            assert!(pool.free(ptr as *mut u8).is_some());
        }
        assert_eq!(pool.used_chunks(), 0);
        Ok(())
    }

    fn config(sub_pools: &[(usize, usize)]) -> MempoolConfig {
        sub_pools.iter().cloned().map(SubPoolDescriptor::from).collect()
    }

    fn addr(ptr: NonNull<u8>) -> usize {
        ptr.as_ptr() as usize
    }

    fn chunk_stats(
        chunk_size: usize,
        chunk_amount: usize,
        counter: usize,
        max_usage: usize,
    ) -> ChunkStats {
        ChunkStats {
            chunk_size,
            chunk_amount,
            counter,
            max_usage,
        }
    }
}
