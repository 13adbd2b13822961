use prometrics::metrics::MetricBuilder;
use slog::{Discard, Logger};
use std::sync::Mutex;

use super::{ChunkStats, Mempool, PoolState};
use crate::arena::{Alignment, Arena};
use crate::config::MempoolConfig;
use crate::layout::OffsetTable;
use crate::metrics::MempoolMetrics;
use crate::occupancy::OccupancyTracker;
use crate::{ErrorKind, Result};

/// `Mempool`のビルダ.
#[derive(Debug, Clone)]
pub struct MempoolBuilder {
    total_limit: usize,
    smallest_alignment: usize,
    metrics: MetricBuilder,
    logger: Logger,
}
impl MempoolBuilder {
    /// 新しい`MempoolBuilder`インスタンスを生成する.
    pub fn new() -> Self {
        MempoolBuilder {
            total_limit: Mempool::DEFAULT_TOTAL_LIMIT,
            smallest_alignment: Alignment::MIN,
            metrics: MetricBuilder::new(),
            logger: Logger::root(Discard, o!()),
        }
    }

    /// 全サブプールの合計バイト数の上限を設定する.
    ///
    /// 構成の合計バイト数がこの値を超えている場合には、構築に失敗する.
    ///
    /// デフォルト値は`Mempool::DEFAULT_TOTAL_LIMIT`.
    pub fn total_limit(&mut self, bytes: usize) -> &mut Self {
        self.total_limit = bytes;
        self
    }

    /// 許容するアライメントの最小値を設定する.
    ///
    /// `Alignment::MIN`未満の値が指定された場合でも、`Alignment::MIN`未満のアライメントは常に拒否される.
    ///
    /// デフォルト値は`Alignment::MIN`.
    pub fn smallest_alignment(&mut self, bytes: usize) -> &mut Self {
        self.smallest_alignment = bytes;
        self
    }

    /// メトリクス用の共通設定を登録する.
    ///
    /// デフォルト値は`MetricBuilder::new()`.
    pub fn metrics(&mut self, metrics: MetricBuilder) -> &mut Self {
        self.metrics = metrics;
        self
    }

    /// メモリプール用の logger を登録する.
    ///
    /// デフォルトでは、ログは出力されずに捨てられる.
    pub fn logger(&mut self, logger: Logger) -> &mut Self {
        self.logger = logger;
        self
    }

    /// 指定の構成とアライメントで、メモリプールを構築する.
    ///
    /// # Errors
    ///
    /// 以下のいずれかの場合には、種類が`ErrorKind::InvalidConfig`のエラーが返される:
    ///
    /// - `alignment`が許容される最小値未満
    /// - いずれかのチャンクサイズが`0`、あるいは`alignment`の倍数ではない
    /// - 同じチャンクサイズを持つサブプールが複数存在する
    /// - 全サブプールの合計バイト数が上限を超えている
    ///
    /// アリーナ用の領域が確保できなかった場合には、種類が`ErrorKind::OutOfMemory`のエラーが返される.
    pub fn finish<C>(&self, config: C, alignment: usize) -> Result<Mempool>
    where
        C: Into<MempoolConfig>,
    {
        let mut config = config.into();
        track_assert!(
            alignment >= self.smallest_alignment,
            ErrorKind::InvalidConfig,
            "Provided alignment '{}' is smaller than the smallest possible one '{}'",
            alignment,
            self.smallest_alignment
        );
        let alignment = track!(Alignment::new(alignment))?;

        config.sort();
        for sub_pool in &config {
            track_assert!(
                sub_pool.chunk_size != 0 && alignment.is_aligned(sub_pool.chunk_size),
                ErrorKind::InvalidConfig,
                "Chunk size of sub-pool '{}' is not a positive multiple of alignment '{}'",
                sub_pool,
                alignment.as_usize()
            );
        }
        for w in config.sub_pools().windows(2) {
            track_assert!(
                w[0].chunk_size != w[1].chunk_size,
                ErrorKind::InvalidConfig,
                "Duplicate chunk size. Config: '{}'",
                config
            );
        }

        let total_size = config.total_size();
        track_assert!(
            total_size.bytes <= self.total_limit,
            ErrorKind::InvalidConfig,
            "Sum of all chunks '{}' is bigger than total limit '{}'. Config: '{}'",
            total_size.bytes,
            self.total_limit,
            config
        );

        let offsets = OffsetTable::new(&config);
        let arena = track!(Arena::new(total_size.bytes, alignment))?;
        let state = PoolState {
            occupancy: OccupancyTracker::new(total_size.chunks),
            stats: config.iter().map(ChunkStats::new).collect(),
        };

        let metrics = MempoolMetrics::new(&self.metrics);
        metrics.capacity_bytes.set(total_size.bytes as f64);
        metrics.capacity_chunks.set(total_size.chunks as f64);

        info!(
            self.logger,
            "Memory pool is created";
            "config" => %config,
            "alignment" => alignment.as_usize(),
            "chunks" => total_size.chunks,
            "bytes" => total_size.bytes
        );
        Ok(Mempool {
            config,
            alignment,
            total_size,
            offsets,
            arena,
            state: Mutex::new(state),
            metrics,
            logger: self.logger.clone(),
        })
    }
}
impl Default for MempoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}
