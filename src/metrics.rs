//! [Prometheus][prometheus]用のメトリクス.
//!
//! [prometheus]: https://prometheus.io/
use prometrics::metrics::{Counter, Gauge, MetricBuilder};

/// メモリプールのメトリクス.
#[derive(Debug, Clone)]
pub struct MempoolMetrics {
    pub(crate) capacity_bytes: Gauge,
    pub(crate) capacity_chunks: Gauge,
    pub(crate) allocated_chunks: Counter,
    pub(crate) released_chunks: Counter,
    pub(crate) oversize_failures: Counter,
    pub(crate) nospace_failures: Counter,
    pub(crate) invalid_frees: Counter,
}
impl MempoolMetrics {
    /// アリーナのバイト数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// mempool_pool_capacity_bytes <GAUGE>
    /// ```
    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_bytes.value() as u64
    }

    /// 全サブプールのチャンク数の合計.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// mempool_pool_capacity_chunks <GAUGE>
    /// ```
    pub fn capacity_chunks(&self) -> u64 {
        self.capacity_chunks.value() as u64
    }

    /// チャンクの割当回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// mempool_pool_allocated_chunks_total <COUNTER>
    /// ```
    pub fn allocated_chunks(&self) -> u64 {
        self.allocated_chunks.value() as u64
    }

    /// チャンクの解放回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// mempool_pool_released_chunks_total <COUNTER>
    /// ```
    pub fn released_chunks(&self) -> u64 {
        self.released_chunks.value() as u64
    }

    /// 現在使用中のチャンクの数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// mempool_pool_allocated_chunks_total - mempool_pool_released_chunks_total
    /// ```
    pub fn in_use_chunks(&self) -> u64 {
        // NOTE: 以下の順番で値を取得しないとアンダーフローする可能性がある
        let dec = self.released_chunks();
        let inc = self.allocated_chunks();
        inc - dec
    }

    /// 要求サイズが最大のチャンクサイズを超えていたことによる割当失敗回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// mempool_pool_alloc_failures_total { reason="oversize" } <COUNTER>
    /// ```
    pub fn oversize_failures(&self) -> u64 {
        self.oversize_failures.value() as u64
    }

    /// サブプールに空きチャンクが無かったことによる割当失敗回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// mempool_pool_alloc_failures_total { reason="nospace" } <COUNTER>
    /// ```
    pub fn nospace_failures(&self) -> u64 {
        self.nospace_failures.value() as u64
    }

    /// 不正なアドレスに対する解放要求の回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// mempool_pool_invalid_frees_total <COUNTER>
    /// ```
    pub fn invalid_frees(&self) -> u64 {
        self.invalid_frees.value() as u64
    }

    pub(crate) fn new(builder: &MetricBuilder) -> Self {
        let mut builder = builder.clone();
        builder.namespace("mempool").subsystem("pool");
        MempoolMetrics {
            capacity_bytes: builder
                .gauge("capacity_bytes")
                .help("Size of the arena")
                .finish()
                .expect("Never fails"),
            capacity_chunks: builder
                .gauge("capacity_chunks")
                .help("Number of chunks in all sub-pools")
                .finish()
                .expect("Never fails"),
            allocated_chunks: builder
                .counter("allocated_chunks_total")
                .help("Number of allocated chunks")
                .finish()
                .expect("Never fails"),
            released_chunks: builder
                .counter("released_chunks_total")
                .help("Number of released chunks")
                .finish()
                .expect("Never fails"),
            oversize_failures: builder
                .counter("alloc_failures_total")
                .help("Number of allocation failures")
                .label("reason", "oversize")
                .finish()
                .expect("Never fails"),
            nospace_failures: builder
                .counter("alloc_failures_total")
                .help("Number of allocation failures")
                .label("reason", "nospace")
                .finish()
                .expect("Never fails"),
            invalid_frees: builder
                .counter("invalid_frees_total")
                .help("Number of rejected free requests")
                .finish()
                .expect("Never fails"),
        }
    }
}
