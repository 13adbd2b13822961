//! Fixed-capacity Memory Pool.
//!
//! `mempool`は、予測可能なレイテンシでのメモリ割当を目的として設計された、固定容量のメモリプール.
//!
//! # 特徴
//!
//! - 複数のサイズクラス(サブプール)を持ち、各サブプールは固定サイズのチャンクを固定個数だけ保持する
//! - 全サブプールの領域は、一つの連続した(アライメント済みの)アリーナ上に配置される
//!   - 構築後にアリーナが拡張・縮小されることは無い
//!   - 断片化は発生しない
//! - 割当要求に対しては、要求サイズを収容可能な最小のサブプールが選択され、
//!   その中で一番インデックスが小さい空きチャンクが割り当てられる
//! - `alloc`および`free`はスレッドセーフ(インスタンス毎に一つのロックで直列化される)
//! - 構築時の構成不正はエラーとして、実行時の割当・解放失敗は`None`として通知される
//!
//! # モジュールの依存関係
//!
//! ```text
//! pool => layout => config
//!      => occupancy
//!      => arena
//! ```
//!
//! - [pool]モジュール:
//!   - 主に[Mempool]構造体を提供
//!   - `mempool`の利用者が直接触るのはこの構造体
//! - [layout]モジュール:
//!   - 各サブプールが担当するチャンクインデックスおよびバイト範囲を計算する
//! - [occupancy]モジュール:
//!   - 各チャンクの使用状況を1bitで管理する
//! - [arena]モジュール:
//!   - アライメント済みのバッファを所有する
//! - [config]モジュール:
//!   - サブプール群の構成を表現する
//!
//! # Examples
//!
//! ```
//! use mempool::config::SubPoolDescriptor;
//! use mempool::pool::Mempool;
//!
//! let config = vec![SubPoolDescriptor::new(2, 1024), SubPoolDescriptor::new(2, 512)];
//! let pool = Mempool::new(config, 64).unwrap();
//!
//! let ptr = pool.alloc(666).unwrap();
//! assert_eq!(ptr.as_ptr() as usize % 64, 0);
//! assert_eq!(pool.free(ptr.as_ptr()), Some(ptr));
//! ```
//!
//! [pool]: ./pool/index.html
//! [Mempool]: ./pool/struct.Mempool.html
//! [layout]: ./layout/index.html
//! [occupancy]: ./occupancy/index.html
//! [arena]: ./arena/index.html
//! [config]: ./config/index.html
#![warn(missing_docs)]
extern crate fixedbitset;
extern crate prometrics;
#[macro_use]
extern crate trackable;
#[macro_use]
extern crate slog;

pub use crate::error::{Error, ErrorKind};

pub mod arena;
pub mod config;
pub mod layout;
pub mod metrics;
pub mod occupancy;
pub mod pool;

mod error;

/// crate固有の`Result`型.
pub type Result<T> = std::result::Result<T, Error>;
