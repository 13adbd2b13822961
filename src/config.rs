//! メモリプールの構成.
use std::fmt;
use std::iter::FromIterator;
use std::slice;
use std::str::FromStr;
use trackable::error::ErrorKindExt;

use crate::{Error, ErrorKind, Result};

/// 一つのサブプール(サイズクラス)の記述子.
///
/// サブプールは`chunk_size`バイトのチャンクを`chunk_amount`個保持する.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubPoolDescriptor {
    /// チャンクの個数.
    pub chunk_amount: usize,

    /// 各チャンクのバイト数.
    ///
    /// メモリプールのアライメントの倍数である必要がある.
    pub chunk_size: usize,
}
impl SubPoolDescriptor {
    /// 新しい`SubPoolDescriptor`インスタンスを生成する.
    pub fn new(chunk_amount: usize, chunk_size: usize) -> Self {
        SubPoolDescriptor {
            chunk_amount,
            chunk_size,
        }
    }

    /// サブプールが占めるバイト数を返す.
    ///
    /// オーバーフローする場合には`usize::MAX`に丸められる.
    pub fn bytes(&self) -> usize {
        self.chunk_amount.saturating_mul(self.chunk_size)
    }
}
impl From<(usize, usize)> for SubPoolDescriptor {
    fn from((chunk_amount, chunk_size): (usize, usize)) -> Self {
        SubPoolDescriptor::new(chunk_amount, chunk_size)
    }
}
impl FromStr for SubPoolDescriptor {
    type Err = Error;

    /// `"{chunk_amount}x{chunk_size}"`形式の文字列から`SubPoolDescriptor`を生成する.
    ///
    /// `x`の前後の空白は無視される.
    ///
    /// # Errors
    ///
    /// 文字列が上記の形式に沿っていない場合には、種類が`ErrorKind::InvalidConfig`のエラーが返される.
    ///
    /// # Examples
    ///
    /// ```
    /// use mempool::ErrorKind;
    /// use mempool::config::SubPoolDescriptor;
    ///
    /// assert_eq!("2x1024".parse::<SubPoolDescriptor>().ok(),
    ///            Some(SubPoolDescriptor::new(2, 1024)));
    /// assert_eq!("16x 64".parse::<SubPoolDescriptor>().ok(),
    ///            Some(SubPoolDescriptor::new(16, 64)));
    ///
    /// assert_eq!("1024".parse::<SubPoolDescriptor>().err().map(|e| *e.kind()),
    ///            Some(ErrorKind::InvalidConfig));
    /// ```
    fn from_str(s: &str) -> Result<Self> {
        let mut tokens = s.splitn(2, 'x');
        let chunk_amount = tokens.next().unwrap_or("").trim();
        let chunk_size = track_assert_some!(
            tokens.next(),
            ErrorKind::InvalidConfig,
            "Sub-pool must be written as '<amount>x<size>': {:?}",
            s
        )
        .trim();

        let chunk_amount = track!(chunk_amount
            .parse::<usize>()
            .map_err(|e| ErrorKind::InvalidConfig.cause(e)); s)?;
        let chunk_size = track!(chunk_size
            .parse::<usize>()
            .map_err(|e| ErrorKind::InvalidConfig.cause(e)); s)?;
        Ok(SubPoolDescriptor::new(chunk_amount, chunk_size))
    }
}
impl fmt::Display for SubPoolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}x {}", self.chunk_amount, self.chunk_size)
    }
}

/// 全サブプールの合計サイズ.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TotalSize {
    /// チャンク数の合計.
    pub chunks: usize,

    /// バイト数の合計.
    pub bytes: usize,
}
impl TotalSize {
    /// サブプール群の合計サイズを計算する.
    ///
    /// オーバーフローする場合には`usize::MAX`に丸められる.
    ///
    /// # Examples
    ///
    /// ```
    /// use mempool::config::{SubPoolDescriptor, TotalSize};
    ///
    /// let size = TotalSize::of(&[SubPoolDescriptor::new(1024, 1024), SubPoolDescriptor::new(2048, 512)]);
    /// assert_eq!(size.chunks, 1024 + 2048);
    /// assert_eq!(size.bytes, 1024 * 1024 + 2048 * 512);
    /// ```
    pub fn of(sub_pools: &[SubPoolDescriptor]) -> Self {
        sub_pools
            .iter()
            .fold(TotalSize::default(), |sum, sub_pool| TotalSize {
                chunks: sum.chunks.saturating_add(sub_pool.chunk_amount),
                bytes: sum.bytes.saturating_add(sub_pool.bytes()),
            })
    }
}

/// メモリプールの構成(サブプール群).
///
/// メモリプールの構築時には、チャンクサイズの昇順に並び替えられる.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MempoolConfig(Vec<SubPoolDescriptor>);
impl MempoolConfig {
    /// 新しい`MempoolConfig`インスタンスを生成する.
    pub fn new(sub_pools: Vec<SubPoolDescriptor>) -> Self {
        MempoolConfig(sub_pools)
    }

    /// サブプール群を返す.
    pub fn sub_pools(&self) -> &[SubPoolDescriptor] {
        &self.0
    }

    /// サブプール群を走査するためのイテレータを返す.
    pub fn iter(&self) -> slice::Iter<SubPoolDescriptor> {
        self.0.iter()
    }

    /// サブプールの数を返す.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// サブプールが一つも無いかどうかを判定する.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 全サブプールの合計サイズを返す.
    pub fn total_size(&self) -> TotalSize {
        TotalSize::of(&self.0)
    }

    /// 最大のチャンクサイズを返す.
    ///
    /// サブプールが一つも無い場合には`None`が返される.
    pub fn max_chunk_size(&self) -> Option<usize> {
        self.0.iter().map(|p| p.chunk_size).max()
    }

    /// チャンクサイズの昇順に並んでいるかどうかを判定する.
    pub fn is_sorted(&self) -> bool {
        self.0.windows(2).all(|w| w[0].chunk_size <= w[1].chunk_size)
    }

    /// チャンクサイズの昇順に並び替える.
    pub(crate) fn sort(&mut self) {
        self.0.sort_by_key(|p| p.chunk_size);
    }

    /// `chunk_size`を持つサブプールの位置を返す.
    ///
    /// チャンクサイズの昇順に並んでいることが前提.
    pub(crate) fn position(&self, chunk_size: usize) -> Option<usize> {
        self.0.binary_search_by_key(&chunk_size, |p| p.chunk_size).ok()
    }
}
impl From<Vec<SubPoolDescriptor>> for MempoolConfig {
    fn from(f: Vec<SubPoolDescriptor>) -> Self {
        MempoolConfig::new(f)
    }
}
impl FromIterator<SubPoolDescriptor> for MempoolConfig {
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = SubPoolDescriptor>,
    {
        MempoolConfig::new(iter.into_iter().collect())
    }
}
impl<'a> IntoIterator for &'a MempoolConfig {
    type Item = &'a SubPoolDescriptor;
    type IntoIter = slice::Iter<'a, SubPoolDescriptor>;
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
impl FromStr for MempoolConfig {
    type Err = Error;

    /// カンマ区切りのサブプール群から`MempoolConfig`を生成する.
    ///
    /// 空文字列は、サブプールを一つも持たない構成として扱われる.
    ///
    /// # Examples
    ///
    /// ```
    /// use mempool::config::{MempoolConfig, SubPoolDescriptor};
    ///
    /// let config: MempoolConfig = "2x1024, 2x512".parse().unwrap();
    /// assert_eq!(config.sub_pools(),
    ///            &[SubPoolDescriptor::new(2, 1024), SubPoolDescriptor::new(2, 512)][..]);
    ///
    /// assert!("".parse::<MempoolConfig>().unwrap().is_empty());
    /// ```
    fn from_str(s: &str) -> Result<Self> {
        if s.trim().is_empty() {
            return Ok(MempoolConfig::default());
        }
        let sub_pools = track!(s
            .split(',')
            .map(|t| t.trim().parse::<SubPoolDescriptor>())
            .collect::<Result<Vec<_>>>())?;
        Ok(MempoolConfig::new(sub_pools))
    }
}
impl fmt::Display for MempoolConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[")?;
        for (i, sub_pool) in self.0.iter().enumerate() {
            if i != 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", sub_pool)?;
        }
        write!(f, "]")
    }
}
