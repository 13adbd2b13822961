//! メモリプールの背後にあるアリーナ(連続したバッファ)関連の構成要素.
use crate::{ErrorKind, Result};

pub use self::buffer::Arena;

mod buffer;

/// アリーナおよび各チャンクのアライメントを表現するための構造体.
///
/// アリーナの先頭アドレスは、常にこの値の倍数となるように配置される.
/// また各チャンクサイズもこの値の倍数であることが要求されるので、
/// 全てのチャンクの先頭アドレスも同様にアライメントされていることになる.
///
/// 二の冪である必要はない.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Alignment(usize);
impl Alignment {
    /// 許容されるアライメントの最小値(バイト単位).
    ///
    /// また`Alignment::default()`で使われる値でもある.
    pub const MIN: usize = 1;

    /// 許容可能な最小のアライメントを持つ`Alignment`インスタンスを返す.
    ///
    /// # Examples
    ///
    /// ```
    /// use mempool::arena::Alignment;
    ///
    /// assert_eq!(Alignment::min().as_usize(), Alignment::MIN);
    /// ```
    pub fn min() -> Self {
        Alignment(Self::MIN)
    }

    /// 指定された値のアライメントを表現する`Alignment`インスタンスを生成する.
    ///
    /// # Errors
    ///
    /// `alignment`が`Alignment::MIN`未満の場合には、種類が`ErrorKind::InvalidConfig`のエラーが返される.
    ///
    /// # Examples
    ///
    /// ```
    /// use mempool::ErrorKind;
    /// use mempool::arena::Alignment;
    ///
    /// assert_eq!(Alignment::new(64).ok().map(|a| a.as_usize()), Some(64));
    /// assert_eq!(Alignment::new(48).ok().map(|a| a.as_usize()), Some(48));
    ///
    /// assert_eq!(Alignment::new(0).err().map(|e| *e.kind()), Some(ErrorKind::InvalidConfig));
    /// ```
    #[allow(clippy::new_ret_no_self)]
    pub fn new(alignment: usize) -> Result<Self> {
        track_assert!(
            alignment >= Self::MIN,
            ErrorKind::InvalidConfig,
            "Provided alignment '{}' is smaller than the smallest possible one '{}'",
            alignment,
            Self::MIN
        );
        Ok(Alignment(alignment))
    }

    /// 指定位置より後方の最初のアライメント境界を返す.
    ///
    /// # Examples
    ///
    /// ```
    /// use mempool::arena::Alignment;
    ///
    /// let alignment = Alignment::new(64).unwrap();
    /// assert_eq!(alignment.ceil_align(0), 0);
    /// assert_eq!(alignment.ceil_align(1), 64);
    /// assert_eq!(alignment.ceil_align(64), 64);
    /// ```
    pub fn ceil_align(self, position: usize) -> usize {
        match position % self.0 {
            0 => position,
            remainder => position + (self.0 - remainder),
        }
    }

    /// 指定位置がアライメント境界に沿っているかどうかを判定する.
    ///
    /// # Examples
    ///
    /// ```
    /// use mempool::arena::Alignment;
    ///
    /// let alignment = Alignment::new(64).unwrap();
    /// assert!(alignment.is_aligned(0));
    /// assert!(alignment.is_aligned(64));
    /// assert!(alignment.is_aligned(1024));
    ///
    /// assert!(!alignment.is_aligned(63));
    /// assert!(!alignment.is_aligned(65));
    /// ```
    pub fn is_aligned(self, position: usize) -> bool {
        position % self.0 == 0
    }

    /// アライメント値を`usize`に変換して返す.
    pub fn as_usize(self) -> usize {
        self.0
    }
}
impl Default for Alignment {
    fn default() -> Self {
        Self::min()
    }
}
