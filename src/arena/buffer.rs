use std::mem::ManuallyDrop;
use std::ptr::NonNull;
use trackable::error::ErrorKindExt;

use crate::arena::Alignment;
use crate::{ErrorKind, Result};

/// 先頭位置が指定のアライメント境界に揃えられた、固定長のバッファ.
///
/// メモリプールの全サブプールの領域を保持する.
///
/// 構築時に一度だけ確保され、サイズが変わることはない.
/// 確保した領域は`Drop`時に一度だけ解放される.
///
/// バッファの内容には触れず、各チャンクのアドレスを計算するためにのみ使われる.
/// (チャンク内のデータの読み書きは、割当を受けた利用者の責務)
#[derive(Debug)]
pub struct Arena {
    buf: NonNull<u8>,
    capacity: usize,
    base: NonNull<u8>,
    len: usize,
    alignment: Alignment,
}
unsafe impl Send for Arena {}
unsafe impl Sync for Arena {}
impl Arena {
    /// 新しい`Arena`インスタンスを生成する.
    ///
    /// 結果のバッファの初期値は未定義.
    ///
    /// `len`が`0`の場合には領域は確保されず、`base`はダングリングポインタとなる.
    ///
    /// # Errors
    ///
    /// 必要な領域が確保できなかった場合には、種類が`ErrorKind::OutOfMemory`のエラーが返される.
    pub fn new(len: usize, alignment: Alignment) -> Result<Self> {
        if len == 0 {
            return Ok(Arena {
                buf: NonNull::dangling(),
                capacity: 0,
                base: NonNull::dangling(),
                len,
                alignment,
            });
        }

        // 先頭をアライメント境界に合わせられるだけの余分な領域を確保しておく
        let capacity = track_assert_some!(
            len.checked_add(alignment.as_usize() - 1),
            ErrorKind::OutOfMemory,
            "Arena size overflows: len={}, alignment={}",
            len,
            alignment.as_usize()
        );

        // ゼロ埋めのコストを省くために、長さ`0`のまま容量だけを確保する
        let mut buf: Vec<u8> = Vec::new();
        track!(buf
            .try_reserve_exact(capacity)
            .map_err(|e| ErrorKind::OutOfMemory.cause(e)))?;
        let mut buf = ManuallyDrop::new(buf);
        let capacity = buf.capacity();
        let buf = unsafe { NonNull::new_unchecked(buf.as_mut_ptr()) };

        let offset = alignment.ceil_align(buf.as_ptr() as usize) - buf.as_ptr() as usize;
        debug_assert!(offset + len <= capacity);

        // `offset`は確保済み領域の範囲内に収まっている
        let base = unsafe { NonNull::new_unchecked(buf.as_ptr().add(offset)) };
        Ok(Arena {
            buf,
            capacity,
            base,
            len,
            alignment,
        })
    }

    /// アリーナの先頭アドレスを返す.
    pub fn base(&self) -> NonNull<u8> {
        self.base
    }

    /// アリーナのバイト数を返す.
    pub fn len(&self) -> usize {
        self.len
    }

    /// アリーナが空(長さ`0`)かどうかを判定する.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// アリーナのアライメントを返す.
    pub fn alignment(&self) -> Alignment {
        self.alignment
    }

    /// `ptr`が`[base, base + len)`の範囲内にあるかどうかを判定する.
    pub fn contains(&self, ptr: *const u8) -> bool {
        self.offset_of(ptr).is_some()
    }

    /// `ptr`の、アリーナ先頭からのバイトオフセットを返す.
    ///
    /// `ptr`がアリーナの範囲外の場合には`None`が返される.
    pub fn offset_of(&self, ptr: *const u8) -> Option<usize> {
        let offset = (ptr as usize).checked_sub(self.base.as_ptr() as usize)?;
        if offset < self.len {
            Some(offset)
        } else {
            None
        }
    }

    /// アリーナ先頭から`offset`バイトの位置のアドレスを返す.
    ///
    /// # Panics
    ///
    /// `offset`がアリーナの範囲外の場合には、現在のスレッドがパニックする.
    pub fn address(&self, offset: usize) -> NonNull<u8> {
        assert!(offset < self.len, "offset={}, len={}", offset, self.len);
        unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset)) }
    }
}
impl Drop for Arena {
    fn drop(&mut self) {
        if self.capacity == 0 {
            return;
        }
        // `buf`は`new`内で確保した`Vec`の領域であり、解放されるのはここだけ
        unsafe {
            drop(Vec::from_raw_parts(self.buf.as_ptr(), 0, self.capacity));
        }
    }
}
