/// crate固有のエラー型.
#[derive(Debug, Clone, TrackableError)]
pub struct Error(trackable::error::TrackableError<ErrorKind>);

/// 発生し得るエラーの種別.
///
/// エラーが返されるのはメモリプールの構築時のみ.
/// 構築後の`alloc`や`free`の失敗は`None`で表現される.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// メモリプールの構成が不正.
    ///
    /// 以下のいずれかに該当する場合に返される:
    ///
    /// - アライメントが許容される最小値未満
    /// - チャンクサイズがアライメントの倍数ではない(または`0`)
    /// - 同じチャンクサイズを持つサブプールが複数存在する
    /// - 全サブプールの合計バイト数が上限を超えている
    /// - 構成文字列のパースに失敗した
    ///
    /// # 典型的な対応策
    ///
    /// - 利用者側で構成を修正する
    InvalidConfig,

    /// アリーナ用のメモリ領域が確保できなかった.
    ///
    /// # 典型的な対応策
    ///
    /// - 構成を小さくする
    /// - 致命的な異常と判断して、上位の初期化処理を中断する
    OutOfMemory,
}
impl trackable::error::ErrorKind for ErrorKind {}
