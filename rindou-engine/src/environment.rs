//! 実行環境の境界
//!
//! スクリプトが実行される環境（ルートコンテキスト、グローバルスコープ、
//! 関数呼び出し）への入口を定義します。実装は埋め込み側が提供します。
//! このトレイトのメソッドはすべて実行スレッドからのみ呼び出せます。

use crate::inspector::ContextHandle;
use crate::Result;

/// スクリプト関数への不透明ハンドル
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionHandle(u64);

impl FunctionHandle {
    /// 新しい関数ハンドルを作成する
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// 生のID値を取得する
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// スクリプト値
///
/// ブリッジが扱う必要のある最小限の値表現です。
/// エンジン固有の値はハンドル（Function）として不透明に運びます。
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    /// 未定義値
    Undefined,
    /// 真偽値
    Bool(bool),
    /// 数値
    Number(f64),
    /// 文字列
    String(String),
    /// 関数
    Function(FunctionHandle),
}

/// グローバルスコープに登録されるネイティブコールバック
///
/// スクリプトから呼び出されると、実行スレッド上で同期的に実行されます。
pub type NativeCallback = Box<dyn Fn(&[ScriptValue]) -> Result<ScriptValue>>;

/// スクリプト実行環境
pub trait Environment {
    /// 環境のルート実行コンテキストを取得する
    fn root_context(&self) -> ContextHandle;

    /// グローバルスコープにネイティブコールバックを登録する
    ///
    /// スクリプトが実行を開始する前に呼び出す必要があります。
    /// 同名の登録は後勝ちです。
    fn install_global_callback(&self, name: &str, callback: NativeCallback);

    /// スクリプト関数を呼び出す
    fn call_function(&self, function: &FunctionHandle, args: &[ScriptValue])
        -> Result<ScriptValue>;
}
