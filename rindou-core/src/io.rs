//! IOスレッドコントローラの契約
//!
//! トランスポートを載せた二次スレッドをエージェントが不透明に扱うための
//! インターフェイス。実際のトランスポートとフレーミングは外部が所有し、
//! エージェントはこの4操作だけに依存します。

use crate::Result;

/// IOスレッドコントローラ
///
/// `start`/`stop` は実行スレッドから呼ばれますが、コントローラ自身の
/// スレッドはそれとは独立して動作します。
pub trait InspectorIo {
    /// トランスポートを起動する
    ///
    /// バインドに失敗した場合は Err を返します。
    fn start(&mut self) -> Result<()>;

    /// トランスポートを停止する
    fn stop(&mut self);

    /// フロントエンドが接続中か確認する
    fn is_connected(&self) -> bool;

    /// フロントエンドが切断するまで呼び出しスレッドをブロックする
    fn wait_for_disconnect(&self);
}

/// IOスレッドコントローラのファクトリ
///
/// エージェントの生存期間中、コントローラは生成・停止・再生成されることが
/// あるため、エージェントは生成手段を保持します。
pub trait IoFactory {
    /// 指定されたパス（空文字列は「パスなし」）でコントローラを生成する
    fn create(&self, path: &str) -> Result<Box<dyn InspectorIo>>;
}
