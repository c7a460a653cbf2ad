//! インスペクタライブラリの境界
//!
//! 埋め込まれたインスペクタエンジンへの入口を定義します。
//! プロトコルのスキーマとセッションオブジェクトの意味論はライブラリ側が
//! 所有し、ブリッジはフレームを不透明な文字列として運ぶだけです。
//!
//! 各トレイトは `&self` を取ります。インスペクタエンジンは再入的で、
//! dispatch の処理中にクライアントへコールバックし、その中からさらに
//! dispatch が呼ばれることがあるため、排他借用は約束できません。
//! 実装は自身で内部可変性を管理します。

use crate::environment::ScriptValue;
use std::rc::{Rc, Weak};

/// コンテキストグループID
///
/// インスペクタエンジンのコンテキスト分離単位。この設計では常に1つです。
pub type ContextGroupId = u32;

/// 実行コンテキストへの不透明ハンドル
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextHandle(u64);

impl ContextHandle {
    /// 新しいコンテキストハンドルを作成する
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// 生のID値を取得する
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// スタックフレーム
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub script_id: u32,
    pub function_name: String,
    pub line_number: u32,
    pub column_number: u32,
    pub url: String,
}

/// スタックトレース
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackTrace {
    pub frames: Vec<StackFrame>,
}

impl StackTrace {
    /// 先頭フレームを取得する
    pub fn top_frame(&self) -> Option<&StackFrame> {
        self.frames.first()
    }
}

/// 未捕捉例外の発生源情報
///
/// エンジンが例外発生時に生成するメッセージ（テキスト、発生位置、
/// スクリプトID、スタックトレース）をまとめたものです。
#[derive(Debug, Clone)]
pub struct ScriptMessage {
    pub text: String,
    pub resource_name: String,
    pub line_number: u32,
    pub start_column: u32,
    pub script_id: u32,
    pub stack_trace: StackTrace,
}

/// インスペクタエンジンへの例外報告
#[derive(Debug, Clone)]
pub struct ExceptionReport {
    pub context: ContextHandle,
    /// 固定の種別文字列（"Uncaught" など）
    pub detail: String,
    pub text: String,
    pub url: String,
    pub line_number: u32,
    pub column_number: u32,
    pub stack_trace: StackTrace,
    /// 0 はスクリプト関連付けの抑制を意味する
    pub script_id: u32,
    /// 例外値そのもの
    pub exception: ScriptValue,
}

/// インスペクタセッション
///
/// フロントエンド1接続ぶんのプロトコル処理を担います。
pub trait InspectorSession {
    /// プロトコルフレームをセッションに渡して処理させる
    ///
    /// 処理の副作用（応答フレーム）は、このセッションを作った
    /// [`InspectorChannel`] への同期または非同期のコールバックとして現れます。
    fn dispatch_protocol_message(&self, message: &str);

    /// 次のステートメントでの一時停止を予約する
    fn schedule_pause_on_next_statement(&self, reason: &str, detail: &str);
}

/// インスペクタエンジンからフロントエンド方向への出力路
///
/// ブリッジ側（プロトコルチャネル）が実装し、セッションが応答や
/// イベントを送出するときに呼び出します。
pub trait InspectorChannel {
    /// 呼び出しへの応答を送出する
    fn send_response(&self, call_id: u64, message: &str);

    /// 要求に紐付かないイベントを送出する
    fn send_notification(&self, message: &str);

    /// バッファリングされた通知を明示的に掃き出す
    fn flush_protocol_notifications(&self);
}

/// インスペクタエンジンからブリッジへのコールバック
///
/// セッションクライアントが実装します。エンジンはスクリプトの一時停止や
/// プロトコルのタイムスタンプ取得のためにここへ呼び戻します。
pub trait InspectorClient {
    /// スクリプト実行を中断し、ネストしたメッセージループに入る
    fn run_message_loop_on_pause(&self, group: ContextGroupId);

    /// ネストしたメッセージループの終了を指示する
    fn quit_message_loop_on_pause(&self);

    /// グループの既定コンテキストを取得する
    fn ensure_default_context_in_group(&self, group: ContextGroupId) -> ContextHandle;

    /// プロトコルタイムスタンプ用の単調クロック（ミリ秒）
    fn current_time_ms(&self) -> f64;
}

/// インスペクタエンジン本体
pub trait InspectorBackend {
    /// 新しいセッションを接続する
    ///
    /// `channel` は非所有参照です。セッションの寿命はチャネル側が管理し、
    /// チャネル破棄後のコールバックは何もしません。
    fn connect(
        &self,
        group: ContextGroupId,
        channel: Weak<dyn InspectorChannel>,
    ) -> Rc<dyn InspectorSession>;

    /// 実行コンテキストの生成を通知する
    fn context_created(&self, context: ContextHandle, group: ContextGroupId, name: &str);

    /// 実行コンテキストの破棄を通知する
    fn context_destroyed(&self, context: ContextHandle);

    /// 未捕捉例外を報告する
    fn exception_thrown(&self, report: ExceptionReport);
}

/// インスペクタエンジンのファクトリ
///
/// エンジンはクライアントへの弱参照とともに生成されます。
pub trait InspectorBackendFactory {
    /// インスペクタエンジンを生成する
    fn create(&self, client: Weak<dyn InspectorClient>) -> Rc<dyn InspectorBackend>;
}
