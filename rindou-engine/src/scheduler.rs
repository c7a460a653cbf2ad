//! スケジューラと実行スレッド起床の境界
//!
//! 実行スレッドのフォアグラウンドタスクキュー、エンジンレベルの割り込み、
//! イベントソースの非同期起床を抽象化します。
//! どのスレッドからでも呼べる操作と、実行スレッド専用の操作が混在するため、
//! 各メソッドの契約に注意してください。

/// フォアグラウンドタスク
///
/// どのスレッドからでも投入でき、実行スレッド上で実行されます。
pub type ForegroundTask = Box<dyn FnOnce() + Send>;

/// 割り込みコールバック
///
/// 実行スレッドが次に安全な割り込み地点に達したとき、
/// スクリプト実行中であっても実行されます。
pub type InterruptFn = Box<dyn FnOnce() + Send>;

/// 実行スレッドのタスクスケジューラ
pub trait TaskScheduler: Send + Sync {
    /// フォアグラウンドタスクを投入する（任意のスレッドから呼び出し可）
    fn post_foreground_task(&self, task: ForegroundTask);

    /// 保留中のフォアグラウンドタスクを1つ実行する
    ///
    /// 実行スレッド専用。タスクを実行したら true、キューが空なら false を
    /// 返します。キューを空にするには false になるまで繰り返します。
    fn pump_foreground_task(&self) -> bool;

    /// エンジンレベルの割り込みを要求する（任意のスレッドから呼び出し可）
    ///
    /// コールバックは実行スレッドの次の割り込みチェックポイントで実行されます。
    fn request_interrupt(&self, interrupt: InterruptFn);
}

/// 実行スレッドのイベントソースを起床させるシグナル
///
/// 埋め込み側の契約: イベントソースが起床したら、実行スレッドは
/// `Agent::poll_start_request` を呼び出して保留中の要求を処理します。
pub trait ExecutionWaker: Send + Sync {
    /// イベントソースを起床させる（任意のスレッドから呼び出し可）
    ///
    /// 何度呼んでも安全です。起床は合流（coalesce）されることがあります。
    fn wake(&self);
}
