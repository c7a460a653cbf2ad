//! セッションクライアント
//!
//! インスペクタエンジンのライフサイクル、ネストした一時停止ループ、
//! 例外報告を所有します。実行スレッドからインスペクタエンジンの入口に
//! 触れてよいのはこのオブジェクトだけです。
//!
//! `Rc` で共有されるため `!Send` であり、スレッド親和性は型システムが
//! 強制します。エンジンは dispatch の処理中にここへ再入してくるので、
//! 状態は `Cell`/`RefCell` で持ちます。

use crate::channel::{ProtocolChannel, SessionDelegate};
use crate::errors::{ERR_ALREADY_CONNECTED, ERR_NO_CHANNEL, ERR_PAUSE_WITHOUT_CHANNEL};
use rindou_engine::{
    ContextGroupId, ContextHandle, Environment, ExceptionReport, InspectorBackend,
    InspectorBackendFactory, InspectorClient, ScriptMessage, ScriptValue, TaskScheduler,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

/// コンテキストグループID
///
/// この設計は実行コンテキストグループをちょうど1つと仮定しているため、
/// 固定値で十分です。
pub const CONTEXT_GROUP_ID: ContextGroupId = 1;

/// 例外報告の固定種別文字列
const EXCEPTION_DETAIL: &str = "Uncaught";

const NANOS_PER_MSEC: f64 = 1_000_000.0;

/// セッションクライアント
///
/// 状態機械は Idle（チャネルなし）、Connected（チャネルあり）、
/// PausedLoopRunning（ネストしたループ実行中）の3状態を遷移します。
pub struct SessionClient {
    env: Rc<dyn Environment>,
    scheduler: Arc<dyn TaskScheduler>,
    backend: Rc<dyn InspectorBackend>,
    /// フロントエンド接続中のみ存在する。同時に高々1つ
    channel: RefCell<Option<Rc<ProtocolChannel>>>,
    /// ループの早期終了を指示するフラグ。ループ開始のたびにリセットされる
    terminated: Cell<bool>,
    /// ネストしたループの再入防止
    running_nested_loop: Cell<bool>,
    /// 一時停止ループの各イテレーションで呼ばれるフック
    pause_tick: RefCell<Option<Rc<dyn Fn()>>>,
    /// プロトコルタイムスタンプの基点
    epoch: Instant,
}

impl SessionClient {
    /// 新しいセッションクライアントを作成する
    ///
    /// インスペクタエンジンはクライアントへの弱参照とともに生成され、
    /// 一時停止やタイムスタンプ取得のためにここへ呼び戻します。
    pub fn new(
        env: Rc<dyn Environment>,
        scheduler: Arc<dyn TaskScheduler>,
        backend_factory: &dyn InspectorBackendFactory,
    ) -> Rc<Self> {
        Rc::new_cyclic(|weak: &std::rc::Weak<Self>| {
            let backend = backend_factory.create(weak.clone());
            Self {
                env,
                scheduler,
                backend,
                channel: RefCell::new(None),
                terminated: Cell::new(false),
                running_nested_loop: Cell::new(false),
                pause_tick: RefCell::new(None),
                epoch: Instant::now(),
            }
        })
    }

    /// フロントエンドを接続する
    ///
    /// 切断前の二重接続はブリッジロジックのバグであり、即座に中断します。
    pub fn connect_frontend(&self, delegate: Rc<dyn SessionDelegate>) {
        assert!(
            self.channel.borrow().is_none(),
            "{}",
            ERR_ALREADY_CONNECTED
        );
        let channel = ProtocolChannel::new(&*self.backend, CONTEXT_GROUP_ID, delegate);
        *self.channel.borrow_mut() = Some(channel);
    }

    /// フロントエンドを切断する
    ///
    /// 先にネストしたループを終了させてからチャネルを手放します。
    pub fn disconnect_frontend(&self) {
        self.quit_message_loop_on_pause();
        self.channel.borrow_mut().take();
    }

    /// フロントエンドからのプロトコルフレームを処理する
    pub fn dispatch_message_from_frontend(&self, message: &str) {
        let channel = self.channel.borrow().clone().expect(ERR_NO_CHANNEL);
        channel.dispatch_protocol_message(message);
    }

    /// 現在のプロトコルチャネルを取得する
    pub fn channel(&self) -> Option<Rc<ProtocolChannel>> {
        self.channel.borrow().clone()
    }

    /// 実行コンテキストの生成をインスペクタエンジンに登録する
    ///
    /// `name` は人間向けの表示名で、プロトコルには不透明です。
    pub fn context_created(&self, context: ContextHandle, name: &str) {
        self.backend.context_created(context, CONTEXT_GROUP_ID, name);
    }

    /// 実行コンテキストの破棄をインスペクタエンジンに通知する
    pub fn context_destroyed(&self, context: ContextHandle) {
        self.backend.context_destroyed(context);
    }

    /// 未捕捉例外をインスペクタエンジンに報告する
    pub fn fatal_exception(&self, error: &ScriptValue, message: &ScriptMessage) {
        let mut script_id = message.script_id;

        // 先頭フレームが同じスクリプトを指しているなら、重複した
        // スクリプト関連付けを抑制する
        if let Some(top) = message.stack_trace.top_frame() {
            if top.script_id == script_id {
                script_id = 0;
            }
        }

        self.backend.exception_thrown(ExceptionReport {
            context: self.env.root_context(),
            detail: EXCEPTION_DETAIL.to_string(),
            text: message.text.clone(),
            url: message.resource_name.clone(),
            line_number: message.line_number,
            column_number: message.start_column,
            stack_trace: message.stack_trace.clone(),
            script_id,
            exception: error.clone(),
        });
    }

    /// 一時停止ループの各イテレーションで呼ばれるフックを設定する
    ///
    /// エージェントはこれを使って、ループの内側でもクロススレッドの
    /// IOスレッド起動要求を取りこぼさないようにします。
    pub fn set_pause_tick(&self, tick: Rc<dyn Fn()>) {
        *self.pause_tick.borrow_mut() = Some(tick);
    }
}

impl InspectorClient for SessionClient {
    fn run_message_loop_on_pause(&self, _group: ContextGroupId) {
        let channel = self
            .channel
            .borrow()
            .clone()
            .expect(ERR_PAUSE_WITHOUT_CHANNEL);

        // 一時停止中の再度の一時停止要求でスタックを伸ばさない
        if self.running_nested_loop.get() {
            return;
        }

        self.terminated.set(false);
        self.running_nested_loop.set(true);

        while !self.terminated.get() && channel.wait_for_frontend_message() {
            // タイマー・マイクロタスク・割り込み配送の仕事を
            // 飢えさせないよう、待機に戻る前にキューを空にする
            while self.scheduler.pump_foreground_task() {}

            let tick = self.pause_tick.borrow().clone();
            if let Some(tick) = tick {
                tick();
            }
        }

        self.terminated.set(false);
        self.running_nested_loop.set(false);
    }

    fn quit_message_loop_on_pause(&self) {
        self.terminated.set(true);
    }

    fn ensure_default_context_in_group(&self, _group: ContextGroupId) -> ContextHandle {
        // 単一コンテキストグループ前提のため、要求されたグループに
        // かかわらず唯一の登録済みコンテキストを返す
        self.env.root_context()
    }

    fn current_time_ms(&self) -> f64 {
        self.epoch.elapsed().as_nanos() as f64 / NANOS_PER_MSEC
    }
}
