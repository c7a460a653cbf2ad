//! インスペクタエージェント
//!
//! セッションクライアント、IOスレッドコントローラ、起床チャネルを束ねる
//! 最上位のファサードです。起動シーケンス、クロススレッドの起動要求、
//! 接続・切断・dispatch の振り分けを担います。
//!
//! `request_io_thread_start`（起床ハンドル経由）を除き、すべての操作は
//! 実行スレッドからのみ呼び出せます。エージェントは `Rc` ハンドルなので
//! スレッド間移動は型レベルで禁止されています。

use crate::channel::SessionDelegate;
use crate::errors::ERR_NOT_STARTED;
use crate::io::{InspectorIo, IoFactory};
use crate::session::{SessionClient, CONTEXT_GROUP_ID};
use crate::wake::{WakeHandle, WakeState};
use crate::Result;
use rindou_engine::{
    Environment, ExecutionWaker, InspectorBackendFactory, InspectorClient, ScriptMessage,
    ScriptValue, TaskScheduler,
};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::sync::Arc;
use tracing::{debug, warn};

/// ルート実行コンテキストの表示名
const ROOT_CONTEXT_NAME: &str = "rindou debugger context";

/// グローバルスコープに注入するデバッガエントリの名前
const DEBUG_ENTRY_NAME: &str = "callAndPauseOnStart";

/// デバッガエントリ経由の一時停止理由
const BREAK_ON_START_REASON: &str = "Break on start";

struct AgentInner {
    waker: Arc<dyn ExecutionWaker>,
    io_factory: Box<dyn IoFactory>,
    backend_factory: Box<dyn InspectorBackendFactory>,
    env: RefCell<Option<Rc<dyn Environment>>>,
    scheduler: RefCell<Option<Arc<dyn TaskScheduler>>>,
    path: RefCell<String>,
    enabled: Cell<bool>,
    client: RefCell<Option<Rc<SessionClient>>>,
    /// 最初の起動までは存在しない。停止・再生成されることがある
    io: RefCell<Option<Box<dyn InspectorIo>>>,
    /// `start` のたびに武装し直すクロススレッド起床状態
    wake: RefCell<Option<Arc<WakeState>>>,
}

/// インスペクタエージェント
///
/// 環境ごとに1つ作られます。クローンは同一エージェントへの別ハンドルです。
#[derive(Clone)]
pub struct Agent {
    inner: Rc<AgentInner>,
}

/// エージェントへの弱参照
///
/// デリゲートなど、エージェントより長生きしうる協力者からの逆参照に
/// 使います。
#[derive(Clone)]
pub struct WeakAgent {
    inner: Weak<AgentInner>,
}

impl WeakAgent {
    /// 強参照を取り戻す。エージェントが破棄済みなら None
    pub fn upgrade(&self) -> Option<Agent> {
        self.inner.upgrade().map(|inner| Agent { inner })
    }
}

impl Agent {
    /// 新しいエージェントを作成する
    pub fn new(
        waker: Arc<dyn ExecutionWaker>,
        io_factory: Box<dyn IoFactory>,
        backend_factory: Box<dyn InspectorBackendFactory>,
    ) -> Self {
        Self {
            inner: Rc::new(AgentInner {
                waker,
                io_factory,
                backend_factory,
                env: RefCell::new(None),
                scheduler: RefCell::new(None),
                path: RefCell::new(String::new()),
                enabled: Cell::new(false),
                client: RefCell::new(None),
                io: RefCell::new(None),
                wake: RefCell::new(None),
            }),
        }
    }

    /// 弱参照を取得する
    pub fn downgrade(&self) -> WeakAgent {
        WeakAgent {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// エージェントを起動する
    ///
    /// 環境・スケジューラ・リッスンパスを記録し、デバッガエントリを
    /// グローバルスコープへ注入し、セッションクライアントを構築して
    /// ルートコンテキストを固定の表示名で登録します。最後にIOスレッドの
    /// 即時起動を要求し、その成否をそのまま返します。
    pub fn start(
        &self,
        env: Rc<dyn Environment>,
        scheduler: Arc<dyn TaskScheduler>,
        path: &str,
    ) -> Result<()> {
        let inner = &self.inner;
        *inner.path.borrow_mut() = path.to_string();
        *inner.env.borrow_mut() = Some(env.clone());
        *inner.scheduler.borrow_mut() = Some(scheduler.clone());

        self.install_debug_entry(&*env);

        let client = SessionClient::new(env.clone(), scheduler, &*inner.backend_factory);
        client.context_created(env.root_context(), ROOT_CONTEXT_NAME);

        // 一時停止ループの内側でも起動要求を取りこぼさないようにする
        let weak = self.downgrade();
        client.set_pause_tick(Rc::new(move || {
            if let Some(agent) = weak.upgrade() {
                agent.poll_start_request();
            }
        }));
        *inner.client.borrow_mut() = Some(client);

        // 起床チャネルを武装する
        *inner.wake.borrow_mut() = Some(WakeState::new());

        self.start_io_thread(true)
    }

    /// デバッガエントリプリミティブを注入する
    ///
    /// スクリプトから呼ばれると「Break on start」の一時停止を予約してから
    /// 渡された関数を残りの引数で呼び出し、その結果を返します。
    fn install_debug_entry(&self, env: &dyn Environment) {
        let weak = self.downgrade();
        env.install_global_callback(
            DEBUG_ENTRY_NAME,
            Box::new(move |args| {
                anyhow::ensure!(
                    !args.is_empty(),
                    "{} requires a function argument",
                    DEBUG_ENTRY_NAME
                );
                let func = match &args[0] {
                    ScriptValue::Function(func) => *func,
                    other => anyhow::bail!(
                        "{} expects a function as its first argument, got {:?}",
                        DEBUG_ENTRY_NAME,
                        other
                    ),
                };
                let agent = weak
                    .upgrade()
                    .ok_or_else(|| anyhow::anyhow!("inspector agent is gone"))?;

                agent.pause_on_next_statement(BREAK_ON_START_REASON);

                let env = agent.inner.env.borrow().clone().expect(ERR_NOT_STARTED);
                env.call_function(&func, &args[1..])
            }),
        );
    }

    /// IOスレッドを起動する
    ///
    /// 冪等です。既に起動済みなら何もせず成功を返します。バインドに
    /// 失敗した場合はセッションクライアントごと手放し（IO機能も
    /// プロトコル機能も利用不能になる）、失敗を返します。
    pub fn start_io_thread(&self, _wait_for_connect: bool) -> Result<()> {
        let inner = &self.inner;
        if inner.io.borrow().is_some() {
            return Ok(());
        }
        assert!(inner.client.borrow().is_some(), "{}", ERR_NOT_STARTED);

        inner.enabled.set(true);

        let path = inner.path.borrow().clone();
        let started = inner.io_factory.create(&path).and_then(|mut io| {
            io.start()?;
            Ok(io)
        });
        match started {
            Ok(io) => {
                *inner.io.borrow_mut() = Some(io);
                debug!(path = %path, "inspector io thread started");
                Ok(())
            }
            Err(err) => {
                // バインド失敗は回復可能: 埋め込み側がデバッグなしで
                // 続行するか起動を中止するかを決める
                inner.client.borrow_mut().take();
                Err(err)
            }
        }
    }

    /// IOスレッドを停止して手放す
    ///
    /// セッションクライアントには触れません。トランスポートなしの
    /// プロトコル機能（インプロセスデバッグ）は引き続き有効です。
    pub fn stop(&self) {
        if let Some(mut io) = self.inner.io.borrow_mut().take() {
            io.stop();
            debug!("inspector io thread stopped");
        }
    }

    /// エージェントが起動済みか確認する
    pub fn is_started(&self) -> bool {
        self.inner.client.borrow().is_some()
    }

    /// デバッグ機能が有効化されているか確認する
    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.get()
    }

    /// フロントエンドを接続する
    pub fn connect(&self, delegate: Rc<dyn SessionDelegate>) {
        self.inner.enabled.set(true);
        self.client().connect_frontend(delegate);
    }

    /// フロントエンドを切断する
    pub fn disconnect(&self) {
        self.client().disconnect_frontend();
    }

    /// フロントエンドからのプロトコルフレームを処理する
    pub fn dispatch(&self, message: &str) {
        self.client().dispatch_message_from_frontend(message);
    }

    /// フロントエンドがトランスポート経由で接続中か確認する
    ///
    /// `connect` によるインプロセス接続は数えません。
    pub fn is_connected(&self) -> bool {
        self.inner
            .io
            .borrow()
            .as_ref()
            .map(|io| io.is_connected())
            .unwrap_or(false)
    }

    /// 登録済みの実行コンテキストを破棄し、フロントエンドの切断を待つ
    ///
    /// トランスポートが存在しない場合はコンテキスト破棄後すぐに戻ります。
    pub fn wait_for_disconnect(&self) {
        let client = self.client();
        let env = self.inner.env.borrow().clone().expect(ERR_NOT_STARTED);
        client.context_destroyed(env.root_context());
        if let Some(io) = self.inner.io.borrow().as_ref() {
            io.wait_for_disconnect();
        }
    }

    /// 未捕捉例外を報告し、フロントエンドの判断を同期的に待つ
    ///
    /// 起動前に呼ばれた場合は何もしません。起動後は、プロセスが巻き戻しを
    /// 続ける前に人間が生きた状態を検査できるよう、報告に続けて
    /// `wait_for_disconnect` を行います。
    pub fn fatal_exception(&self, error: &ScriptValue, message: &ScriptMessage) {
        if !self.is_started() {
            return;
        }
        self.client().fatal_exception(error, message);
        self.wait_for_disconnect();
    }

    /// 次のステートメントでの一時停止を予約する
    ///
    /// フロントエンドが接続されていなければ何もしません。
    pub fn pause_on_next_statement(&self, reason: &str) {
        let client = match self.inner.client.borrow().clone() {
            Some(client) => client,
            None => return,
        };
        if let Some(channel) = client.channel() {
            channel.schedule_pause_on_next_statement(reason);
        }
    }

    /// ネストしたメッセージループを明示的に実行する
    pub fn run_message_loop(&self) {
        self.client().run_message_loop_on_pause(CONTEXT_GROUP_ID);
    }

    /// クロススレッドの起動要求ハンドルを取得する
    ///
    /// 返されたハンドルは任意のスレッドから `request_io_thread_start` を
    /// 呼び出せます。
    pub fn wake_handle(&self) -> WakeHandle {
        let state = self.inner.wake.borrow().clone().expect(ERR_NOT_STARTED);
        let scheduler = self
            .inner
            .scheduler
            .borrow()
            .clone()
            .expect(ERR_NOT_STARTED);
        WakeHandle::new(state, self.inner.waker.clone(), scheduler)
    }

    /// 保留中のIOスレッド起動要求を処理する
    ///
    /// 実行スレッドの合流点です。イベントソースの起床後、および
    /// 一時停止ループの各イテレーションで呼ばれます。非同期経路では
    /// 要求元に失敗を返せないため、起動失敗はログに残すだけです。
    pub fn poll_start_request(&self) {
        if !self.is_started() {
            return;
        }
        let state = match self.inner.wake.borrow().clone() {
            Some(state) => state,
            None => return,
        };
        if state.take() {
            if let Err(err) = self.start_io_thread(false) {
                warn!(error = %err, "failed to start inspector io thread");
            }
        }
    }

    fn client(&self) -> Rc<SessionClient> {
        self.inner.client.borrow().clone().expect(ERR_NOT_STARTED)
    }
}
