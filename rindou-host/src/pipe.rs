//! インプロセスのパイプトランスポート
//!
//! フロントエンドとブリッジを同一プロセス内のチャネル対で結びます。
//! `PipeTransport` がIOスレッドコントローラ契約を実装し、二次スレッドで
//! フロントエンドの切断を監視します。`FrontendHandle` は任意のスレッドへ
//! 渡せるフロントエンド側の端で、ドロップすると切断とみなされます。
//!
//! パイプ対は1つのリッスンエンドポイントをモデル化するため、
//! トランスポートは一度しか生成できません。

use crossbeam_channel::{unbounded, Receiver, Sender};
use rindou_core::{Agent, InspectorIo, IoFactory, SessionDelegate, WeakAgent};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// パイプトランスポートのエラー
#[derive(Debug, Error)]
pub enum TransportError {
    /// パイプ対の唯一のトランスポートが既に生成済み
    #[error("pipe transport endpoint already consumed")]
    EndpointConsumed,
    /// 反対側の端が既に閉じている
    #[error("pipe transport is closed")]
    Closed,
}

/// パイプ対を作成する
///
/// ブリッジ側のファクトリと、フロントエンド側のハンドルを返します。
pub fn pipe() -> (PipeFactory, FrontendHandle) {
    let (to_bridge_tx, to_bridge_rx) = unbounded();
    let (to_frontend_tx, to_frontend_rx) = unbounded();
    let (hangup_tx, hangup_rx) = unbounded::<()>();

    let transport = PipeTransport {
        shared: Arc::new(PipeShared::default()),
        hangup_rx,
        stop_tx: None,
        thread: None,
    };

    let factory = PipeFactory {
        inner: Rc::new(PipeFactoryInner {
            transport: RefCell::new(Some(transport)),
            inbound: to_bridge_rx,
            outbound: to_frontend_tx,
        }),
    };

    let frontend = FrontendHandle {
        to_bridge: to_bridge_tx,
        from_bridge: to_frontend_rx,
        _hangup: hangup_tx,
    };

    (factory, frontend)
}

struct PipeFactoryInner {
    transport: RefCell<Option<PipeTransport>>,
    inbound: Receiver<String>,
    outbound: Sender<String>,
}

/// パイプトランスポートのファクトリ
///
/// クローンは同じエンドポイントを共有します。エージェントに渡した後も、
/// 埋め込み側はクローンからデリゲートと受信フレームを取り出せます。
#[derive(Clone)]
pub struct PipeFactory {
    inner: Rc<PipeFactoryInner>,
}

impl PipeFactory {
    /// フロントエンドデリゲートを作成する
    ///
    /// 一時停止中の待機でフレームを受理したとき、エージェント経由で
    /// そのフレームを dispatch してから true を返します。
    pub fn delegate(&self, agent: &Agent) -> Rc<PipeDelegate> {
        Rc::new(PipeDelegate {
            agent: agent.downgrade(),
            inbound: self.inner.inbound.clone(),
            outbound: self.inner.outbound.clone(),
        })
    }

    /// 保留中の受信フレームを取り出す（実行スレッド専用）
    ///
    /// 一時停止中はデリゲートが同じキューを消費するため、これは
    /// 通常実行中の埋め込みループから呼びます。
    pub fn try_recv(&self) -> Option<String> {
        self.inner.inbound.try_recv().ok()
    }
}

impl IoFactory for PipeFactory {
    fn create(&self, _path: &str) -> anyhow::Result<Box<dyn InspectorIo>> {
        let transport = self
            .inner
            .transport
            .borrow_mut()
            .take()
            .ok_or(TransportError::EndpointConsumed)?;
        Ok(Box::new(transport))
    }
}

#[derive(Default)]
struct PipeShared {
    connected: Mutex<bool>,
    disconnect_cv: Condvar,
}

impl PipeShared {
    fn mark_disconnected(&self) {
        let mut connected = self.connected.lock().unwrap();
        *connected = false;
        self.disconnect_cv.notify_all();
    }
}

/// パイプのIOスレッドコントローラ
pub struct PipeTransport {
    shared: Arc<PipeShared>,
    hangup_rx: Receiver<()>,
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl InspectorIo for PipeTransport {
    fn start(&mut self) -> anyhow::Result<()> {
        if self.thread.is_some() {
            return Ok(());
        }

        *self.shared.connected.lock().unwrap() = true;

        let (stop_tx, stop_rx) = unbounded::<()>();
        let hangup_rx = self.hangup_rx.clone();
        let shared = self.shared.clone();
        let handle = thread::spawn(move || {
            // フロントエンドの切断か停止指示のどちらかを待つ
            crossbeam_channel::select! {
                recv(hangup_rx) -> _ => {
                    debug!("pipe frontend detached");
                }
                recv(stop_rx) -> _ => {
                    debug!("pipe transport stopping");
                }
            }
            shared.mark_disconnected();
        });

        self.stop_tx = Some(stop_tx);
        self.thread = Some(handle);
        Ok(())
    }

    fn stop(&mut self) {
        // 送信側を落とすと監視スレッドの select が解ける
        self.stop_tx.take();
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }

    fn is_connected(&self) -> bool {
        *self.shared.connected.lock().unwrap()
    }

    fn wait_for_disconnect(&self) {
        let mut connected = self.shared.connected.lock().unwrap();
        while *connected {
            connected = self.shared.disconnect_cv.wait(connected).unwrap();
        }
    }
}

impl Drop for PipeTransport {
    fn drop(&mut self) {
        self.stop_tx.take();
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

/// パイプのフロントエンドデリゲート
pub struct PipeDelegate {
    agent: WeakAgent,
    inbound: Receiver<String>,
    outbound: Sender<String>,
}

impl SessionDelegate for PipeDelegate {
    fn send_message_to_frontend(&self, message: &str) {
        // フロントエンドが既にいなければ黙って捨てる
        let _ = self.outbound.send(message.to_string());
    }

    fn wait_for_frontend_message_while_paused(&self) -> bool {
        match self.inbound.recv() {
            Ok(message) => match self.agent.upgrade() {
                Some(agent) => {
                    agent.dispatch(&message);
                    true
                }
                None => false,
            },
            // フロントエンドの切断で待機を打ち切る
            Err(_) => false,
        }
    }
}

/// フロントエンド側のパイプの端
///
/// ドロップするとフロントエンドの切断として扱われます。
pub struct FrontendHandle {
    to_bridge: Sender<String>,
    from_bridge: Receiver<String>,
    _hangup: Sender<()>,
}

impl FrontendHandle {
    /// プロトコルフレームをブリッジへ送る
    pub fn send(&self, message: impl Into<String>) -> Result<(), TransportError> {
        self.to_bridge
            .send(message.into())
            .map_err(|_| TransportError::Closed)
    }

    /// ブリッジからの次のフレームを待つ
    pub fn recv(&self) -> Result<String, TransportError> {
        self.from_bridge.recv().map_err(|_| TransportError::Closed)
    }

    /// ブリッジからの次のフレームを、タイムアウト付きで待つ
    pub fn recv_timeout(&self, timeout: Duration) -> Option<String> {
        self.from_bridge.recv_timeout(timeout).ok()
    }

    /// ブリッジからのフレームをブロックせずに取り出す
    pub fn try_recv(&self) -> Option<String> {
        self.from_bridge.try_recv().ok()
    }
}
