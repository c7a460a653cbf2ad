//! プロトコルチャネル
//!
//! インスペクタセッション1本とフロントエンドデリゲートを橋渡しします。
//! 接続時に生成され、切断時に破棄されます。破棄の前には必ずネストした
//! 一時停止ループを解除しておく必要があります（SessionClient が行います）。

use rindou_engine::{ContextGroupId, InspectorBackend, InspectorChannel, InspectorSession};
use std::rc::Rc;

/// フロントエンドデリゲート
///
/// トランスポート層が実装する外部協力者。一時停止中の待機と、
/// フロントエンドへのフレーム送出を担います。
pub trait SessionDelegate {
    /// プロトコルフレームをフロントエンドへ送出する
    fn send_message_to_frontend(&self, message: &str);

    /// 一時停止中、フロントエンドからの次のフレームを待つ
    ///
    /// フレームを受理して処理したら true を返します。フロントエンドが
    /// もうフレームを送らない（切断した）場合は false を返し、待機の
    /// 打ち切りを指示します。トランスポートが閉じたときに必ずブロックが
    /// 解除されるよう実装してください。
    fn wait_for_frontend_message_while_paused(&self) -> bool;
}

/// プロトコルチャネル
///
/// インスペクタセッションハンドルを所有し、デリゲートへの参照を保持します。
pub struct ProtocolChannel {
    session: Rc<dyn InspectorSession>,
    delegate: Rc<dyn SessionDelegate>,
}

impl ProtocolChannel {
    /// 新しいチャネルを接続する
    ///
    /// セッション側にはチャネルへの弱参照だけを渡します。`connect` の
    /// 処理中はまだチャネルが構築途中のため、セッションはその場で
    /// コールバックしてはいけません。
    pub(crate) fn new(
        backend: &dyn InspectorBackend,
        group: ContextGroupId,
        delegate: Rc<dyn SessionDelegate>,
    ) -> Rc<Self> {
        Rc::new_cyclic(|weak: &std::rc::Weak<Self>| {
            let session = backend.connect(group, weak.clone());
            Self { session, delegate }
        })
    }

    /// 受信したプロトコルフレームをセッションに処理させる
    pub fn dispatch_protocol_message(&self, message: &str) {
        self.session.dispatch_protocol_message(message);
    }

    /// 次のステートメントでの一時停止を予約する
    ///
    /// 理由文字列は短い理由と詳細説明の両方として使われます。
    pub fn schedule_pause_on_next_statement(&self, reason: &str) {
        self.session.schedule_pause_on_next_statement(reason, reason);
    }

    /// 一時停止中にフロントエンドからの次のフレームを待つ
    pub fn wait_for_frontend_message(&self) -> bool {
        self.delegate.wait_for_frontend_message_while_paused()
    }

    /// フレームをフロントエンドへ送出する
    ///
    /// トランスポートには要求と応答を関連付ける概念がない（関連付けは
    /// フレーム自身に符号化済み）ため、応答もイベントもここに合流します。
    fn send_to_frontend(&self, message: &str) {
        self.delegate.send_message_to_frontend(message);
    }
}

impl InspectorChannel for ProtocolChannel {
    fn send_response(&self, _call_id: u64, message: &str) {
        self.send_to_frontend(message);
    }

    fn send_notification(&self, message: &str) {
        self.send_to_frontend(message);
    }

    fn flush_protocol_notifications(&self) {
        // バッファリングしないトランスポートでは何もしない
    }
}
