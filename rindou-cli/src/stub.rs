//! デモ用のスタブエンジン
//!
//! 実際のスクリプトエンジンの代わりに、ブリッジを末端まで動かすための
//! 最小限のインスペクタエンジンと実行環境を提供します。
//! フレームは不透明に扱いますが、一時停止と再開の要求だけは部分文字列で
//! 見分けて、本物のエンジンがするのと同じコールバックを返します。

use rindou_engine::{
    ContextGroupId, ContextHandle, Environment, ExceptionReport, FunctionHandle,
    InspectorBackend, InspectorBackendFactory, InspectorChannel, InspectorClient,
    InspectorSession, NativeCallback, Result, ScriptValue,
};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use tracing::{debug, info};

/// スタブのインスペクタエンジン
///
/// 受け取ったフレームには `{"ack":<frame>}` で応答します。
/// 一時停止が予約されているか `Debugger.pause` を受け取ると
/// クライアントのネストしたループに入り、`Debugger.resume` で抜けます。
#[derive(Default)]
pub struct StubBackend {
    client: RefCell<Option<Weak<dyn InspectorClient>>>,
    pause_pending: Rc<Cell<bool>>,
    contexts: RefCell<Vec<(ContextHandle, String)>>,
}

impl StubBackend {
    fn with_client(&self, f: impl FnOnce(&dyn InspectorClient)) {
        let client = self.client.borrow().clone();
        if let Some(client) = client.and_then(|weak| weak.upgrade()) {
            f(&*client);
        }
    }
}

struct StubSession {
    client: Weak<dyn InspectorClient>,
    channel: Weak<dyn InspectorChannel>,
    pause_pending: Rc<Cell<bool>>,
    group: ContextGroupId,
}

impl StubSession {
    fn with_client(&self, f: impl FnOnce(&dyn InspectorClient)) {
        if let Some(client) = self.client.upgrade() {
            f(&*client);
        }
    }
}

impl InspectorSession for StubSession {
    fn dispatch_protocol_message(&self, message: &str) {
        debug!(frame = message, "stub engine received frame");

        if message.contains("Debugger.resume") {
            if let Some(channel) = self.channel.upgrade() {
                channel.send_response(0, &format!("{{\"ack\":{}}}", message));
            }
            self.with_client(|client| client.quit_message_loop_on_pause());
            return;
        }

        let pause = self.pause_pending.replace(false) || message.contains("Debugger.pause");

        if let Some(channel) = self.channel.upgrade() {
            channel.send_response(0, &format!("{{\"ack\":{}}}", message));
            if pause {
                let timestamp = self
                    .client
                    .upgrade()
                    .map(|client| client.current_time_ms())
                    .unwrap_or(0.0);
                channel.send_notification(&format!(
                    "{{\"method\":\"Debugger.paused\",\"timestamp\":{:.0}}}",
                    timestamp
                ));
            }
        }

        if pause {
            info!("stub engine pausing execution");
            self.with_client(|client| client.run_message_loop_on_pause(self.group));
            info!("stub engine resumed execution");
        }
    }

    fn schedule_pause_on_next_statement(&self, reason: &str, _detail: &str) {
        info!(reason, "pause scheduled for next statement");
        self.pause_pending.set(true);
    }
}

impl InspectorBackend for StubBackend {
    fn connect(
        &self,
        group: ContextGroupId,
        channel: Weak<dyn InspectorChannel>,
    ) -> Rc<dyn InspectorSession> {
        let client = self
            .client
            .borrow()
            .clone()
            .expect("stub backend must be created through its factory");
        Rc::new(StubSession {
            client,
            channel,
            pause_pending: self.pause_pending.clone(),
            group,
        })
    }

    fn context_created(&self, context: ContextHandle, _group: ContextGroupId, name: &str) {
        info!(name, "execution context registered");
        self.contexts
            .borrow_mut()
            .push((context, name.to_string()));
    }

    fn context_destroyed(&self, context: ContextHandle) {
        info!("execution context destroyed");
        self.contexts
            .borrow_mut()
            .retain(|(handle, _)| *handle != context);
    }

    fn exception_thrown(&self, report: ExceptionReport) {
        self.with_client(|client| {
            let context = client.ensure_default_context_in_group(1);
            info!(
                text = %report.text,
                url = %report.url,
                line = report.line_number,
                context = context.raw(),
                "uncaught exception reported"
            );
        });
    }
}

/// スタブエンジンのファクトリ
#[derive(Default)]
pub struct StubBackendFactory {
    backend: Rc<StubBackend>,
}

impl InspectorBackendFactory for StubBackendFactory {
    fn create(&self, client: Weak<dyn InspectorClient>) -> Rc<dyn InspectorBackend> {
        *self.backend.client.borrow_mut() = Some(client);
        self.backend.clone()
    }
}

/// スタブの実行環境
///
/// グローバルコールバックを登録できる、コンテキスト1つだけの環境です。
#[derive(Default)]
pub struct StubEnvironment {
    globals: RefCell<HashMap<String, NativeCallback>>,
}

impl StubEnvironment {
    /// スクリプトがグローバル関数を呼んだことを模倣する
    pub fn invoke_global(&self, name: &str, args: &[ScriptValue]) -> Result<ScriptValue> {
        let globals = self.globals.borrow();
        let callback = globals
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("no such global: {}", name))?;
        callback(args)
    }
}

impl Environment for StubEnvironment {
    fn root_context(&self) -> ContextHandle {
        ContextHandle::new(1)
    }

    fn install_global_callback(&self, name: &str, callback: NativeCallback) {
        self.globals.borrow_mut().insert(name.to_string(), callback);
    }

    fn call_function(
        &self,
        function: &FunctionHandle,
        args: &[ScriptValue],
    ) -> Result<ScriptValue> {
        info!(
            function = function.raw(),
            args = args.len(),
            "stub script function invoked"
        );
        Ok(ScriptValue::Undefined)
    }
}
