//! パイプトランスポートの接続・切断・待機のテスト

use rindou_core::{Agent, IoFactory, SessionDelegate};
use rindou_engine::{
    ContextGroupId, ContextHandle, Environment, ExceptionReport, ExecutionWaker, FunctionHandle,
    InspectorBackend, InspectorBackendFactory, InspectorChannel, InspectorClient,
    InspectorSession, NativeCallback, ScriptValue,
};
use rindou_host::{pipe, HostScheduler};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

struct StubEnvironment;

impl Environment for StubEnvironment {
    fn root_context(&self) -> ContextHandle {
        ContextHandle::new(1)
    }

    fn install_global_callback(&self, _name: &str, _callback: NativeCallback) {}

    fn call_function(
        &self,
        _function: &FunctionHandle,
        _args: &[ScriptValue],
    ) -> anyhow::Result<ScriptValue> {
        Ok(ScriptValue::Undefined)
    }
}

/// dispatch されたフレームを記録するインスペクタエンジンのスタブ
#[derive(Default)]
struct RecordingBackend {
    dispatched: Rc<RefCell<Vec<String>>>,
}

struct RecordingSession {
    dispatched: Rc<RefCell<Vec<String>>>,
}

impl InspectorSession for RecordingSession {
    fn dispatch_protocol_message(&self, message: &str) {
        self.dispatched.borrow_mut().push(message.to_string());
    }

    fn schedule_pause_on_next_statement(&self, _reason: &str, _detail: &str) {}
}

impl InspectorBackend for RecordingBackend {
    fn connect(
        &self,
        _group: ContextGroupId,
        _channel: Weak<dyn InspectorChannel>,
    ) -> Rc<dyn InspectorSession> {
        Rc::new(RecordingSession {
            dispatched: self.dispatched.clone(),
        })
    }

    fn context_created(&self, _context: ContextHandle, _group: ContextGroupId, _name: &str) {}
    fn context_destroyed(&self, _context: ContextHandle) {}
    fn exception_thrown(&self, _report: ExceptionReport) {}
}

struct StubBackendFactory {
    backend: Rc<RecordingBackend>,
}

impl InspectorBackendFactory for StubBackendFactory {
    fn create(&self, _client: Weak<dyn InspectorClient>) -> Rc<dyn InspectorBackend> {
        self.backend.clone()
    }
}

struct NullWaker;

impl ExecutionWaker for NullWaker {
    fn wake(&self) {}
}

/// パイプをトランスポートにした起動済みエージェントを組み立てる
fn started_agent() -> (
    Agent,
    rindou_host::PipeFactory,
    rindou_host::FrontendHandle,
    Rc<RefCell<Vec<String>>>,
) {
    let (factory, frontend) = pipe();
    let backend = Rc::new(RecordingBackend::default());
    let dispatched = backend.dispatched.clone();
    let agent = Agent::new(
        Arc::new(NullWaker),
        Box::new(factory.clone()),
        Box::new(StubBackendFactory { backend }),
    );
    agent
        .start(
            Rc::new(StubEnvironment),
            Arc::new(HostScheduler::new()),
            "",
        )
        .expect("agent should start over the pipe");
    (agent, factory, frontend, dispatched)
}

/// 条件が成り立つまで短い間隔でポーリングする
fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn test_transport_endpoint_is_single_use() {
    let (factory, _frontend) = pipe();

    let first = factory.create("");
    assert!(first.is_ok());

    let second = factory.create("");
    assert!(second.is_err());
}

#[test]
fn test_frames_flow_in_both_directions() {
    let (agent, factory, frontend, _dispatched) = started_agent();

    frontend.send("{\"id\":1}").expect("send should succeed");
    assert_eq!(factory.try_recv().as_deref(), Some("{\"id\":1}"));
    assert_eq!(factory.try_recv(), None);

    let delegate = factory.delegate(&agent);
    delegate.send_message_to_frontend("{\"id\":1,\"result\":{}}");
    assert_eq!(
        frontend.recv_timeout(Duration::from_secs(1)).as_deref(),
        Some("{\"id\":1,\"result\":{}}")
    );
}

#[test]
fn test_is_connected_tracks_frontend_lifetime() {
    let (agent, _factory, frontend, _dispatched) = started_agent();

    assert!(agent.is_connected());

    drop(frontend);
    assert!(wait_until(Duration::from_secs(5), || !agent.is_connected()));
}

#[test]
fn test_wait_for_disconnect_unblocks_when_frontend_detaches() {
    let (agent, _factory, frontend, _dispatched) = started_agent();

    let dropper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        drop(frontend);
    });

    let start = Instant::now();
    agent.wait_for_disconnect();
    assert!(start.elapsed() < Duration::from_secs(5));

    dropper.join().unwrap();
}

#[test]
fn test_stop_marks_transport_disconnected() {
    let (agent, _factory, _frontend, _dispatched) = started_agent();

    agent.stop();
    assert!(!agent.is_connected());

    // トランスポートなしの待機はコンテキスト破棄後すぐ戻る
    let start = Instant::now();
    agent.wait_for_disconnect();
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
fn test_paused_wait_redispatches_frames() {
    let (agent, factory, frontend, dispatched) = started_agent();

    let delegate = factory.delegate(&agent);
    agent.connect(delegate.clone());

    frontend.send("{\"method\":\"Debugger.resume\"}").unwrap();
    assert!(delegate.wait_for_frontend_message_while_paused());
    assert_eq!(
        dispatched.borrow().as_slice(),
        ["{\"method\":\"Debugger.resume\"}"]
    );
}

#[test]
fn test_paused_wait_reports_frontend_detach() {
    let (agent, factory, frontend, _dispatched) = started_agent();

    let delegate = factory.delegate(&agent);
    agent.connect(delegate.clone());

    // 切断でブロックが解け、待機の打ち切りが通知される
    let sender = thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        drop(frontend);
    });

    assert!(!delegate.wait_for_frontend_message_while_paused());
    sender.join().unwrap();
}
