//! Rindou スクリプトエンジン境界
//!
//! このクレートは、ブリッジがスクリプト実行エンジン側と会話するための
//! 境界（トレイトと不透明ハンドル）を提供します。
//! インスペクタライブラリ、実行環境、スケジューラへの入口がここに集まります。
//! ブリッジ本体のロジックは rindou-core にあります。

pub mod environment;
pub mod inspector;
pub mod scheduler;

pub use environment::{Environment, FunctionHandle, NativeCallback, ScriptValue};
pub use inspector::{
    ContextGroupId, ContextHandle, ExceptionReport, InspectorBackend, InspectorBackendFactory,
    InspectorChannel, InspectorClient, InspectorSession, ScriptMessage, StackFrame, StackTrace,
};
pub use scheduler::{ExecutionWaker, ForegroundTask, InterruptFn, TaskScheduler};

/// エンジン境界の結果型
pub type Result<T> = anyhow::Result<T>;
