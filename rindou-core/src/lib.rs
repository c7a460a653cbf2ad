//! Rindou ブリッジのコア機能
//!
//! このクレートは、外部のデバッグフロントエンドと実行中のスクリプトエンジンを
//! 橋渡しする中核ロジックを提供します。IOスレッドとの協調、プロトコル
//! フレームの多重化、意図的な一時停止中のネストしたメッセージループを扱います。

pub mod agent;
pub mod channel;
pub mod errors;
pub mod io;
pub mod session;
pub mod wake;

pub use agent::{Agent, WeakAgent};
pub use channel::{ProtocolChannel, SessionDelegate};
pub use io::{InspectorIo, IoFactory};
pub use session::{SessionClient, CONTEXT_GROUP_ID};
pub use wake::WakeHandle;

// 他のクレートから使用するために再エクスポート
pub use rindou_engine::{ContextGroupId, ContextHandle, ScriptMessage, ScriptValue};

/// ブリッジの結果型
pub type Result<T> = anyhow::Result<T>;
