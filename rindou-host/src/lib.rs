//! Rindou リファレンスホスト
//!
//! このクレートは、ブリッジを実際に動かすための最小限のホスト実装を
//! 提供します。フォアグラウンドタスクと割り込みチェックポイントを備えた
//! スケジューラ、condvarベースのイベントソース、そしてインプロセスの
//! パイプトランスポートです。テストハーネスとデモの土台になります。

pub mod pipe;
pub mod scheduler;

pub use pipe::{pipe, FrontendHandle, PipeDelegate, PipeFactory, PipeTransport, TransportError};
pub use scheduler::{HostScheduler, HostWaker};

/// ホストの結果型
pub type Result<T> = anyhow::Result<T>;
