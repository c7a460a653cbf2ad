//! クロススレッド起床チャネル
//!
//! IOスレッド起動要求を実行スレッドへ確実に届けるための機構です。
//! 要求の発生時、実行スレッドは (a) 自身のイベントソースで待機中か、
//! (b) スクリプトを実行していてポーリングを一切していないか、の
//! どちらでもありえます。そのため配送は三重化されています。
//!
//! 共有状態はエージェントごとに所有され、`Agent::start` のたびに
//! 作り直されます。プロセス全体の静的状態は持ちません。

use rindou_engine::{ExecutionWaker, TaskScheduler};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 起床要求の共有状態
///
/// 書き込みはどのスレッドからでも可。消費は実行スレッドのみが行います。
#[derive(Debug, Default)]
pub(crate) struct WakeState {
    requested: AtomicBool,
}

impl WakeState {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 起動要求を記録する
    pub(crate) fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    /// 保留中の要求を消費する
    pub(crate) fn take(&self) -> bool {
        self.requested.swap(false, Ordering::SeqCst)
    }
}

/// クロススレッドのIOスレッド起動ハンドル
///
/// エージェント本体はスレッド親和ですが、このハンドルは任意のスレッドへ
/// 渡して使えます。
#[derive(Clone)]
pub struct WakeHandle {
    state: Arc<WakeState>,
    waker: Arc<dyn ExecutionWaker>,
    scheduler: Arc<dyn TaskScheduler>,
}

impl WakeHandle {
    pub(crate) fn new(
        state: Arc<WakeState>,
        waker: Arc<dyn ExecutionWaker>,
        scheduler: Arc<dyn TaskScheduler>,
    ) -> Self {
        Self {
            state,
            waker,
            scheduler,
        }
    }

    /// IOスレッドの起動を実行スレッドへ要求する
    ///
    /// 配送経路は3つあります:
    /// 1. 非同期起床シグナル — イベントソースで待機中のスレッドを起こす
    /// 2. フォアグラウンドタスク — 次のキュー掃き出しで届く。ネストした
    ///    一時停止ループの内側を含む
    /// 3. エンジン割り込み — スクリプト実行中でも次の安全地点で届く
    ///
    /// 最後にもう一度シグナルし、このサイクルの掃き出しが終わった後に
    /// 割り込みが武装される競合を閉じます。すべての経路は冪等な
    /// `start_io_thread` に合流するため、重複配送は安全です。
    pub fn request_io_thread_start(&self) {
        self.state.request();
        self.waker.wake();

        let state = self.state.clone();
        let waker = self.waker.clone();
        self.scheduler.post_foreground_task(Box::new(move || {
            state.request();
            waker.wake();
        }));

        let state = self.state.clone();
        let waker = self.waker.clone();
        self.scheduler.request_interrupt(Box::new(move || {
            state.request();
            waker.wake();
        }));

        self.waker.wake();
    }
}
