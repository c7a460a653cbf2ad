//! 実行スレッドのリファレンススケジューラ
//!
//! フォアグラウンドタスクキュー、エンジン割り込みのチェックポイント、
//! condvarベースのイベントソースを1つにまとめたホスト実装です。
//! タスクと割り込みはどのスレッドからでも投入でき、実行は
//! 実行スレッドだけが行います。

use rindou_engine::{ExecutionWaker, ForegroundTask, InterruptFn, TaskScheduler};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

#[derive(Default)]
struct SchedulerShared {
    foreground: Mutex<VecDeque<ForegroundTask>>,
    interrupts: Mutex<Vec<InterruptFn>>,
    /// イベントソースのシグナル状態
    signaled: Mutex<bool>,
    wake_cv: Condvar,
}

impl SchedulerShared {
    fn signal_wake(&self) {
        let mut signaled = self.signaled.lock().unwrap();
        *signaled = true;
        self.wake_cv.notify_all();
    }
}

/// ホストスケジューラ
#[derive(Clone, Default)]
pub struct HostScheduler {
    shared: Arc<SchedulerShared>,
}

impl HostScheduler {
    /// 新しいスケジューラを作成する
    pub fn new() -> Self {
        Self::default()
    }

    /// イベントソース起床用のシグナルを取得する
    pub fn waker(&self) -> Arc<HostWaker> {
        Arc::new(HostWaker {
            shared: self.shared.clone(),
        })
    }

    /// イベントソースが起床するまで待つ（実行スレッド専用）
    ///
    /// シグナル済みなら消費して即座に戻ります。タイムアウトした場合は
    /// false を返します。
    pub fn wait_for_wake(&self, timeout: Duration) -> bool {
        let mut signaled = self.shared.signaled.lock().unwrap();
        if !*signaled {
            let (guard, _result) = self
                .shared
                .wake_cv
                .wait_timeout(signaled, timeout)
                .unwrap();
            signaled = guard;
        }
        let woken = *signaled;
        *signaled = false;
        woken
    }

    /// エンジンの安全な割り込み地点を模して、保留中の割り込みを
    /// すべて実行する（実行スレッド専用）
    ///
    /// 実行した割り込みの数を返します。
    pub fn run_interrupt_checkpoint(&self) -> usize {
        let pending: Vec<InterruptFn> = {
            let mut interrupts = self.shared.interrupts.lock().unwrap();
            interrupts.drain(..).collect()
        };
        let count = pending.len();
        for interrupt in pending {
            interrupt();
        }
        count
    }
}

impl TaskScheduler for HostScheduler {
    fn post_foreground_task(&self, task: ForegroundTask) {
        self.shared.foreground.lock().unwrap().push_back(task);
        self.shared.signal_wake();
    }

    fn pump_foreground_task(&self) -> bool {
        // タスクがさらにタスクを投入してもデッドロックしないよう、
        // ロックの外で実行する
        let task = self.shared.foreground.lock().unwrap().pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    fn request_interrupt(&self, interrupt: InterruptFn) {
        self.shared.interrupts.lock().unwrap().push(interrupt);
        self.shared.signal_wake();
    }
}

/// 実行スレッドのイベントソースを起床させるシグナル
pub struct HostWaker {
    shared: Arc<SchedulerShared>,
}

impl ExecutionWaker for HostWaker {
    fn wake(&self) {
        self.shared.signal_wake();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_foreground_tasks_run_in_post_order() {
        let scheduler = HostScheduler::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for n in 0..3 {
            let order = order.clone();
            scheduler.post_foreground_task(Box::new(move || {
                order.lock().unwrap().push(n);
            }));
        }

        while scheduler.pump_foreground_task() {}
        assert!(!scheduler.pump_foreground_task());
        assert_eq!(order.lock().unwrap().as_slice(), [0, 1, 2]);
    }

    #[test]
    fn test_task_may_post_another_task() {
        let scheduler = HostScheduler::new();
        let ran = Arc::new(AtomicUsize::new(0));

        let inner_scheduler = scheduler.clone();
        let inner_ran = ran.clone();
        scheduler.post_foreground_task(Box::new(move || {
            let ran = inner_ran.clone();
            inner_scheduler.post_foreground_task(Box::new(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            }));
        }));

        while scheduler.pump_foreground_task() {}
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_interrupt_checkpoint_runs_pending_interrupts() {
        let scheduler = HostScheduler::new();
        let ran = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let ran = ran.clone();
            scheduler.request_interrupt(Box::new(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            }));
        }

        assert_eq!(scheduler.run_interrupt_checkpoint(), 2);
        assert_eq!(scheduler.run_interrupt_checkpoint(), 0);
        assert_eq!(ran.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_wake_unblocks_waiting_thread() {
        let scheduler = HostScheduler::new();
        let waker = scheduler.waker();

        let waiter = {
            let scheduler = scheduler.clone();
            thread::spawn(move || {
                let start = Instant::now();
                let woken = scheduler.wait_for_wake(Duration::from_secs(5));
                (woken, start.elapsed())
            })
        };

        thread::sleep(Duration::from_millis(20));
        waker.wake();

        let (woken, elapsed) = waiter.join().unwrap();
        assert!(woken);
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn test_signaled_wake_is_consumed() {
        let scheduler = HostScheduler::new();
        scheduler.waker().wake();

        assert!(scheduler.wait_for_wake(Duration::from_millis(1)));
        assert!(!scheduler.wait_for_wake(Duration::from_millis(1)));
    }
}
