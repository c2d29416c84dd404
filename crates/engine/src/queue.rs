//! Join-able task queue used between pipeline stages.

use std::collections::VecDeque;
use std::pin::pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Notify;

/// Unbounded multi-producer queue with task acknowledgment.
///
/// Every `put` adds one unit of unfinished work; consumers call
/// [`task_done`](Self::task_done) once the popped item has been fully
/// handled (including any re-enqueue it triggered). [`join`](Self::join)
/// resolves when the unfinished count reaches zero, which is how the
/// pipeline knows a stage has drained.
///
/// Backpressure comes from the bounded worker pools and the fetch
/// semaphore, not from queue capacity: a capacity limit here could
/// deadlock the storage → cid re-enqueue cycle.
pub struct TaskQueue<T> {
    items: Mutex<VecDeque<T>>,
    available: Notify,
    unfinished: AtomicUsize,
    drained: Notify,
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TaskQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            available: Notify::new(),
            unfinished: AtomicUsize::new(0),
            drained: Notify::new(),
        }
    }

    /// Enqueue an item and account for one more unit of unfinished work.
    pub fn put(&self, item: T) {
        self.unfinished.fetch_add(1, Ordering::SeqCst);
        self.items.lock().expect("queue poisoned").push_back(item);
        self.available.notify_one();
    }

    /// Pop the next item, waiting until one is available.
    ///
    /// Cancel safe: an item is only removed in the same poll that returns
    /// it, so dropping the future (e.g. in `select!`) never loses items.
    pub async fn get(&self) -> T {
        let mut notified = pin!(self.available.notified());
        loop {
            notified.as_mut().enable();
            if let Some(item) = self.pop() {
                return item;
            }
            notified.as_mut().await;
            notified.set(self.available.notified());
        }
    }

    fn pop(&self) -> Option<T> {
        let mut items = self.items.lock().expect("queue poisoned");
        let item = items.pop_front();
        // Hand the wakeup on if more work is ready for another consumer.
        if item.is_some() && !items.is_empty() {
            self.available.notify_one();
        }
        item
    }

    /// Acknowledge one previously popped item as fully handled.
    pub fn task_done(&self) {
        let prev = self.unfinished.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(prev > 0, "task_done called more times than put");
        if prev == 1 {
            self.drained.notify_waiters();
        }
    }

    /// Wait until every item ever put has been acknowledged.
    pub async fn join(&self) {
        loop {
            let mut notified = pin!(self.drained.notified());
            notified.as_mut().enable();
            if self.unfinished.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().expect("queue poisoned").is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.lock().expect("queue poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn fifo_order() {
        let q = TaskQueue::new();
        q.put(1);
        q.put(2);
        q.put(3);
        assert_eq!(q.get().await, 1);
        assert_eq!(q.get().await, 2);
        assert_eq!(q.get().await, 3);
    }

    #[tokio::test]
    async fn get_waits_for_put() {
        let q = Arc::new(TaskQueue::new());
        let consumer = {
            let q = q.clone();
            tokio::spawn(async move { q.get().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        q.put(7u32);
        assert_eq!(consumer.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn join_resolves_after_all_acknowledged() {
        let q = Arc::new(TaskQueue::new());
        q.put(1);
        q.put(2);

        let joiner = {
            let q = q.clone();
            tokio::spawn(async move { q.join().await })
        };

        let _ = q.get().await;
        q.task_done();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!joiner.is_finished());

        let _ = q.get().await;
        q.task_done();
        joiner.await.unwrap();
    }

    #[tokio::test]
    async fn join_on_untouched_queue_returns_immediately() {
        let q: TaskQueue<u8> = TaskQueue::new();
        q.join().await;
    }

    #[tokio::test]
    async fn multiple_consumers_each_receive_items() {
        let q = Arc::new(TaskQueue::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let q = q.clone();
            handles.push(tokio::spawn(async move {
                let item = q.get().await;
                q.task_done();
                item
            }));
        }
        for i in 0..4 {
            q.put(i);
        }
        let mut got = Vec::new();
        for h in handles {
            got.push(h.await.unwrap());
        }
        got.sort();
        assert_eq!(got, vec![0, 1, 2, 3]);
        q.join().await;
    }

    #[tokio::test]
    async fn select_drop_does_not_lose_items() {
        let q = Arc::new(TaskQueue::new());
        // Create and drop a waiting get future, as the storage worker's
        // select does with the losing branch.
        {
            let fut = q.get();
            tokio::pin!(fut);
            let _ = tokio::time::timeout(Duration::from_millis(5), fut.as_mut()).await;
        }
        q.put(42);
        assert_eq!(q.get().await, 42);
    }
}
