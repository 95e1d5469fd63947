use futures::{
    future::{BoxFuture, FutureExt},
    task::{waker_ref, ArcWake, Context, Poll},
};
use futures_channel::oneshot;
use queues::{IsQueue, Queue};
use std::{
    cell::RefCell,
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex},
};

use crate::error::{TbError, TbResult};

// One ready queue per simulation thread. Wakers only ever fire on the thread
// that owns the simulator, so the queue never has to cross threads.
thread_local! {
    static READY_QUEUE: RefCell<Queue<Arc<Task>>> = RefCell::new(Queue::new());
}

pub fn schedule_task(task: Arc<Task>) {
    READY_QUEUE.with(|q| {
        let _ = q.borrow_mut().add(task);
    });
}

fn next_task() -> Option<Arc<Task>> {
    READY_QUEUE.with(|q| q.borrow_mut().remove().ok())
}

pub(crate) fn clear_ready_queue() {
    READY_QUEUE.with(|q| *q.borrow_mut() = Queue::new());
}

/// Runs every ready task until none is left.
#[inline]
pub fn run_once() {
    while let Some(task) = next_task() {
        process_task(task);
    }
}

#[inline]
fn process_task(task: Arc<Task>) {
    if task.is_cancelled() {
        // dropped once the last waker referencing it goes away
        return;
    }

    let mut fut_slot = lock(&task.future);
    if let Some(mut fut) = fut_slot.take() {
        let waker = waker_ref(&task);
        let context = &mut Context::from_waker(&*waker);
        match fut.as_mut().poll(context) {
            Poll::Pending => {
                *fut_slot = Some(fut);
            }
            Poll::Ready(result) => {
                drop(fut_slot);
                *lock(&task.state) = TaskState::Done;
                if let Some(tx) = lock(&task.join_tx).take() {
                    let _ = tx.send(result);
                }
            }
        }
    }
    // woken again after completion: nothing left to poll
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match m.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(PartialEq, Debug, Clone, Copy)]
enum TaskState {
    Pending,
    Done,
    Cancelled,
}

pub struct Task {
    future: Mutex<Option<BoxFuture<'static, TbResult>>>,
    state: Mutex<TaskState>,
    name: String,
    join_tx: Mutex<Option<oneshot::Sender<TbResult>>>,
}

impl Task {
    /// Runs `future` concurrently with the calling task.
    pub fn fork(future: impl Future<Output = TbResult> + Send + 'static) -> JoinHandle {
        Task::spawn(future, "forked")
    }

    pub fn spawn(
        future: impl Future<Output = TbResult> + Send + 'static,
        name: &str,
    ) -> JoinHandle {
        let (task, join_handle) = Task::new(future.boxed(), name);
        schedule_task(task);
        join_handle
    }

    fn new(fut: BoxFuture<'static, TbResult>, name: &str) -> (Arc<Self>, JoinHandle) {
        let (tx, rx) = oneshot::channel();
        let task = Arc::new(Self {
            future: Mutex::new(Some(fut)),
            state: Mutex::new(TaskState::Pending),
            name: name.to_string(),
            join_tx: Mutex::new(Some(tx)),
        });
        let join_handle = JoinHandle {
            awaited_task: Some(task.clone()),
            join_rx: rx,
        };
        (task, join_handle)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cancel(&self) {
        // the executor skips cancelled tasks; dropping the sender resolves
        // anybody awaiting the handle
        *lock(&self.state) = TaskState::Cancelled;
        lock(&self.join_tx).take();
    }

    fn is_cancelled(&self) -> bool {
        *lock(&self.state) == TaskState::Cancelled
    }

    pub fn is_done(&self) -> bool {
        *lock(&self.state) == TaskState::Done
    }
}

impl ArcWake for Task {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        schedule_task(arc_self.clone());
    }
}

pub struct JoinHandle {
    awaited_task: Option<Arc<Task>>,
    join_rx: oneshot::Receiver<TbResult>,
}

impl JoinHandle {
    pub fn task(&self) -> Option<&Arc<Task>> {
        self.awaited_task.as_ref()
    }

    pub fn cancel(mut self) {
        if let Some(task) = self.awaited_task.take() {
            task.cancel();
        }
    }
}

impl Future for JoinHandle {
    type Output = TbResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.join_rx.poll_unpin(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => {
                let name = self
                    .awaited_task
                    .as_ref()
                    .map(|t| t.name.clone())
                    .unwrap_or_default();
                Poll::Ready(Err(TbError::Failed(format!("task '{}' was cancelled", name))))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tb_obj::TbObj;

    #[test]
    fn forked_tasks_run_in_fifo_order() {
        let log = TbObj::new(Vec::new());
        for i in 0..3 {
            let log = log.clone();
            Task::fork(async move {
                log.with_mut(|l| l.push(i));
                Ok(())
            });
        }
        run_once();
        assert_eq!(*log.get(), vec![0, 1, 2]);
    }

    #[test]
    fn join_handle_delivers_result() {
        let out = TbObj::new(None);
        let out2 = out.clone();
        Task::fork(async move {
            let child = Task::fork(async { Err(TbError::Failed("boom".into())) });
            let r = child.await;
            out2.with_mut(|o| *o = Some(r));
            Ok(())
        });
        run_once();
        assert_eq!(*out.get(), Some(Err(TbError::Failed("boom".into()))));
    }

    #[test]
    fn cancelled_task_never_runs() {
        let ran = TbObj::new(false);
        let ran2 = ran.clone();
        let handle = Task::fork(async move {
            ran2.with_mut(|r| *r = true);
            Ok(())
        });
        handle.cancel();
        run_once();
        assert!(!*ran.get());
        clear_ready_queue();
    }
}
