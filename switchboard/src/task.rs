//! The task callable invoked by a [`PriorityQueue`](crate::queue::PriorityQueue).
//!

use crate::error::Error;
use crate::request::Request;
use crate::response::Response;
use crate::server::Server;
use futures::future::BoxFuture;
use std::sync::Arc;

/// What a task returns to its queue.
///
/// A task returning the literal `false` in the source language becomes
/// `TaskOutcome::Abort` here; anything else -- including "no opinion" --
/// is `Continue`.
///
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TaskOutcome {
    Continue,
    Abort,
}

pub type TaskResult = Result<TaskOutcome, Error>;

/// A listener: an opaque callable plus, once registered, an integer
/// priority and its insertion order (tracked by the queue, not the task
/// itself).
///
/// Implemented as a trait rather than a bare function pointer so a task
/// can close over state (an `Arc`-shared handler, a plugin's own config)
/// the way a closure would, while still being usable as a trait object
/// behind an `Arc`.
///
pub trait Task: Send + Sync {
    fn call<'a>(
        &'a self,
        req: &'a mut Request,
        res: &'a mut Response,
        ctx: &'a Server,
    ) -> BoxFuture<'a, TaskResult>;
}

/// A shared, cloneable handle to a task, the unit actually stored in
/// listener tables and priority queues.
///
pub type TaskHandle = Arc<dyn Task>;

/// Wraps a plain async closure as a [`Task`].
///
/// Most listeners are registered as closures; `task_fn` is the usual way
/// to produce a [`TaskHandle`] from one:
/// ```ignore
/// let handle = task_fn(|req, res, _ctx| Box::pin(async move {
///     res.set_html("pong", 200, None);
///     Ok(TaskOutcome::Continue)
/// }));
/// ```
///
pub fn task_fn<F>(f: F) -> TaskHandle
where
    F: for<'a> Fn(
            &'a mut Request,
            &'a mut Response,
            &'a Server,
        ) -> BoxFuture<'a, TaskResult>
        + Send
        + Sync
        + 'static,
{
    struct FnTask<F>(F);

    impl<F> Task for FnTask<F>
    where
        F: for<'a> Fn(
                &'a mut Request,
                &'a mut Response,
                &'a Server,
            ) -> BoxFuture<'a, TaskResult>
            + Send
            + Sync,
    {
        fn call<'a>(
            &'a self,
            req: &'a mut Request,
            res: &'a mut Response,
            ctx: &'a Server,
        ) -> BoxFuture<'a, TaskResult> {
            (self.0)(req, res, ctx)
        }
    }

    Arc::new(FnTask(f))
}
