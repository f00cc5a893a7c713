use std::{
    fmt::Debug,
    future::Future,
    sync::{Arc, Mutex, RwLock},
};

use eframe::egui::Context;
use ring_channel::RingSender;
use tokio::runtime::Handle;
use tokio_util::sync::{CancellationToken, DropGuard};

type ActionSender<A> = Arc<dyn Fn(A) + Send + Sync>;

/// Delivers actions to the UI thread, either directly or as the result of
/// work run on the background runtime.
///
/// Every clone and scoped worker shares the same cancellation token, which
/// is cancelled once the last handle is dropped.
pub(crate) struct StateWorker<A> {
    rt: Handle,
    tx: ActionSender<A>,
    token: CancellationToken,
    egui_ctx: Arc<RwLock<Option<Context>>>,
    _guard: Arc<DropGuard>,
}

impl<A> Clone for StateWorker<A> {
    fn clone(&self) -> Self {
        Self {
            rt: self.rt.clone(),
            tx: self.tx.clone(),
            token: self.token.clone(),
            egui_ctx: self.egui_ctx.clone(),
            _guard: self._guard.clone(),
        }
    }
}

impl<A> StateWorker<A>
where
    A: Debug + Send + 'static,
{
    pub(crate) fn new(rt: Handle, tx: RingSender<A>, token: CancellationToken) -> Self {
        let tx = Mutex::new(tx);

        let tx: ActionSender<A> = Arc::new(move |action: A| {
            let Ok(mut tx) = tx.lock() else {
                tracing::error!("action sender was poisoned");
                return;
            };

            if tx.send(action).is_err() {
                tracing::warn!("ui is gone, dropping action");
            }
        });

        Self {
            rt,
            tx,
            _guard: Arc::new(token.clone().drop_guard()),
            token,
            egui_ctx: Default::default(),
        }
    }

    pub(crate) fn set_egui_ctx(&mut self, ctx: Context) {
        match self.egui_ctx.write() {
            Ok(mut egui_ctx) => *egui_ctx = Some(ctx),
            Err(_) => tracing::error!("egui context lock was poisoned"),
        }
    }

    fn request_repaint(&self) {
        if let Ok(Some(ctx)) = self.egui_ctx.read().as_deref() {
            ctx.request_repaint();
        }
    }

    /// Queues an action for the next frame.
    pub(crate) fn send(&self, action: A) {
        tracing::trace!(?action, "sending action");

        (self.tx)(action);
        self.request_repaint();
    }

    /// Creates a worker for a child component whose actions are wrapped
    /// into this worker's action type.
    pub(crate) fn scoped<B>(&self, wrap: fn(B) -> A) -> StateWorker<B>
    where
        B: Debug + Send + 'static,
    {
        let tx = self.tx.clone();

        StateWorker {
            rt: self.rt.clone(),
            tx: Arc::new(move |action: B| tx(wrap(action))),
            token: self.token.clone(),
            egui_ctx: self.egui_ctx.clone(),
            _guard: self._guard.clone(),
        }
    }

    /// A token cancelled when either it or the worker is cancelled.
    pub(crate) fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Runs a future on the background runtime and sends its output.
    pub(crate) fn perform<F>(&self, fut: F)
    where
        F: Future<Output = A> + Send + 'static,
    {
        self.perform_cancellable(self.child_token(), fut);
    }

    /// Like [`StateWorker::perform`], but the future is dropped without
    /// sending anything once `token` is cancelled.
    pub(crate) fn perform_cancellable<F>(&self, token: CancellationToken, fut: F)
    where
        F: Future<Output = A> + Send + 'static,
    {
        let worker = self.clone();

        self.rt.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!("task cancelled");
                }
                action = fut => {
                    worker.send(action);
                }
            }
        });
    }

    /// Applies an action to a component's state.
    pub(crate) fn apply<S, F>(&self, state: &mut S, action: A, f: F)
    where
        S: Debug,
        F: FnOnce(&mut S, A),
    {
        let span = tracing::debug_span!("apply", ?action);
        let _entered = span.enter();

        f(state, action);

        tracing::trace!(?state, "applied action");
    }
}
