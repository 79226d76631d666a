//! Single-writer/multiple-reader access to the shared [`Context`].
//!
//! Readers take an immutable snapshot (`Arc<Context>`) and never block each other. Writes are
//! queued to a dedicated writer thread and applied one at a time, in submission order, on a copy
//! of the current context which then replaces the snapshot in one step. A read waits for every
//! write submitted before it, so a caller always observes its own writes.
//!
//! Continuations attached to writes run on a separate notifier thread once the write has
//! committed, so they may freely read from or write to the controller again.
use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{mpsc, Arc, Condvar, Mutex, RwLock},
};

use crate::Context;

type Mutation = Box<dyn FnOnce(&mut Context) + Send>;
type Continuation = Box<dyn FnOnce() + Send>;

struct Job {
    ticket: u64,
    mutation: Option<Mutation>,
    then: Option<Continuation>,
}

struct Shared {
    snapshot: RwLock<Arc<Context>>,
    /// Ticket of the last write that has been applied.
    applied: Mutex<u64>,
    applied_changed: Condvar,
}

impl Shared {
    fn current(&self) -> Arc<Context> {
        // The lock is only held to clone or swap the Arc, never while running user code, so it
        // cannot get poisoned.
        let snapshot = self
            .snapshot
            .read()
            .expect("thread holding context lock should not panic");
        Arc::clone(&snapshot)
    }

    fn replace(&self, context: Context) {
        // Constructing new value before requesting the lock to minimize lock span.
        let new_value = Arc::new(context);

        let mut snapshot = self
            .snapshot
            .write()
            .expect("thread holding context lock should not panic");
        *snapshot = new_value;
    }

    fn mark_applied(&self, ticket: u64) {
        let mut applied = self
            .applied
            .lock()
            .expect("thread holding applied lock should not panic");
        *applied = ticket;
        self.applied_changed.notify_all();
    }

    fn wait_applied(&self, ticket: u64) {
        let mut applied = self
            .applied
            .lock()
            .expect("thread holding applied lock should not panic");
        while *applied < ticket {
            applied = self
                .applied_changed
                .wait(applied)
                .expect("thread holding applied lock should not panic");
        }
    }
}

struct Queue {
    sender: mpsc::Sender<Job>,
    /// Ticket of the last write submitted.
    submitted: u64,
}

/// Guards a [`Context`] with a reader-writer barrier discipline.
///
/// Mutations run on the writer thread and must not read from or wait on the controller that is
/// applying them: the read would wait for the mutation itself. Use a continuation instead.
pub(crate) struct AccessController {
    shared: Arc<Shared>,
    queue: Mutex<Queue>,
}

impl AccessController {
    /// Create a controller owning `context` and start its writer and notifier threads.
    ///
    /// # Errors
    ///
    /// Returns an IO error if a thread failed to start.
    pub fn new(context: Context) -> std::io::Result<AccessController> {
        let shared = Arc::new(Shared {
            snapshot: RwLock::new(Arc::new(context)),
            applied: Mutex::new(0),
            applied_changed: Condvar::new(),
        });

        let (notify_sender, notify_receiver) = mpsc::channel::<Continuation>();
        std::thread::Builder::new()
            .name("growthbook-notifier".to_owned())
            .spawn(move || {
                for then in notify_receiver {
                    if catch_unwind(AssertUnwindSafe(then)).is_err() {
                        log::error!(target: "growthbook", "completion callback panicked");
                    }
                }
            })?;

        let (sender, receiver) = mpsc::channel::<Job>();
        {
            // Cloning Arc for move into thread
            let shared = Arc::clone(&shared);
            std::thread::Builder::new()
                .name("growthbook-writer".to_owned())
                .spawn(move || {
                    for job in receiver {
                        if let Some(mutation) = job.mutation {
                            let mut next = Context::clone(&shared.current());
                            match catch_unwind(AssertUnwindSafe(|| mutation(&mut next))) {
                                Ok(()) => shared.replace(next),
                                Err(_) => {
                                    log::error!(target: "growthbook", "context write panicked, discarding it");
                                }
                            }
                        }
                        shared.mark_applied(job.ticket);

                        if let Some(then) = job.then {
                            // Error means the notifier thread is gone and there is nobody left to
                            // notify.
                            let _ = notify_sender.send(then);
                        }
                    }
                    log::debug!(target: "growthbook", "write queue closed");
                })?;
        }

        Ok(AccessController {
            shared,
            queue: Mutex::new(Queue {
                sender,
                submitted: 0,
            }),
        })
    }

    /// Run `f` against the current snapshot and return its result.
    ///
    /// Waits for writes submitted before this call to apply. Never waits for other readers.
    pub fn read<T>(&self, f: impl FnOnce(&Context) -> T) -> T {
        f(&self.snapshot())
    }

    /// Get the current snapshot, including every write submitted before this call.
    pub fn snapshot(&self) -> Arc<Context> {
        let ticket = self.lock_queue().submitted;
        self.shared.wait_applied(ticket);
        self.shared.current()
    }

    /// Queue `mutation` and return without waiting for it to apply.
    pub fn write(&self, mutation: impl FnOnce(&mut Context) + Send + 'static) {
        self.submit(Some(Box::new(mutation)), None);
    }

    /// Queue `mutation` and schedule `on_applied` to run once it has committed.
    pub fn write_and_then(
        &self,
        mutation: impl FnOnce(&mut Context) + Send + 'static,
        on_applied: impl FnOnce() + Send + 'static,
    ) {
        self.submit(Some(Box::new(mutation)), Some(Box::new(on_applied)));
    }

    /// Schedule `f` to run after every write submitted so far has committed.
    pub fn then(&self, f: impl FnOnce() + Send + 'static) {
        self.submit(None, Some(Box::new(f)));
    }

    /// Queue `mutation` and block until it has committed.
    pub fn write_and_wait(&self, mutation: impl FnOnce(&mut Context) + Send + 'static) {
        if let Some(ticket) = self.submit(Some(Box::new(mutation)), None) {
            self.shared.wait_applied(ticket);
        }
    }

    /// Returns the ticket of the queued job, or `None` if the writer thread has died.
    fn submit(&self, mutation: Option<Mutation>, then: Option<Continuation>) -> Option<u64> {
        let mut queue = self.lock_queue();
        // Tickets are handed out under the same lock as the send, so ticket order is queue order.
        let ticket = queue.submitted + 1;
        let job = Job {
            ticket,
            mutation,
            then,
        };
        if queue.sender.send(job).is_err() {
            log::error!(target: "growthbook", "writer thread is gone, dropping context write");
            return None;
        }
        queue.submitted = ticket;
        Some(ticket)
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, Queue> {
        self.queue
            .lock()
            .expect("thread holding queue lock should not panic")
    }
}
