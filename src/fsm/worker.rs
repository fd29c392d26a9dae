// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Fixed-size pool of OS threads, each running a single-threaded cooperative
//! loop over one `mio::Poll` plus a min-heap of timers. A worker executes
//! three kinds of work, per spec.md §4.A: `worker_task` (a one-shot closure
//! posted from another thread), `worker_fd` (OS readiness), `worker_timer`
//! (a cooperative timer firing). Handlers run to completion before the next
//! event is processed — nothing here ever blocks.

use std::collections::{BinaryHeap, HashMap};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use mio::event::Source;
use mio::{Events, Interest, Poll, Token, Waker};

use super::timer::{TimerEntry, TimerHandle, TimerId};

const WAKE_TOKEN: Token = Token(usize::MAX);

/// Anything the worker can poll for readiness: the registered `mio` source
/// plus the callback to run when it fires. Transports implement this for
/// their connection type (see `transport::stream`).
pub trait Readable: Source + Send {
    fn on_ready(&mut self, readable: bool, writable: bool);
}

type Task = Box<dyn FnOnce(&mut WorkerLoop) + Send>;

enum ToWorker {
    Task(Task),
    Register {
        token: Token,
        interest: Interest,
        source: Box<dyn Readable>,
    },
    Reregister {
        token: Token,
        interest: Interest,
    },
    Deregister(Token),
    Timer {
        deadline: Instant,
        id: TimerId,
        cancelled: Arc<AtomicBool>,
        callback: Box<dyn FnOnce() + Send>,
    },
    CancelTimer(TimerId),
    Shutdown,
}

/// A cloneable, `Send + Sync` reference to a running worker. This is what
/// the rest of the crate holds on to; the worker thread itself only exists
/// inside [`Worker`].
#[derive(Clone)]
pub struct WorkerHandle {
    to_worker: mpsc::Sender<ToWorker>,
    waker: Arc<Waker>,
    next_token: Arc<AtomicUsize>,
}

impl WorkerHandle {
    /// Hands ownership of an established connection to the worker and
    /// arms it for readiness notifications. Returns the token used for
    /// later `reregister`/`deregister` calls.
    pub fn register(&self, source: Box<dyn Readable>, interest: Interest) -> Token {
        let token = Token(self.next_token.fetch_add(1, Ordering::Relaxed));
        let _ = self.to_worker.send(ToWorker::Register {
            token,
            interest,
            source,
        });
        let _ = self.waker.wake();
        token
    }

    pub fn reregister(&self, token: Token, interest: Interest) {
        let _ = self.to_worker.send(ToWorker::Reregister { token, interest });
        let _ = self.waker.wake();
    }

    pub fn deregister(&self, token: Token) {
        let _ = self.to_worker.send(ToWorker::Deregister(token));
        let _ = self.waker.wake();
    }

    /// Posts a one-shot closure to run on the worker thread — the
    /// `worker_task` kind of work from spec.md §4.A, used to offload socket
    /// I/O arming from the application thread.
    pub fn spawn_task<F>(&self, task: F)
    where
        F: FnOnce(&mut WorkerLoop) + Send + 'static,
    {
        let _ = self.to_worker.send(ToWorker::Task(Box::new(task)));
        let _ = self.waker.wake();
    }

    /// Schedules `callback` to run once, at or after `deadline`.
    pub fn schedule_timer<F>(&self, deadline: Instant, callback: F) -> TimerHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let id = TimerId::next();
        let (handle, cancelled) = TimerHandle::new(id);
        let _ = self.to_worker.send(ToWorker::Timer {
            deadline,
            id,
            cancelled,
            callback: Box::new(callback),
        });
        let _ = self.waker.wake();
        handle
    }

    pub fn schedule_timer_after<F>(&self, delay: Duration, callback: F) -> TimerHandle
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule_timer(Instant::now() + delay, callback)
    }

    pub fn cancel_timer(&self, id: TimerId) {
        let _ = self.to_worker.send(ToWorker::CancelTimer(id));
        let _ = self.waker.wake();
    }
}

/// Handed to task closures so they can touch the worker's actual `Poll`
/// (which, unlike `WorkerHandle`, cannot cross threads).
pub struct WorkerLoop<'a> {
    pub poll: &'a mut Poll,
}

/// One worker thread plus its `mio::Poll`.
pub struct Worker {
    handle: WorkerHandle,
    join: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn spawn(name: String) -> io::Result<Worker> {
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKE_TOKEN)?);
        let (tx, rx) = mpsc::channel();

        let handle = WorkerHandle {
            to_worker: tx,
            waker,
            next_token: Arc::new(AtomicUsize::new(0)),
        };

        let join = thread::Builder::new()
            .name(name)
            .spawn(move || run(poll, rx))
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

        Ok(Worker {
            handle,
            join: Some(join),
        })
    }

    pub fn handle(&self) -> WorkerHandle {
        self.handle.clone()
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        let _ = self.handle.to_worker.send(ToWorker::Shutdown);
        let _ = self.handle.waker.wake();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

fn run(mut poll: Poll, rx: mpsc::Receiver<ToWorker>) {
    let mut events = Events::with_capacity(256);
    let mut timers: BinaryHeap<TimerEntry> = BinaryHeap::new();
    let mut sources: HashMap<Token, Box<dyn Readable>> = HashMap::new();

    'outer: loop {
        let timeout = timers.peek().map(|t| {
            t.deadline
                .checked_duration_since(Instant::now())
                .unwrap_or(Duration::from_secs(0))
        });

        if let Err(e) = poll.poll(&mut events, timeout) {
            if e.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            log::error!("worker poll failed: {}", e);
            break;
        }

        for event in events.iter() {
            if event.token() == WAKE_TOKEN {
                continue;
            }
            if let Some(source) = sources.get_mut(&event.token()) {
                source.on_ready(event.is_readable(), event.is_writable());
            }
        }

        // Drain the command channel after readiness so a task spawned by a
        // readiness callback (e.g. "register the newly-accepted pipe") is
        // picked up on the same tick.
        while let Ok(msg) = rx.try_recv() {
            match msg {
                ToWorker::Task(task) => {
                    let mut wl = WorkerLoop { poll: &mut poll };
                    task(&mut wl);
                }
                ToWorker::Register {
                    token,
                    interest,
                    mut source,
                } => {
                    if poll.registry().register(&mut source, token, interest).is_ok() {
                        sources.insert(token, source);
                    }
                }
                ToWorker::Reregister { token, interest } => {
                    if let Some(source) = sources.get_mut(&token) {
                        let _ = poll.registry().reregister(&mut **source, token, interest);
                    }
                }
                ToWorker::Deregister(token) => {
                    if let Some(mut source) = sources.remove(&token) {
                        let _ = poll.registry().deregister(&mut *source);
                    }
                }
                ToWorker::Timer {
                    deadline,
                    id,
                    cancelled,
                    callback,
                } => {
                    timers.push(TimerEntry {
                        deadline,
                        id,
                        cancelled,
                        callback,
                    });
                }
                ToWorker::CancelTimer(id) => {
                    let mut kept = BinaryHeap::new();
                    while let Some(entry) = timers.pop() {
                        if entry.id != id {
                            kept.push(entry);
                        }
                    }
                    timers = kept;
                }
                ToWorker::Shutdown => break 'outer,
            }
        }

        let now = Instant::now();
        while let Some(entry) = timers.peek() {
            if entry.deadline > now {
                break;
            }
            let entry = timers.pop().unwrap();
            if !entry.cancelled.load(Ordering::SeqCst) {
                (entry.callback)();
            }
        }
    }
}

/// Round-robin assignment of new objects to workers, per spec.md §4.A
/// (`choose_worker`).
pub struct WorkerPool {
    workers: Vec<Worker>,
    next: AtomicUsize,
}

impl WorkerPool {
    pub fn new(size: usize) -> io::Result<WorkerPool> {
        let mut workers = Vec::with_capacity(size);
        for i in 0..size.max(1) {
            workers.push(Worker::spawn(format!("scopemq-worker-{}", i))?);
        }
        Ok(WorkerPool {
            workers,
            next: AtomicUsize::new(0),
        })
    }

    pub fn choose_worker(&self) -> WorkerHandle {
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        self.workers[i].handle()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}
