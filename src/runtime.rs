//! Actor Runtime - registry, Runtime Lock and stop-the-world barrier
//!
//! The runtime owns every live actor and the one process-wide lock that
//! guards the registry. Ordinary messaging never touches it: sends,
//! receives and rendezvous only take the per-actor locks.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │                      Runtime                          │
//! │  Runtime Lock (reentrant, one owner thread)           │
//! │  barrier { waiting, generation }                      │
//! │  registry: { #1 main, #2, #3, ... }                   │
//! │  total = registry size, blocking = fully parked       │
//! │                                                       │
//! │  ┌──────────┐   ┌──────────┐   ┌──────────┐           │
//! │  │ Actor #1 │   │ Actor #2 │   │ Actor #3 │  ...      │
//! │  │ threads  │   │ threads  │   │ threads  │           │
//! │  │ 1 / 0 bl │   │ 1 / 1 bl │   │ 2 / 1 bl │           │
//! │  │ Running  │   │ Blocking │   │ Running  │           │
//! │  └──────────┘   └──────────┘   └──────────┘           │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! An actor is *Blocking* when every one of its threads is parked (in a
//! receive, take, yield or select) or inside an explicit blocking region.
//!
//! # Barrier
//!
//! 1. The requester, holding the Runtime Lock, counts itself as blocking
//!    and flags every Running actor.
//! 2. Flagged threads notice at their next checkpoint and try to take the
//!    lock; a pending barrier makes them park instead, counted as blocking.
//!    Parked threads cannot leave their wait while the barrier is pending.
//! 3. Once `blocking == total` the requester runs its closure, bumps the
//!    generation and releases everybody.
//!
//! Lock order: actor lock, then runtime state, then thread counts. The
//! runtime state is never held while an actor lock is acquired.

use crate::actor::{Actor, ActorId, ActorRef, ActorStatus};
use crate::basket::Basket;
use crate::context::ActorContext;
use crate::error::{ActorError, Result};
use crate::fatal;
use crate::mailbox;
use crate::serialize::{DefaultObjectModel, ObjectModel};
use crate::value::Value;
use crate::waiting;
use parking_lot::{Condvar, Mutex, MutexGuard, RwLock};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

/// Actor runtime configuration
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Name of the main actor (the thread that creates the runtime)
    pub main_name: Option<String>,
    /// Prefix for actor thread names; the actor number is appended
    pub thread_name_prefix: String,
    /// Stack size for actor threads (platform default if unset)
    pub stack_size: Option<usize>,
    /// How often shutdown re-interrupts actors that are still alive
    pub terminate_poll_interval: Duration,
    /// Upper bound for shutdown (`None` waits forever)
    pub shutdown_timeout: Option<Duration>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            main_name: None,
            thread_name_prefix: "actor-".to_string(),
            stack_size: None,
            terminate_poll_interval: Duration::from_millis(100),
            shutdown_timeout: Some(Duration::from_secs(5)),
        }
    }
}

#[derive(Debug, Default)]
struct BarrierState {
    waiting: bool,
    requester: Option<ThreadId>,
    generation: u64,
}

struct State {
    owner: Option<ThreadId>,
    depth: usize,
    barrier: BarrierState,
    actors: HashMap<ActorId, ActorRef>,
    /// Registered actors whose threads are all blocked
    blocking: usize,
}

pub(crate) struct Shared {
    state: Mutex<State>,
    /// Lock released, barrier started or barrier finished
    lock_cond: Condvar,
    /// Blocking count went up or an actor left, while a barrier waits
    barrier_cond: Condvar,
    terminated: Condvar,
    config: RuntimeConfig,
    model: Arc<dyn ObjectModel>,
    next_number: AtomicU64,
    main: ActorRef,
}

/// Actor runtime
///
/// Cheap to clone; all clones refer to the same runtime.
#[derive(Clone)]
pub struct Runtime {
    shared: Arc<Shared>,
}

impl Runtime {
    /// Create a runtime. The calling thread becomes the main actor.
    pub fn new(config: RuntimeConfig) -> Self {
        Self::with_object_model(config, Arc::new(DefaultObjectModel))
    }

    /// Create a runtime with a custom shareability / copy collaborator
    pub fn with_object_model(config: RuntimeConfig, model: Arc<dyn ObjectModel>) -> Self {
        if let Some(actor) = current_actor() {
            fatal!("thread already belongs to actor {}", actor.id());
        }
        let shared = Arc::new_cyclic(|weak| {
            let main = ActorRef::new(Actor::new(
                1,
                config.main_name.clone(),
                model.clone(),
                weak.clone(),
            ));
            main.threads.lock().count = 1;
            main.set_status(ActorStatus::Running);

            let mut actors = HashMap::new();
            actors.insert(main.id().clone(), main.clone());
            Shared {
                state: Mutex::new(State {
                    owner: None,
                    depth: 0,
                    barrier: BarrierState::default(),
                    actors,
                    blocking: 0,
                }),
                lock_cond: Condvar::new(),
                barrier_cond: Condvar::new(),
                terminated: Condvar::new(),
                config,
                model,
                next_number: AtomicU64::new(2),
                main,
            }
        });
        set_current_actor(shared.main.clone());
        tracing::debug!(main = %shared.main.id(), "runtime started");
        Runtime { shared }
    }

    pub(crate) fn from_shared(shared: Arc<Shared>) -> Self {
        Runtime { shared }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.shared.config
    }

    pub fn object_model(&self) -> &dyn ObjectModel {
        self.shared.model.as_ref()
    }

    pub fn main_actor(&self) -> ActorRef {
        self.shared.main.clone()
    }

    /// Number of registered actors, main included
    pub fn count(&self) -> usize {
        self.shared.state.lock().actors.len()
    }

    /// Registered actors ordered by number
    pub fn actors(&self) -> Vec<ActorRef> {
        sorted(&self.shared.state.lock().actors)
    }

    /// Number of registered actors with every thread blocked
    pub fn blocking_count(&self) -> usize {
        self.shared.state.lock().blocking
    }

    /// Number of completed barriers
    pub fn barrier_generation(&self) -> u64 {
        self.shared.state.lock().barrier.generation
    }

    /// Acquire the Runtime Lock.
    ///
    /// Reentrant on the owning thread. If a barrier is pending the calling
    /// thread parks until it completes before competing for the lock.
    pub fn lock(&self) -> RuntimeGuard<'_> {
        let me = thread::current().id();
        let mut st = self.shared.state.lock();
        if st.owner == Some(me) {
            st.depth += 1;
            return RuntimeGuard::new(self);
        }
        loop {
            if st.barrier.waiting {
                self.join_barrier(&mut st);
                continue;
            }
            if st.owner.is_none() {
                st.owner = Some(me);
                st.depth = 1;
                break;
            }
            self.shared.lock_cond.wait(&mut st);
        }
        RuntimeGuard::new(self)
    }

    /// Park the calling thread until no barrier is pending
    fn join_barrier(&self, st: &mut MutexGuard<'_, State>) {
        let actor = current_actor()
            .filter(|a| BLOCKING_DEPTH.get() == 0 && st.actors.contains_key(a.id()));
        if let Some(actor) = &actor {
            self.enter_blocking_locked(st, actor);
        }
        tracing::trace!(counted = actor.is_some(), "joining barrier");
        while st.barrier.waiting {
            let generation = st.barrier.generation;
            while st.barrier.generation == generation {
                self.shared.lock_cond.wait(st);
            }
        }
        if let Some(actor) = &actor {
            self.leave_blocking_locked(st, actor);
        }
    }

    fn enter_blocking_locked(&self, st: &mut State, actor: &Actor) {
        let mut threads = actor.threads.lock();
        threads.blocking += 1;
        if threads.blocking > threads.count {
            fatal!(
                "actor {} has {} blocking of {} threads",
                actor.id(),
                threads.blocking,
                threads.count
            );
        }
        if threads.blocking == threads.count {
            actor.set_status(ActorStatus::Blocking);
            st.blocking += 1;
            if st.barrier.waiting {
                self.shared.barrier_cond.notify_all();
            }
        }
    }

    fn leave_blocking_locked(&self, st: &mut State, actor: &Actor) {
        let mut threads = actor.threads.lock();
        if threads.blocking == 0 {
            fatal!("actor {} leaves blocking with no blocked thread", actor.id());
        }
        if threads.blocking == threads.count {
            actor.set_status(ActorStatus::Running);
            st.blocking -= 1;
        }
        threads.blocking -= 1;
    }

    /// Count the calling thread as blocked. Nests.
    pub(crate) fn enter_blocking(&self) {
        let Some(actor) = current_actor() else {
            return;
        };
        let depth = BLOCKING_DEPTH.get();
        BLOCKING_DEPTH.set(depth + 1);
        if depth == 0 {
            let mut st = self.shared.state.lock();
            self.enter_blocking_locked(&mut st, &actor);
        }
    }

    /// Undo [`enter_blocking`](Self::enter_blocking). Waits out a pending
    /// barrier requested by another thread.
    pub(crate) fn leave_blocking(&self) {
        let Some(actor) = current_actor() else {
            return;
        };
        let depth = BLOCKING_DEPTH.get();
        if depth == 0 {
            fatal!("actor {} leaves blocking without entering", actor.id());
        }
        BLOCKING_DEPTH.set(depth - 1);
        if depth > 1 {
            return;
        }
        let me = thread::current().id();
        let mut st = self.shared.state.lock();
        while st.barrier.waiting && st.barrier.requester != Some(me) {
            let generation = st.barrier.generation;
            while st.barrier.generation == generation {
                self.shared.lock_cond.wait(&mut st);
            }
        }
        self.leave_blocking_locked(&mut st, &actor);
    }

    /// Run `f` with the calling thread counted as blocked
    pub fn blocking<R>(&self, f: impl FnOnce() -> R) -> R {
        struct Leave<'a>(&'a Runtime);
        impl Drop for Leave<'_> {
            fn drop(&mut self) {
                self.0.leave_blocking();
            }
        }

        self.enter_blocking();
        let _leave = Leave(self);
        f()
    }

    /// Create an actor running `routine` on a new thread.
    ///
    /// `args` are sent to the new actor's mailbox first; the thread receives
    /// exactly that many messages and passes them to `routine`. The value
    /// the routine returns becomes the actor's at-exit offer; an error or a
    /// panic is published as a remote failure instead.
    pub fn create_actor<F>(&self, name: Option<&str>, args: Vec<Value>, routine: F) -> Result<ActorRef>
    where
        F: FnOnce(&ActorContext, Vec<Value>) -> Result<Value> + Send + 'static,
    {
        let number = self.shared.next_number.fetch_add(1, Ordering::Relaxed);
        let actor = ActorRef::new(Actor::new(
            number,
            name.map(str::to_string),
            self.shared.model.clone(),
            Arc::downgrade(&self.shared),
        ));
        self.register(&actor);

        let sender = current_actor().map(|cr| cr.id().clone());
        let argc = args.len();
        for arg in args {
            let sent = Basket::new(self.object_model(), sender.clone(), arg, false, false)
                .and_then(|basket| mailbox::send(&actor, basket));
            if let Err(err) = sent {
                self.abandon(&actor);
                return Err(err);
            }
        }

        let runtime = self.clone();
        let thread_actor = actor.clone();
        let spawned = self
            .thread_builder(number)
            .spawn(move || runtime.run_actor(thread_actor, argc, routine));
        if let Err(err) = spawned {
            self.abandon(&actor);
            return Err(ActorError::Spawn(err.to_string()));
        }
        Ok(actor)
    }

    fn thread_builder(&self, number: u64) -> thread::Builder {
        let config = &self.shared.config;
        let builder = thread::Builder::new().name(format!("{}{}", config.thread_name_prefix, number));
        match config.stack_size {
            Some(size) => builder.stack_size(size),
            None => builder,
        }
    }

    /// Add a new actor to the registry. It starts Blocking with one
    /// (not yet running) thread.
    fn register(&self, actor: &ActorRef) {
        let _guard = self.lock();
        let mut st = self.shared.state.lock();
        {
            let mut threads = actor.threads.lock();
            threads.count = 1;
            threads.blocking = 1;
        }
        actor.set_status(ActorStatus::Blocking);
        st.blocking += 1;
        st.actors.insert(actor.id().clone(), actor.clone());
        tracing::debug!(actor = %actor.id(), number = actor.number(), total = st.actors.len(), "registered");
    }

    /// Unregister an actor whose thread never started
    fn abandon(&self, actor: &ActorRef) {
        mailbox::close_incoming(actor);
        waiting::close_outgoing(actor);
        let _guard = self.lock();
        let mut st = self.shared.state.lock();
        if st.actors.remove(actor.id()).is_some() {
            st.blocking -= 1;
        }
        actor.set_status(ActorStatus::Terminated);
        self.shared.barrier_cond.notify_all();
    }

    fn run_actor<F>(self, actor: ActorRef, argc: usize, routine: F)
    where
        F: FnOnce(&ActorContext, Vec<Value>) -> Result<Value>,
    {
        set_current_actor(actor.clone());
        BLOCKING_DEPTH.set(1);
        self.leave_blocking();
        tracing::debug!(actor = %actor.id(), "actor thread started");

        let ctx = ActorContext::new(actor.clone());
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> Result<Value> {
            let mut args = Vec::with_capacity(argc);
            for _ in 0..argc {
                args.push(ctx.recv()?);
            }
            routine(&ctx, args)
        }));

        let (value, is_exception) = match outcome {
            Ok(Ok(value)) => (value, false),
            Ok(Err(err)) => {
                tracing::debug!(actor = %actor.id(), error = %err, "routine failed");
                (err.into_value(), true)
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::warn!(actor = %actor.id(), panic = %message, "routine panicked");
                (Value::error("PanicError", message), true)
            }
        };
        let will = Basket::will(self.object_model(), actor.id().clone(), value, is_exception)
            .or_else(|err| {
                // The result itself can not leave the actor; publish why instead
                tracing::debug!(actor = %actor.id(), error = %err, "at-exit value not transferable");
                Basket::will(self.object_model(), actor.id().clone(), err.into_value(), true)
            });
        match will {
            Ok(will) => waiting::yield_at_exit(&actor, will),
            Err(err) => tracing::warn!(actor = %actor.id(), error = %err, "at-exit value dropped"),
        }
        self.exit_thread(&actor);
    }

    pub(crate) fn spawn_thread<F, R>(&self, actor: &ActorRef, f: F) -> Result<JoinHandle<R>>
    where
        F: FnOnce(&ActorContext) -> R + Send + 'static,
        R: Send + 'static,
    {
        {
            let _guard = self.lock();
            let _st = self.shared.state.lock();
            let mut threads = actor.threads.lock();
            threads.count += 1;
            threads.blocking += 1;
        }

        let runtime = self.clone();
        let thread_actor = actor.clone();
        let spawned = self.thread_builder(actor.number()).spawn(move || {
            set_current_actor(thread_actor.clone());
            BLOCKING_DEPTH.set(1);
            runtime.leave_blocking();

            let ctx = ActorContext::new(thread_actor.clone());
            let result = panic::catch_unwind(AssertUnwindSafe(|| f(&ctx)));
            runtime.exit_thread(&thread_actor);
            match result {
                Ok(value) => value,
                Err(panic) => panic::resume_unwind(panic),
            }
        });

        spawned.map_err(|err| {
            let _guard = self.lock();
            let _st = self.shared.state.lock();
            let mut threads = actor.threads.lock();
            threads.count -= 1;
            threads.blocking -= 1;
            ActorError::Spawn(err.to_string())
        })
    }

    /// Retire the calling thread of `actor`. The last thread out closes
    /// both ports and removes the actor from the registry.
    fn exit_thread(&self, actor: &ActorRef) {
        let last = {
            let _guard = self.lock();
            let mut st = self.shared.state.lock();
            if BLOCKING_DEPTH.get() == 0 {
                self.enter_blocking_locked(&mut st, actor);
            }
            BLOCKING_DEPTH.set(0);
            let mut threads = actor.threads.lock();
            threads.count -= 1;
            threads.blocking -= 1;
            threads.count == 0
        };
        clear_current_actor();
        if !last {
            return;
        }

        mailbox::close_incoming(actor);
        waiting::close_outgoing(actor);

        let _guard = self.lock();
        let mut st = self.shared.state.lock();
        if st.actors.remove(actor.id()).is_some() {
            st.blocking -= 1;
        }
        actor.set_status(ActorStatus::Terminated);
        self.shared.terminated.notify_all();
        self.shared.barrier_cond.notify_all();
        tracing::debug!(actor = %actor.id(), remaining = st.actors.len(), "terminated");
    }

    /// Terminate every actor, then the main actor.
    ///
    /// Other actors are interrupted every poll interval until they are
    /// gone. Must be called from the main actor or a thread outside the
    /// runtime.
    pub fn shutdown(&self) -> Result<()> {
        let main = self.shared.main.clone();
        if let Some(cr) = current_actor() {
            if cr != main {
                fatal!("shutdown called from actor {}", cr.id());
            }
        }
        let config = &self.shared.config;
        let deadline = config.shutdown_timeout.map(|timeout| Instant::now() + timeout);

        loop {
            let others: Vec<ActorRef> = {
                let st = self.shared.state.lock();
                st.actors.values().filter(|a| **a != main).cloned().collect()
            };
            if others.is_empty() {
                break;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                tracing::warn!(remaining = others.len(), "shutdown timed out");
                return Err(ActorError::ShutdownTimeout(others.len()));
            }
            tracing::debug!(remaining = others.len(), "interrupting actors");
            for actor in &others {
                actor.interrupt();
            }
            self.blocking(|| {
                let mut st = self.shared.state.lock();
                if st.actors.len() > 1 {
                    self.shared
                        .terminated
                        .wait_for(&mut st, config.terminate_poll_interval);
                }
            });
        }

        mailbox::close_incoming(&main);
        waiting::close_outgoing(&main);
        {
            let _guard = self.lock();
            let mut st = self.shared.state.lock();
            if st.actors.remove(main.id()).is_some() {
                if main.status() == ActorStatus::Blocking {
                    st.blocking -= 1;
                }
                main.set_status(ActorStatus::Terminated);
            }
        }
        if current_actor().is_some_and(|cr| cr == main) {
            clear_current_actor();
        }
        tracing::debug!("runtime shut down");
        Ok(())
    }
}

fn sorted(actors: &HashMap<ActorId, ActorRef>) -> Vec<ActorRef> {
    let mut list: Vec<ActorRef> = actors.values().cloned().collect();
    list.sort_by_key(|a| a.number());
    list
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Holds the Runtime Lock; released on drop
pub struct RuntimeGuard<'a> {
    runtime: &'a Runtime,
    _not_send: PhantomData<*const ()>,
}

impl<'a> RuntimeGuard<'a> {
    fn new(runtime: &'a Runtime) -> Self {
        RuntimeGuard {
            runtime,
            _not_send: PhantomData,
        }
    }

    /// Stop the world: run `f` once every other actor is blocked.
    ///
    /// No other thread acquires the Runtime Lock or leaves a blocking wait
    /// until `f` returns.
    pub fn barrier<R>(&self, f: impl FnOnce(&BarrierView) -> R) -> R {
        let runtime = self.runtime;
        let shared = &runtime.shared;
        let me = thread::current().id();

        let mut st = shared.state.lock();
        if st.barrier.waiting {
            fatal!("barrier requested while another barrier is pending");
        }
        st.barrier.waiting = true;
        st.barrier.requester = Some(me);

        let counted = current_actor()
            .filter(|a| BLOCKING_DEPTH.get() == 0 && st.actors.contains_key(a.id()));
        if let Some(actor) = &counted {
            runtime.enter_blocking_locked(&mut st, actor);
            BLOCKING_DEPTH.set(1);
        }
        for actor in st.actors.values() {
            if actor.status() == ActorStatus::Running {
                actor.barrier_interrupt.store(true, Ordering::Release);
            }
        }
        shared.lock_cond.notify_all();
        tracing::debug!(generation = st.barrier.generation, total = st.actors.len(), "barrier start");

        while st.blocking != st.actors.len() {
            shared.barrier_cond.wait(&mut st);
        }
        let view = BarrierView {
            generation: st.barrier.generation,
            actors: sorted(&st.actors),
            blocking: st.blocking,
        };
        drop(st);

        let finish = BarrierFinish { runtime, counted };
        let result = f(&view);
        drop(finish);
        result
    }
}

/// Releases the barrier even if the closure panics
struct BarrierFinish<'a> {
    runtime: &'a Runtime,
    counted: Option<ActorRef>,
}

impl Drop for BarrierFinish<'_> {
    fn drop(&mut self) {
        let shared = &self.runtime.shared;
        let mut st = shared.state.lock();
        st.barrier.generation += 1;
        st.barrier.waiting = false;
        st.barrier.requester = None;
        for actor in st.actors.values() {
            actor.barrier_interrupt.store(false, Ordering::Release);
        }
        if let Some(actor) = &self.counted {
            BLOCKING_DEPTH.set(0);
            self.runtime.leave_blocking_locked(&mut st, actor);
        }
        shared.lock_cond.notify_all();
        tracing::debug!(generation = st.barrier.generation, "barrier finished");
    }
}

impl Drop for RuntimeGuard<'_> {
    fn drop(&mut self) {
        let me = thread::current().id();
        let shared = &self.runtime.shared;
        let mut st = shared.state.lock();
        if st.owner != Some(me) || st.depth == 0 {
            fatal!("runtime lock released by a thread that does not own it");
        }
        st.depth -= 1;
        if st.depth == 0 {
            st.owner = None;
            shared.lock_cond.notify_all();
        }
    }
}

/// What a barrier closure sees: the stopped world
#[derive(Debug)]
pub struct BarrierView {
    generation: u64,
    actors: Vec<ActorRef>,
    blocking: usize,
}

impl BarrierView {
    /// Generation of the barrier in progress (completed barriers so far)
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn actors(&self) -> &[ActorRef] {
        &self.actors
    }

    pub fn blocking_count(&self) -> usize {
        self.blocking
    }
}

// Thread-local storage for current actor context
thread_local! {
    static CURRENT_ACTOR: RefCell<Option<ActorRef>> = const { RefCell::new(None) };
    /// Nesting depth of blocking regions on this thread
    static BLOCKING_DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// Set the current actor (called when entering an actor thread)
pub(crate) fn set_current_actor(actor: ActorRef) {
    CURRENT_ACTOR.with(|cell| {
        *cell.borrow_mut() = Some(actor);
    });
    BLOCKING_DEPTH.set(0);
}

/// The actor owning the current thread
pub fn current_actor() -> Option<ActorRef> {
    CURRENT_ACTOR.with(|cell| cell.borrow().clone())
}

/// Clear the current actor (called when leaving an actor thread)
pub(crate) fn clear_current_actor() {
    CURRENT_ACTOR.with(|cell| {
        *cell.borrow_mut() = None;
    });
}

// Process-wide runtime slot
lazy_static::lazy_static! {
    static ref GLOBAL: RwLock<Option<Runtime>> = RwLock::new(None);
}

/// Install the process-wide runtime; the calling thread becomes its main actor
pub fn init(config: RuntimeConfig) -> Runtime {
    let mut slot = GLOBAL.write();
    if slot.is_some() {
        fatal!("runtime already initialized");
    }
    let runtime = Runtime::new(config);
    *slot = Some(runtime.clone());
    runtime
}

/// The process-wide runtime, if installed
pub fn global() -> Option<Runtime> {
    GLOBAL.read().clone()
}

/// Shut down and uninstall the process-wide runtime
pub fn teardown() -> Result<()> {
    let runtime = GLOBAL.write().take();
    match runtime {
        Some(runtime) => runtime.shutdown(),
        None => Ok(()),
    }
}
