//!
//! # Actors
//!
//! Long-running producers that must be started and, more importantly, stopped
//! deterministically: a foreground position watch, a registered background location
//! task, a listener for notification responses.
//!
//! Each actor is declared once in an [`ActorsCollection`] under an identifier (usually an
//! enum) and can then be started and stopped any number of times. Stopping sends a signal
//! through the actor's [`Stopper`] and waits for `run` to return; an actor that doesn't
//! return within the collection's grace period is aborted.

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

use std::{
	collections::HashMap,
	fmt,
	future::{Future, IntoFuture},
	hash::Hash,
	marker::PhantomData,
	panic::AssertUnwindSafe,
	pin::Pin,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
	task::{Context, Poll},
	time::Duration,
};

use async_channel as chan;
use futures::FutureExt;
use tokio::{
	spawn,
	sync::{broadcast, Mutex, RwLock},
	task::JoinHandle,
	time::timeout,
};
use tracing::{debug, error, instrument, warn};

/// How long [`ActorsCollection::stop`] waits for an actor to wind down before aborting it.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(60);

pub trait ActorId: Hash + Eq + Send + Sync + Copy + fmt::Debug + fmt::Display + 'static {}

impl<T: Hash + Eq + Send + Sync + Copy + fmt::Debug + fmt::Display + 'static> ActorId for T {}

pub trait Actor<Id: ActorId>: Send + Sync + 'static {
	const IDENTIFIER: Id;

	/// Runs until the work source dries up or `stop` resolves. Called again on every start,
	/// so any subscription must be acquired inside `run` and released before returning.
	fn run(&mut self, stop: Stopper) -> impl Future<Output = ()> + Send;
}

mod sealed {
	pub trait Sealed {}
}

#[async_trait::async_trait]
pub trait DynActor<Id: ActorId>: Send + Sync + sealed::Sealed + 'static {
	async fn run(&mut self, stop: Stopper);
}

pub trait IntoActor<Id: ActorId>: Send + Sync {
	fn into_actor(self) -> (Id, Box<dyn DynActor<Id>>);
}

struct AnyActor<Id: ActorId, A: Actor<Id>> {
	actor: A,
	_marker: PhantomData<Id>,
}

impl<Id: ActorId, A: Actor<Id>> sealed::Sealed for AnyActor<Id, A> {}

#[async_trait::async_trait]
impl<Id: ActorId, A: Actor<Id>> DynActor<Id> for AnyActor<Id, A> {
	async fn run(&mut self, stop: Stopper) {
		self.actor.run(stop).await;
	}
}

impl<Id: ActorId, A: Actor<Id>> IntoActor<Id> for A {
	fn into_actor(self) -> (Id, Box<dyn DynActor<Id>>) {
		(
			A::IDENTIFIER,
			Box::new(AnyActor {
				actor: self,
				_marker: PhantomData,
			}),
		)
	}
}

struct ActorHandler<Id: ActorId> {
	actor: Arc<Mutex<Box<dyn DynActor<Id>>>>,
	maybe_handle: Option<JoinHandle<()>>,
	is_running: Arc<AtomicBool>,
	stop_tx: chan::Sender<()>,
	stop_rx: chan::Receiver<()>,
}

impl<Id: ActorId> ActorHandler<Id> {
	fn new(actor: Box<dyn DynActor<Id>>) -> Self {
		let (stop_tx, stop_rx) = chan::bounded(1);

		Self {
			actor: Arc::new(Mutex::new(actor)),
			maybe_handle: None,
			is_running: Arc::new(AtomicBool::new(false)),
			stop_tx,
			stop_rx,
		}
	}
}

/// Holds every actor of one owner, like the producers feeding a single monitor.
/// Identify the actors with an enum.
pub struct ActorsCollection<Id: ActorId> {
	state_changes_tx: broadcast::Sender<(Id, bool)>,
	actors_map: Arc<RwLock<HashMap<Id, ActorHandler<Id>>>>,
	grace_period: Duration,
}

impl<Id: ActorId> ActorsCollection<Id> {
	#[must_use]
	pub fn with_grace_period(grace_period: Duration) -> Self {
		Self {
			grace_period,
			..Default::default()
		}
	}

	/// Registers an actor, replacing any stopped actor with the same identifier.
	/// A running actor with that identifier is kept and the new one is dropped.
	pub async fn declare(&self, actor: impl IntoActor<Id>) {
		let (identifier, actor) = actor.into_actor();

		let mut actors_map = self.actors_map.write().await;
		if actors_map
			.get(&identifier)
			.is_some_and(|handler| handler.is_running.load(Ordering::Acquire))
		{
			warn!(%identifier, "Refusing to replace a running actor");
			return;
		}

		actors_map.insert(identifier, ActorHandler::new(actor));
	}

	/// Spawns the actor's `run`. Returns `false` if the actor is unknown or already running.
	#[instrument(skip(self))]
	pub async fn start(&self, identifier: Id) -> bool {
		let mut actors_map = self.actors_map.write().await;
		let Some(handler) = actors_map.get_mut(&identifier) else {
			warn!("Tried to start an undeclared actor");
			return false;
		};

		if handler.is_running.load(Ordering::Acquire) {
			debug!("Actor already running");
			return false;
		}

		// Reap the previous run, it either returned by itself or was stopped
		if let Some(handle) = handler.maybe_handle.take() {
			if handle.await.is_err() {
				error!("Previous actor run ended abnormally");
			}
		}

		// A stop signal sent after the previous run had already returned must not
		// cut this run short
		while handler.stop_rx.try_recv().is_ok() {}

		let is_running = Arc::clone(&handler.is_running);
		is_running.store(true, Ordering::Release);
		self.notify(identifier, true);

		handler.maybe_handle = Some(spawn({
			let stopper = Stopper(handler.stop_rx.clone());
			let actor = Arc::clone(&handler.actor);
			let state_changes_tx = self.state_changes_tx.clone();

			async move {
				let mut actor = actor.lock().await;

				if AssertUnwindSafe(actor.run(stopper))
					.catch_unwind()
					.await
					.is_err()
				{
					error!(%identifier, "Actor unexpectedly panicked");
				}

				is_running.store(false, Ordering::Release);

				if state_changes_tx.receiver_count() > 0 {
					state_changes_tx.send((identifier, false)).ok();
				}
			}
		}));

		true
	}

	/// Signals the actor to stop and waits for it. Returns `false` if it wasn't running.
	#[instrument(skip(self))]
	pub async fn stop(&self, identifier: Id) -> bool {
		let mut actors_map = self.actors_map.write().await;
		let Some(handler) = actors_map.get_mut(&identifier) else {
			return false;
		};

		if !handler.is_running.load(Ordering::Acquire) {
			debug!("Actor already stopped");
			wait_stop_or_abort(handler.maybe_handle.take(), self.grace_period).await;
			return false;
		}

		if handler.stop_tx.send(()).await.is_err() {
			error!("Failed to send stop signal to actor, will wait for it or abort");
		}

		wait_stop_or_abort(handler.maybe_handle.take(), self.grace_period).await;

		// The task either finished or was aborted before it could flag itself
		if handler.is_running.swap(false, Ordering::AcqRel) {
			self.notify(identifier, false);
		}

		true
	}

	/// Stops and starts again, picking up fresh subscriptions inside `run`.
	pub async fn restart(&self, identifier: Id) -> bool {
		self.stop(identifier).await;
		self.start(identifier).await
	}

	pub async fn stop_all(&self) {
		let identifiers = self
			.actors_map
			.read()
			.await
			.keys()
			.copied()
			.collect::<Vec<_>>();

		for identifier in identifiers {
			self.stop(identifier).await;
		}
	}

	pub async fn is_running(&self, identifier: Id) -> bool {
		self.actors_map
			.read()
			.await
			.get(&identifier)
			.is_some_and(|handler| handler.is_running.load(Ordering::Acquire))
	}

	pub async fn get_state(&self) -> Vec<(String, bool)> {
		self.actors_map
			.read()
			.await
			.iter()
			.map(|(identifier, handler)| {
				(
					identifier.to_string(),
					handler.is_running.load(Ordering::Relaxed),
				)
			})
			.collect()
	}

	/// Every start and stop, as `(identifier, is_running)`.
	#[must_use]
	pub fn subscribe(&self) -> broadcast::Receiver<(Id, bool)> {
		self.state_changes_tx.subscribe()
	}

	fn notify(&self, identifier: Id, running: bool) {
		if self.state_changes_tx.receiver_count() > 0 {
			self.state_changes_tx.send((identifier, running)).ok();
		}
	}
}

impl<Id: ActorId> Default for ActorsCollection<Id> {
	fn default() -> Self {
		Self {
			state_changes_tx: broadcast::channel(16).0,
			actors_map: Arc::default(),
			grace_period: DEFAULT_GRACE_PERIOD,
		}
	}
}

impl<Id: ActorId> Clone for ActorsCollection<Id> {
	fn clone(&self) -> Self {
		Self {
			state_changes_tx: self.state_changes_tx.clone(),
			actors_map: Arc::clone(&self.actors_map),
			grace_period: self.grace_period,
		}
	}
}

/// Handed to [`Actor::run`]; await `&stopper` to be woken when the actor must stop.
pub struct Stopper(chan::Receiver<()>);

impl Stopper {
	#[must_use]
	pub fn check_stop(&self) -> bool {
		self.0.try_recv().is_ok()
	}
}

pin_project_lite::pin_project! {
	pub struct StopActorFuture<'recv> {
		#[pin]
		fut: chan::Recv<'recv, ()>,
	}
}

impl Future for StopActorFuture<'_> {
	type Output = ();

	fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		let this = self.project();

		match this.fut.poll(cx) {
			Poll::Ready(res) => {
				if res.is_err() {
					warn!("Stop channel closed, will stop actor");
				}
				Poll::Ready(())
			}
			Poll::Pending => Poll::Pending,
		}
	}
}

impl<'recv> IntoFuture for &'recv Stopper {
	type Output = ();
	type IntoFuture = StopActorFuture<'recv>;

	fn into_future(self) -> Self::IntoFuture {
		Self::IntoFuture { fut: self.0.recv() }
	}
}

async fn wait_stop_or_abort(maybe_handle: Option<JoinHandle<()>>, grace_period: Duration) {
	if let Some(handle) = maybe_handle {
		let abort_handle = handle.abort_handle();

		match timeout(grace_period, handle).await {
			Ok(Ok(())) => {}
			Ok(Err(e)) => {
				// Panics are caught inside the spawned task, so this is a cancellation
				error!(?e, "Actor task ended abnormally");
			}
			Err(_) => {
				error!("Actor failed to gracefully stop in the allotted time, will force abortion");
				abort_handle.abort();
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::AtomicUsize;

	use tracing_test::traced_test;

	use super::*;

	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
	enum Producer {
		Ticker,
		Stubborn,
	}

	impl fmt::Display for Producer {
		fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
			fmt::Debug::fmt(self, f)
		}
	}

	struct Ticker {
		runs: Arc<AtomicUsize>,
		exits: Arc<AtomicUsize>,
	}

	impl Actor<Producer> for Ticker {
		const IDENTIFIER: Producer = Producer::Ticker;

		async fn run(&mut self, stop: Stopper) {
			self.runs.fetch_add(1, Ordering::SeqCst);
			(&stop).await;
			self.exits.fetch_add(1, Ordering::SeqCst);
		}
	}

	struct Stubborn;

	impl Actor<Producer> for Stubborn {
		const IDENTIFIER: Producer = Producer::Stubborn;

		async fn run(&mut self, _stop: Stopper) {
			tokio::time::sleep(Duration::from_secs(3600)).await;
		}
	}

	fn ticker() -> (Ticker, Arc<AtomicUsize>, Arc<AtomicUsize>) {
		let runs = Arc::new(AtomicUsize::new(0));
		let exits = Arc::new(AtomicUsize::new(0));
		(
			Ticker {
				runs: Arc::clone(&runs),
				exits: Arc::clone(&exits),
			},
			runs,
			exits,
		)
	}

	#[tokio::test]
	#[traced_test]
	async fn start_and_stop_are_idempotent() {
		let actors = ActorsCollection::default();
		let (actor, runs, exits) = ticker();
		actors.declare(actor).await;

		assert!(actors.start(Producer::Ticker).await);
		assert!(!actors.start(Producer::Ticker).await);
		assert!(actors.is_running(Producer::Ticker).await);

		assert!(actors.stop(Producer::Ticker).await);
		assert!(!actors.stop(Producer::Ticker).await);
		assert!(!actors.is_running(Producer::Ticker).await);

		assert_eq!(runs.load(Ordering::SeqCst), 1);
		assert_eq!(exits.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	#[traced_test]
	async fn restart_runs_again() {
		let actors = ActorsCollection::default();
		let (actor, runs, exits) = ticker();
		actors.declare(actor).await;

		actors.start(Producer::Ticker).await;
		assert!(actors.restart(Producer::Ticker).await);
		actors.stop_all().await;

		assert_eq!(runs.load(Ordering::SeqCst), 2);
		assert_eq!(exits.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	#[traced_test]
	async fn unknown_actor_is_not_started() {
		let actors = ActorsCollection::<Producer>::default();
		assert!(!actors.start(Producer::Ticker).await);
		assert!(!actors.stop(Producer::Ticker).await);
	}

	#[tokio::test(start_paused = true)]
	#[traced_test]
	async fn stubborn_actor_is_aborted_after_grace_period() {
		let actors = ActorsCollection::with_grace_period(Duration::from_millis(100));
		actors.declare(Stubborn).await;

		assert!(actors.start(Producer::Stubborn).await);
		assert!(actors.stop(Producer::Stubborn).await);
		assert!(!actors.is_running(Producer::Stubborn).await);
		assert!(logs_contain("force abortion"));
	}

	#[tokio::test]
	#[traced_test]
	async fn state_changes_are_broadcast() {
		let actors = ActorsCollection::default();
		let mut changes = actors.subscribe();
		let (actor, _, _) = ticker();
		actors.declare(actor).await;

		actors.start(Producer::Ticker).await;
		actors.stop(Producer::Ticker).await;

		assert_eq!(
			changes.recv().await.expect("start event"),
			(Producer::Ticker, true)
		);
		assert_eq!(
			changes.recv().await.expect("stop event"),
			(Producer::Ticker, false)
		);
	}
}
