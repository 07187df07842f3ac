//! The set of live sessions, with capacity limiting and garbage collection.

use crate::{
	config::Config,
	error::Error,
	page::Page,
	session::{Session, SessionId},
};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::{
	sync::Semaphore,
	task::JoinHandle,
	time::{interval, timeout, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

#[derive(Debug)]
pub struct SessionRegistry {
	sessions: DashMap<SessionId, Arc<Session>>,
	capacity: Arc<Semaphore>,
	config: Arc<Config>,
}

impl SessionRegistry {
	pub fn new(config: Arc<Config>) -> Self {
		Self {
			sessions: DashMap::new(),
			capacity: Arc::new(Semaphore::new(config.sessions.max_sessions)),
			config,
		}
	}

	/// Registers a new session for `page`, waiting up to the configured acquire timeout for a free slot.
	///
	/// # Errors
	///
	/// [`Error::Capacity`] iff no slot became free in time.
	#[instrument(skip(self, page))]
	pub async fn create(&self, page: Page) -> Result<Arc<Session>, Error> {
		let permit = match timeout(self.config.sessions.acquire_timeout, Arc::clone(&self.capacity).acquire_owned()).await {
			Ok(Ok(permit)) => permit,
			Ok(Err(_)) | Err(_) => return Err(Error::Capacity(self.config.sessions.max_sessions)),
		};
		Ok(self.insert(page, permit))
	}

	/// Like [`SessionRegistry::create`], but fails immediately if the registry is full.
	///
	/// # Errors
	///
	/// [`Error::Capacity`] iff the registry is full.
	pub fn try_create(&self, page: Page) -> Result<Arc<Session>, Error> {
		let permit = Arc::clone(&self.capacity)
			.try_acquire_owned()
			.map_err(|_| Error::Capacity(self.config.sessions.max_sessions))?;
		Ok(self.insert(page, permit))
	}

	fn insert(&self, page: Page, permit: tokio::sync::OwnedSemaphorePermit) -> Arc<Session> {
		let session = Session::new(SessionId::generate(), page, Arc::clone(&self.config), Some(permit));
		debug!(session = %session.id(), "Session created.");
		self.sessions.insert(session.id().clone(), Arc::clone(&session));
		session
	}

	pub fn get(&self, id: &str) -> Option<Arc<Session>> {
		self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
	}

	/// Like [`SessionRegistry::get`], but also restarts the session's grace period.
	///
	/// The entry stays locked while it is touched, so a concurrent [`SessionRegistry::sweep`] either removes the session
	/// before this finds it or sees it fresh.
	pub fn claim(&self, id: &str) -> Option<Arc<Session>> {
		self.sessions.get(id).map(|entry| {
			entry.value().touch();
			Arc::clone(entry.value())
		})
	}

	/// Removes a session without closing it.
	pub fn remove(&self, id: &str) -> Option<Arc<Session>> {
		self.sessions.remove(id).map(|(_, session)| session)
	}

	pub fn len(&self) -> usize {
		self.sessions.len()
	}

	pub fn is_empty(&self) -> bool {
		self.sessions.is_empty()
	}

	/// Free session slots.
	pub fn available(&self) -> usize {
		self.capacity.available_permits()
	}

	/// Closes and removes every session that expired at `now`. Returns how many were removed.
	pub async fn sweep(&self, now: Instant) -> usize {
		let expired: Vec<SessionId> = self
			.sessions
			.iter()
			.filter(|entry| entry.value().is_expired(now))
			.map(|entry| entry.key().clone())
			.collect();
		let mut removed = 0;
		for id in expired {
			// Re-checked under the entry lock, since the session may have been claimed in the meantime.
			if let Some((_, session)) = self.sessions.remove_if(&id, |_, session| session.is_expired(now)) {
				session.close().await;
				removed += 1;
			}
		}
		if removed > 0 {
			info!(removed, remaining = self.sessions.len(), "Swept sessions.");
		}
		removed
	}

	/// Sweeps every `sweep_interval` until `cancel` fires.
	pub fn spawn_sweeper(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
		let registry = Arc::clone(self);
		tokio::spawn(async move {
			let mut ticks = interval(registry.config.sessions.sweep_interval);
			loop {
				tokio::select! {
					() = cancel.cancelled() => break,
					_ = ticks.tick() => {
						registry.sweep(Instant::now()).await;
					}
				}
			}
		})
	}

	/// Closes and removes every session.
	pub async fn shutdown(&self) {
		let ids: Vec<SessionId> = self.sessions.iter().map(|entry| entry.key().clone()).collect();
		for id in ids {
			if let Some((_, session)) = self.sessions.remove(&id) {
				session.close().await;
			}
		}
		info!("Session registry shut down.");
	}
}
