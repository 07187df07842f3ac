//! Sessions: a [`Page`] bound to at most one live connection at a time.
//!
//! Every mutation of a session's page (event dispatch, timer ticks, handshakes) goes through the page lock, and the
//! frames it produces are enqueued before the lock is released. Outbound frames therefore leave in render order.
//! While the connection's channel is full, enqueueing waits for up to the write deadline with the lock held.

use crate::{
	component::BindingId,
	config::Config,
	diff::Diff,
	error::Error,
	page::Page,
	protocol::{self, Frame, Inbound},
};
use core::{
	borrow::Borrow,
	fmt::{self, Debug, Display},
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use hashbrown::HashMap;
use std::{collections::VecDeque, sync::Arc};
use tokio::{
	sync::{mpsc, Mutex as PageLock, OwnedSemaphorePermit},
	time::{interval_at, timeout, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};
use uuid::Uuid;

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(Arc<str>);

impl SessionId {
	pub fn generate() -> Self {
		Self(Uuid::new_v4().simple().to_string().into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl Borrow<str> for SessionId {
	fn borrow(&self) -> &str {
		&self.0
	}
}

impl Display for SessionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl Debug for SessionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "SessionId({})", self.0)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
	/// The document was served, no connection yet.
	Created,
	Connecting,
	Connected,
	/// Since [`Session::last_active`].
	Disconnected,
	Closed,
}

/// How a newly attached connection is brought up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handshake {
	/// The client holds the document this session served. Pending frames and a regular diff bring it up to date.
	Promote,
	/// The client's document is unknown. It is cleared and rebuilt.
	Fresh,
	/// Like [`Handshake::Fresh`], for a session that was connected before.
	Reconnect,
}

struct Status {
	state: SessionState,
	last_active: Instant,
}

struct Connection {
	generation: u64,
	sender: mpsc::Sender<Frame>,
	token: CancellationToken,
}

#[derive(Default)]
struct Outbound {
	connection: Option<Connection>,
	/// Frames produced while no connection was attached.
	pending: VecDeque<String>,
	/// Frames were lost. The next render resets the client instead of patching it.
	desync: bool,
	generation: u64,
}

impl Outbound {
	/// Keeps `frame` for the next connection. Returns `false` iff the queue overflowed, which desynchronizes the client.
	fn queue(&mut self, frame: String, limit: usize) -> bool {
		self.pending.push_back(frame);
		if self.pending.len() > limit {
			self.pending.clear();
			self.desync = true;
			return false;
		}
		true
	}
}

pub struct Session {
	id: SessionId,
	config: Arc<Config>,
	page: PageLock<Page>,
	status: parking_lot::Mutex<Status>,
	scope: CancellationToken,
	inner: parking_lot::Mutex<CancellationToken>,
	outbound: parking_lot::Mutex<Outbound>,
	uploads: parking_lot::Mutex<HashMap<BindingId, Vec<u8>>>,
	permit: parking_lot::Mutex<Option<OwnedSemaphorePermit>>,
}

impl Session {
	pub fn new(id: SessionId, page: Page, config: Arc<Config>, permit: Option<OwnedSemaphorePermit>) -> Arc<Self> {
		let scope = CancellationToken::new();
		Arc::new(Self {
			id,
			config,
			page: PageLock::new(page),
			status: parking_lot::Mutex::new(Status { state: SessionState::Created, last_active: Instant::now() }),
			inner: parking_lot::Mutex::new(scope.child_token()),
			scope,
			outbound: parking_lot::Mutex::new(Outbound::default()),
			uploads: parking_lot::Mutex::new(HashMap::new()),
			permit: parking_lot::Mutex::new(permit),
		})
	}

	pub fn id(&self) -> &SessionId {
		&self.id
	}

	pub fn state(&self) -> SessionState {
		self.status.lock().state
	}

	pub fn last_active(&self) -> Instant {
		self.status.lock().last_active
	}

	pub fn touch(&self) {
		self.status.lock().last_active = Instant::now();
	}

	fn set_state(&self, state: SessionState) {
		let mut status = self.status.lock();
		if status.state != SessionState::Closed {
			status.state = state;
			status.last_active = Instant::now();
		}
	}

	pub fn is_closed(&self) -> bool {
		self.state() == SessionState::Closed
	}

	/// Whether the sweeper should close this session at `now`.
	pub fn is_expired(&self, now: Instant) -> bool {
		let status = self.status.lock();
		match status.state {
			SessionState::Created | SessionState::Connecting | SessionState::Disconnected => {
				now.saturating_duration_since(status.last_active) > self.config.sessions.grace_period
			}
			SessionState::Connected => false,
			SessionState::Closed => true,
		}
	}

	/// Cancelled when the session closes.
	pub fn scope(&self) -> CancellationToken {
		self.scope.clone()
	}

	/// Number of patch frames queued for a connection that isn't there.
	pub fn pending_len(&self) -> usize {
		self.outbound.lock().pending.len()
	}

	/// Number of uploads waiting for their event.
	pub fn pending_uploads(&self) -> usize {
		self.uploads.lock().len()
	}

	/// Runs `f` against the page without sending anything.
	pub async fn with_page<R>(&self, f: impl FnOnce(&mut Page) -> R) -> R {
		f(&mut *self.page.lock().await)
	}

	/// Renders the initial document for this session.
	///
	/// # Errors
	///
	/// Iff the session is closed or the render fails.
	pub async fn render_document(&self) -> Result<String, Error> {
		let mut page = self.page.lock().await;
		if page.is_closed() {
			return Err(Error::SessionClosed(self.id.clone()));
		}
		page.render_document(Some(&self.id))
	}

	/// Mutates the page through `f` and sends the patch it returns.
	///
	/// If frames were lost earlier, the client is reset instead.
	///
	/// # Errors
	///
	/// Iff the session is closed or `f` fails. Errors are also logged, and no patch is sent for them.
	pub async fn update(&self, f: impl FnOnce(&mut Page) -> Result<Vec<Diff>, Error>) -> Result<(), Error> {
		let mut page = self.page.lock().await;
		if page.is_closed() {
			return Err(Error::SessionClosed(self.id.clone()));
		}
		let result = f(&mut page);

		let (desync, connected) = {
			let outbound = self.outbound.lock();
			(outbound.desync, outbound.connection.is_some())
		};
		let result = match (desync, connected) {
			(false, _) => match result {
				Ok(diffs) => {
					self.send_diffs(&diffs).await;
					Ok(())
				}
				Err(error) => Err(error),
			},
			(true, false) => result.map(drop),
			(true, true) => {
				debug!(session = %self.id, "Resetting desynchronized client.");
				match page.reset() {
					Ok(diffs) => {
						self.send_reset(&diffs).await;
						Ok(())
					}
					Err(error) => Err(error),
				}
			}
		};
		if let Err(error) = &result {
			error!(session = %self.id, "Render failed: {}", error);
		}
		result
	}

	async fn send_diffs(&self, diffs: &[Diff]) {
		for diff in diffs {
			self.send(protocol::encode_diff(diff)).await;
		}
	}

	async fn send_reset(&self, diffs: &[Diff]) {
		self.outbound.lock().desync = false;
		self.send(protocol::RESET_FRAME.to_owned()).await;
		self.send_diffs(diffs).await;
	}

	/// Frames after a loss are dropped until the next reset.
	async fn send(&self, frame: String) {
		let sender = {
			let mut outbound = self.outbound.lock();
			if outbound.desync {
				return;
			}
			match outbound.connection.as_ref().map(|connection| connection.sender.clone()) {
				Some(sender) => sender,
				None => {
					self.queue(&mut outbound, frame);
					return;
				}
			}
		};
		self.deliver(&sender, frame).await;
	}

	async fn deliver(&self, sender: &mpsc::Sender<Frame>, frame: String) {
		match timeout(self.config.connection.write_deadline, sender.send(Frame::Text(frame))).await {
			Ok(Ok(())) => (),
			Ok(Err(mpsc::error::SendError(frame))) => {
				if let Frame::Text(frame) = frame {
					self.queue(&mut self.outbound.lock(), frame);
				}
			}
			Err(_) => {
				warn!(session = %self.id, "Outbound channel stayed full, dropping frame.");
				self.outbound.lock().desync = true;
			}
		}
	}

	fn queue(&self, outbound: &mut Outbound, frame: String) {
		if !outbound.queue(frame, self.config.sessions.pending_frames) {
			debug!(session = %self.id, "Pending frame queue overflowed.");
		}
	}

	/// Serves one connection until it ends, is replaced by a newer one or the session closes.
	///
	/// # Errors
	///
	/// Iff the session is closed already. Transport errors end the connection and are logged.
	#[instrument(skip(self, stream, sink), fields(session = %self.id))]
	pub async fn serve<St, Si, E>(self: Arc<Self>, mut stream: St, sink: Si, handshake: Handshake) -> Result<(), Error>
	where
		St: Stream<Item = Result<Frame, E>> + Unpin,
		E: Display,
		Si: Sink<Frame> + Unpin + Send + 'static,
		Si::Error: Display + Send,
	{
		if self.is_closed() {
			return Err(Error::SessionClosed(self.id.clone()));
		}
		self.set_state(SessionState::Connecting);

		let (sender, receiver) = mpsc::channel(self.config.connection.outbound_capacity.max(1));
		let token = self.scope.child_token();
		let generation = {
			let mut outbound = self.outbound.lock();
			outbound.generation += 1;
			if let Some(previous) = outbound.connection.take() {
				debug!("Replacing the previous connection.");
				previous.token.cancel();
			}
			outbound.connection = Some(Connection { generation: outbound.generation, sender: sender.clone(), token: token.clone() });
			outbound.generation
		};
		let inner = {
			let mut inner = self.inner.lock();
			inner.cancel();
			*inner = self.scope.child_token();
			inner.clone()
		};
		let writer = tokio::spawn(write_loop(receiver, sink, token.clone(), self.config.clone(), self.id.clone()));

		self.handshake(&sender, handshake).await;
		self.set_state(SessionState::Connected);
		self.start_timers(&inner).await;

		loop {
			let frame = tokio::select! {
				() = token.cancelled() => break,
				frame = timeout(self.config.connection.read_deadline, stream.next()) => frame,
			};
			match frame {
				Err(_) => {
					warn!("Read deadline elapsed.");
					break;
				}
				Ok(None) => break,
				Ok(Some(Err(error))) => {
					warn!("Transport error: {}", error);
					break;
				}
				Ok(Some(Ok(frame))) => {
					self.touch();
					match frame {
						Frame::Ping(payload) => {
							if sender.try_send(Frame::Pong(payload)).is_err() {
								trace!("Dropped pong.");
							}
						}
						Frame::Pong(_) => (),
						Frame::Close => break,
						Frame::Text(text) => self.receive_text(&text).await,
						Frame::Binary(bytes) => self.receive_upload(&bytes).await,
					}
				}
			}
		}

		token.cancel();
		drop(sender);
		if let Err(error) = writer.await {
			warn!("Writer task failed: {}", error);
		}
		self.detach(generation);
		Ok(())
	}

	async fn handshake(&self, sender: &mpsc::Sender<Frame>, handshake: Handshake) {
		let mut page = self.page.lock().await;
		let session_frame = Frame::Text(protocol::session_frame(&self.id));
		if !matches!(timeout(self.config.connection.write_deadline, sender.send(session_frame)).await, Ok(Ok(()))) {
			warn!("Could not send the session frame.");
		}
		let (desync, pending) = {
			let mut outbound = self.outbound.lock();
			(core::mem::take(&mut outbound.desync), core::mem::take(&mut outbound.pending))
		};
		debug!(?handshake, desync, "Handshake.");

		let mut promote = handshake == Handshake::Promote && !desync;
		if promote {
			for frame in pending {
				self.send(frame).await;
			}
			promote = !self.outbound.lock().desync;
		}
		let result = if promote { page.render_full() } else { page.reset() };
		match result {
			Ok(diffs) if promote => self.send_diffs(&diffs).await,
			Ok(diffs) => self.send_reset(&diffs).await,
			Err(error) => error!("Handshake render failed: {}", error),
		}
	}

	async fn start_timers(self: &Arc<Self>, inner: &CancellationToken) {
		let timers = self.page.lock().await.timers().to_vec();
		for timer in timers {
			let session = Arc::downgrade(self);
			let inner = inner.clone();
			tokio::spawn(async move {
				let mut interval = interval_at(Instant::now() + timer.period, timer.period);
				loop {
					tokio::select! {
						() = inner.cancelled() => break,
						_ = interval.tick() => {
							let Some(session) = session.upgrade() else { break };
							let tick = timer.clone();
							let ticked = session
								.update(move |page| {
									tick.tick();
									page.render_full()
								})
								.await;
							if let Err(error) = ticked {
								trace!(session = %session.id(), "Timer tick not applied: {}", error);
							}
						}
					}
				}
			});
		}
	}

	async fn receive_text(&self, text: &str) {
		match Inbound::parse(text) {
			Err(error) => warn!("{}", error),
			Ok(Inbound::Log { fields }) => info!(?fields, "Client log."),
			Ok(Inbound::Event { ids, mut event }) => {
				{
					let mut uploads = self.uploads.lock();
					event.upload = ids.iter().find_map(|id| uploads.remove(id));
				}
				if let Err(error) = self.update(|page| page.dispatch(&event, &ids)).await {
					debug!(event = %event.event_type, "Event not applied: {}", error);
				}
			}
		}
	}

	/// Keeps at most one upload per live binding until the next event consumes it.
	async fn receive_upload(&self, bytes: &[u8]) {
		match protocol::parse_upload(bytes) {
			Ok((id, bytes)) => {
				let known = self.page.lock().await.tracker().binding(&id).is_some();
				if !known {
					warn!(binding = %id, "Upload for an unknown binding, dropping it.");
					return;
				}
				trace!(binding = %id, len = bytes.len(), "Upload received.");
				self.uploads.lock().insert(id, bytes);
			}
			Err(error) => warn!("{}", error),
		}
	}

	fn detach(&self, generation: u64) {
		let mut outbound = self.outbound.lock();
		if outbound.connection.as_ref().map(|connection| connection.generation) == Some(generation) {
			outbound.connection = None;
			drop(outbound);
			self.inner.lock().cancel();
			self.uploads.lock().clear();
			self.set_state(SessionState::Disconnected);
			debug!(session = %self.id, "Disconnected.");
		}
	}

	/// Ends the connection and every task of this session, fires the page's unmount hooks and frees its capacity slot.
	/// Idempotent.
	pub async fn close(&self) {
		{
			let mut status = self.status.lock();
			if status.state == SessionState::Closed {
				return;
			}
			status.state = SessionState::Closed;
		}
		self.scope.cancel();
		{
			let mut outbound = self.outbound.lock();
			outbound.connection = None;
			outbound.pending.clear();
		}
		self.page.lock().await.close();
		self.permit.lock().take();
		info!(session = %self.id, "Session closed.");
	}
}

impl Debug for Session {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Session").field("id", &self.id).field("state", &self.state()).finish_non_exhaustive()
	}
}

async fn write_loop<Si>(mut receiver: mpsc::Receiver<Frame>, mut sink: Si, token: CancellationToken, config: Arc<Config>, id: SessionId)
where
	Si: Sink<Frame> + Unpin,
	Si::Error: Display,
{
	let connection = &config.connection;
	let mut heartbeat = interval_at(Instant::now() + connection.heartbeat_interval, connection.heartbeat_interval);
	loop {
		let frame = tokio::select! {
			biased;
			() = token.cancelled() => break,
			frame = receiver.recv() => match frame {
				Some(frame) => frame,
				None => break,
			},
			_ = heartbeat.tick() => Frame::Ping(Vec::new()),
		};
		match timeout(connection.write_deadline, sink.send(frame)).await {
			Ok(Ok(())) => (),
			Ok(Err(error)) => {
				warn!(session = %id, "Write failed: {}", error);
				token.cancel();
				break;
			}
			Err(_) => {
				warn!(session = %id, "Write deadline elapsed.");
				token.cancel();
				break;
			}
		}
	}
	if timeout(connection.write_deadline, sink.close()).await.is_err() {
		debug!(session = %id, "Closing the sink timed out.");
	}
}
