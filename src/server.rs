//! Request routing and connection upgrades, on top of a [`SessionRegistry`].

use crate::{
	config::Config,
	error::Error,
	page::Page,
	protocol::Frame,
	registry::SessionRegistry,
	session::{Handshake, Session, SessionId, SessionState},
};
use core::fmt::{self, Debug, Display};
use futures_util::{Sink, Stream};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// Upgrade token asking for a brand new session.
pub const NEW_SESSION: &str = "new";

/// The parts of an incoming request routing depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
	pub path: String,
	pub upgrade: bool,
	/// The session token sent along with an upgrade.
	pub session: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
	Document,
	Upgrade { token: String },
}

/// An initial document and the session it belongs to.
#[derive(Debug, Clone)]
pub struct Document {
	pub session: SessionId,
	pub html: String,
}

type PageFactory = dyn Fn() -> Page + Send + Sync;

pub struct LiveServer {
	config: Arc<Config>,
	registry: Arc<SessionRegistry>,
	factory: Arc<PageFactory>,
}

impl LiveServer {
	/// `factory` builds the page for each new session.
	pub fn new(config: Config, factory: impl Fn() -> Page + Send + Sync + 'static) -> Self {
		let config = Arc::new(config);
		Self {
			registry: Arc::new(SessionRegistry::new(Arc::clone(&config))),
			config,
			factory: Arc::new(factory),
		}
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn registry(&self) -> &Arc<SessionRegistry> {
		&self.registry
	}

	pub fn route(&self, request: &Request) -> Route {
		if request.upgrade {
			Route::Upgrade {
				token: request.session.clone().unwrap_or_else(|| NEW_SESSION.to_owned()),
			}
		} else {
			Route::Document
		}
	}

	/// Creates a session and renders its initial document.
	///
	/// # Errors
	///
	/// Iff the registry is full or the render fails.
	#[instrument(skip(self))]
	pub async fn load(&self) -> Result<Document, Error> {
		let session = self.registry.create((self.factory)()).await?;
		match session.render_document().await {
			Ok(html) => Ok(Document { session: session.id().clone(), html }),
			Err(error) => {
				self.registry.remove(session.id().as_str());
				session.close().await;
				Err(error)
			}
		}
	}

	/// Picks the session an upgrade with `token` attaches to, and how it is brought up to date.
	///
	/// # Errors
	///
	/// Iff a new session is needed and the registry is full.
	pub async fn resolve(&self, token: &str) -> Result<(Arc<Session>, Handshake), Error> {
		if token != NEW_SESSION {
			match self.registry.claim(token) {
				Some(session) => match session.state() {
					SessionState::Created => return Ok((session, Handshake::Promote)),
					SessionState::Connecting | SessionState::Connected | SessionState::Disconnected => return Ok((session, Handshake::Reconnect)),
					SessionState::Closed => debug!(session = token, "Session closed, starting over."),
				},
				None => debug!(session = token, "Unknown session, starting over."),
			}
		}
		Ok((self.registry.create((self.factory)()).await?, Handshake::Fresh))
	}

	/// Serves a realtime connection until it ends.
	///
	/// # Errors
	///
	/// Iff no session could be attached.
	#[instrument(skip(self, stream, sink))]
	pub async fn serve<St, Si, E>(&self, token: &str, stream: St, sink: Si) -> Result<(), Error>
	where
		St: Stream<Item = Result<Frame, E>> + Unpin,
		E: Display,
		Si: Sink<Frame> + Unpin + Send + 'static,
		Si::Error: Display + Send,
	{
		let (session, handshake) = self.resolve(token).await?;
		session.serve(stream, sink, handshake).await
	}

	pub fn spawn_sweeper(&self, cancel: CancellationToken) -> JoinHandle<()> {
		self.registry.spawn_sweeper(cancel)
	}

	pub async fn shutdown(&self) {
		self.registry.shutdown().await;
	}
}

impl Debug for LiveServer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("LiveServer").field("config", &self.config).field("registry", &self.registry).finish_non_exhaustive()
	}
}
