#![allow(dead_code)]

use core::{convert::Infallible, time::Duration};
use futures_util::{Sink, Stream};
use live_dom::{
	diff::{Diff, DiffKind, Payload, Selector},
	protocol::{Frame, PatchFrame},
	snapshot::{find_component_mut, Snap, SnapTag},
};
use std::sync::Once;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

pub fn init_logging() {
	static INIT: Once = Once::new();
	INIT.call_once(|| {
		let _ = tracing_subscriber::fmt().with_test_writer().with_env_filter(EnvFilter::from_default_env()).try_init();
	});
}

/// A model of the client's document body that applies [`Diff`]s the way the browser runtime does.
#[derive(Debug, Default)]
pub struct VirtualClient {
	pub body: Vec<Snap>,
}

fn as_tag(snap: &mut Snap) -> &mut SnapTag {
	match snap {
		Snap::Tag(tag) => tag,
		other => panic!("not an element: {:?}", other),
	}
}

fn node(payload: &Payload) -> Snap {
	match payload {
		Payload::Text(text) => Snap::Text(text.clone()),
		Payload::Raw(markup) => Snap::Raw(markup.clone()),
		Payload::Tag(tag) => Snap::Tag(tag.clone()),
		Payload::Attribute { .. } => panic!("attribute payload in node position"),
	}
}

impl VirtualClient {
	pub fn new(body: Vec<Snap>) -> Self {
		Self { body }
	}

	pub fn apply(&mut self, diffs: &[Diff]) {
		for diff in diffs {
			self.apply_one(diff);
		}
	}

	fn element(&mut self, root: &Selector, path: &[usize]) -> &mut SnapTag {
		let (mut tag, rest) = match root {
			Selector::Document => {
				let (first, rest) = path.split_first().expect("the document root has no attributes");
				(as_tag(&mut self.body[*first]), rest)
			}
			Selector::Component(id) => (find_component_mut(&mut self.body, id).unwrap_or_else(|| panic!("{} not in the client model", id)), path),
		};
		for &i in rest {
			tag = as_tag(&mut tag.children[i]);
		}
		tag
	}

	fn children(&mut self, root: &Selector, parent: &[usize]) -> &mut Vec<Snap> {
		if *root == Selector::Document && parent.is_empty() {
			&mut self.body
		} else {
			&mut self.element(root, parent).children
		}
	}

	fn apply_one(&mut self, diff: &Diff) {
		if let Payload::Attribute { name, value } = &diff.payload {
			let element = self.element(&diff.root, &diff.path);
			match (diff.kind, value) {
				(DiffKind::Delete, _) => assert!(element.attributes.remove(name).is_some(), "deleted missing attribute {}", name),
				(DiffKind::Create, Some(value)) => assert!(element.attributes.insert(name.clone(), value.clone()).is_none(), "created existing attribute {}", name),
				(DiffKind::Update, Some(value)) => assert!(element.attributes.insert(name.clone(), value.clone()).is_some(), "updated missing attribute {}", name),
				(kind, None) => panic!("{:?} without value", kind),
			}
			return;
		}

		let Some((&i, parent)) = diff.path.split_last() else {
			assert_eq!(diff.kind, DiffKind::Update, "only replacements address a component root itself");
			*self.element(&diff.root, &[]) = match node(&diff.payload) {
				Snap::Tag(tag) => tag,
				other => panic!("replacing a component with {:?}", other),
			};
			return;
		};
		let children = self.children(&diff.root, parent);
		match diff.kind {
			DiffKind::Create => children.insert(i, node(&diff.payload)),
			DiffKind::Update => children[i] = node(&diff.payload),
			DiffKind::Delete => {
				children.remove(i);
			}
		}
	}
}

/// A client's end of an in-memory connection.
pub struct TestClient {
	pub sender: mpsc::UnboundedSender<Frame>,
	pub receiver: mpsc::UnboundedReceiver<Frame>,
}

type ServerStream = std::pin::Pin<Box<dyn Stream<Item = Result<Frame, Infallible>> + Send>>;
type ServerSink = std::pin::Pin<Box<dyn Sink<Frame, Error = &'static str> + Send>>;

pub fn connection() -> (TestClient, ServerStream, ServerSink) {
	let (client_sender, server_receiver) = mpsc::unbounded_channel::<Frame>();
	let (server_sender, client_receiver) = mpsc::unbounded_channel::<Frame>();
	let stream = futures_util::stream::unfold(server_receiver, |mut receiver| async move { receiver.recv().await.map(|frame| (Ok::<_, Infallible>(frame), receiver)) });
	let sink = futures_util::sink::unfold(server_sender, |sender, frame: Frame| async move {
		sender.send(frame).map_err(|_| "client gone")?;
		Ok::<_, &'static str>(sender)
	});
	(
		TestClient { sender: client_sender, receiver: client_receiver },
		Box::pin(stream),
		Box::pin(sink),
	)
}

impl TestClient {
	/// The next text frame, skipping heartbeats.
	pub async fn next_text(&mut self) -> String {
		loop {
			match tokio::time::timeout(Duration::from_secs(5), self.receiver.recv()).await {
				Ok(Some(Frame::Text(text))) => return text,
				Ok(Some(Frame::Ping(_) | Frame::Pong(_))) => continue,
				Ok(other) => panic!("expected a text frame, got {:?}", other),
				Err(_) => panic!("no frame within 5s"),
			}
		}
	}

	pub async fn next_frame(&mut self) -> PatchFrame {
		let text = self.next_text().await;
		PatchFrame::parse(&text).unwrap_or_else(|error| panic!("{}", error))
	}

	/// Asserts that nothing but heartbeats arrives for a little while.
	pub async fn assert_quiet(&mut self) {
		let deadline = tokio::time::sleep(Duration::from_millis(150));
		tokio::pin!(deadline);
		loop {
			tokio::select! {
				() = &mut deadline => return,
				frame = self.receiver.recv() => match frame {
					Some(Frame::Ping(_) | Frame::Pong(_)) => (),
					None => return,
					Some(frame) => panic!("unexpected frame {:?}", frame),
				},
			}
		}
	}

	pub fn send_event(&self, event_type: &str, ids: &[&str]) {
		let json = format!(r#"{{"type":"event","ids":"{}","fields":{{"type":"{}"}}}}"#, ids.join(","), event_type);
		self.sender.send(Frame::Text(json)).expect("server gone");
	}
}
