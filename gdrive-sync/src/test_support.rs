use std::fmt;
use std::sync::{Arc, Mutex};

use gdrive_core::FOLDER_MIME_TYPE;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Registry;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

use crate::remote::{MemoryRemote, RemoteObject, RemoteStore};
use crate::resolver::{PathResolver, discover_root_anchor};

pub const ROOT_TITLE: &str = "iPhotos";
pub const NAMESPACE: &str = "gdrive";

/// Log events recorded while a [`capture_logs`] guard is alive.
#[derive(Clone, Default)]
pub struct CapturedLogs {
    events: Arc<Mutex<Vec<(Level, String)>>>,
}

impl CapturedLogs {
    pub fn count(&self, level: Level, needle: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(lvl, message)| *lvl == level && message.contains(needle))
            .count()
    }
}

struct CaptureLayer(CapturedLogs);

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.0
            .events
            .lock()
            .unwrap()
            .push((*event.metadata().level(), visitor.0));
    }
}

#[derive(Default)]
struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}

/// Routes events on this thread into a [`CapturedLogs`] until the guard drops.
/// Pair with the default current-thread `#[tokio::test]` runtime.
pub fn capture_logs() -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
    let logs = CapturedLogs::default();
    let subscriber = Registry::default().with(CaptureLayer(logs.clone()));
    (logs, tracing::subscriber::set_default(subscriber))
}

pub async fn memory_resolver() -> (Arc<MemoryRemote>, PathResolver) {
    let remote = Arc::new(MemoryRemote::new());
    let root = discover_root_anchor(remote.as_ref(), ROOT_TITLE).await.unwrap();
    let store: Arc<dyn RemoteStore> = remote.clone();
    (remote, PathResolver::new(store, root, NAMESPACE))
}

pub async fn folder(remote: &MemoryRemote, title: &str, parent: &str) -> RemoteObject {
    remote
        .create_object(title, FOLDER_MIME_TYPE, Some(parent), None)
        .await
        .unwrap()
}

pub async fn file(remote: &MemoryRemote, title: &str, parent: &str, body: &[u8]) -> RemoteObject {
    remote
        .create_object(title, "image/jpeg", Some(parent), Some(body))
        .await
        .unwrap()
}
