use std::collections::HashMap;

use ratatui::layout::Rect;
use streamchat_core::markdown::CopyButton;
use streamchat_core::{ChatController, ChatEvent, Clipboard, LocalStore, Mode, Session};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::transcript::{self, CopyKey, DocumentCache, Transcript};

pub const SPINNER: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

pub struct App {
    pub should_quit: bool,
    pub mode: Mode,
    /// Where turns go: server URL in proxy mode, model in direct mode
    pub target: String,

    pub controller: ChatController,
    session_rx: watch::Receiver<Session>,
    pub store: LocalStore,

    // Input state
    pub cursor: usize, // cursor position in chars

    // Chat view state
    pub scroll: u16,
    pub follow: bool,
    pub chat_height: u16,
    pub chat_area: Option<Rect>, // inner area, for mouse hit-testing
    pub transcript: Transcript,
    documents: DocumentCache,
    pub copy_buttons: HashMap<CopyKey, CopyButton>,
    clipboard: Box<dyn Clipboard>,

    // Settings popup
    pub show_settings: bool,
    pub settings_input: String,
    pub settings_cursor: usize,

    pub animation_frame: usize,
}

impl App {
    pub fn new(
        controller: ChatController,
        store: LocalStore,
        mode: Mode,
        target: String,
        clipboard: Box<dyn Clipboard>,
    ) -> Self {
        let session_rx = controller.subscribe();
        Self {
            should_quit: false,
            mode,
            target,
            controller,
            session_rx,
            store,
            cursor: 0,
            scroll: 0,
            follow: true,
            chat_height: 0,
            chat_area: None,
            transcript: Transcript::default(),
            documents: DocumentCache::default(),
            copy_buttons: HashMap::new(),
            clipboard,
            show_settings: false,
            settings_input: String::new(),
            settings_cursor: 0,
            animation_frame: 0,
        }
    }

    /// Credential for the current mode, empty when none is stored.
    pub fn credential(&self) -> String {
        self.store.get(self.mode.credential_key(), String::new())
    }

    /// Start a send. The credential check and the reply arrive later as
    /// [`ChatEvent`]s, so this never waits on the network.
    pub fn submit(&mut self) {
        let credential = self.credential();
        self.controller.submit(&credential);
    }

    pub fn apply(&mut self, event: ChatEvent) {
        self.controller.apply(event);
        // An approved send clears the input.
        self.cursor = self.cursor.min(self.controller.input().chars().count());
    }

    /// Rebuild the transcript for a chat view of `width` x `height`.
    ///
    /// A new session snapshot turns auto-follow back on, so the newest
    /// line is in view after every change.
    pub fn layout_chat(&mut self, width: u16, height: u16) {
        if self.session_rx.has_changed().unwrap_or(false) {
            self.session_rx.borrow_and_update();
            self.follow = true;
        }

        let session = self.controller.session().clone();
        self.documents.refresh(&session);
        self.transcript = transcript::build(
            &session,
            &self.documents,
            &self.copy_buttons,
            usize::from(width),
        );

        self.chat_height = height;
        let max = self.max_scroll();
        if self.follow {
            self.scroll = max;
        } else {
            self.scroll = self.scroll.min(max);
        }
    }

    fn max_scroll(&self) -> u16 {
        let total = u16::try_from(self.transcript.lines.len()).unwrap_or(u16::MAX);
        total.saturating_sub(self.chat_height)
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.follow = false;
        self.scroll = self.scroll.saturating_sub(lines);
    }

    pub fn scroll_down(&mut self, lines: u16) {
        self.follow = false;
        self.scroll = self.scroll.saturating_add(lines).min(self.max_scroll());
    }

    /// Left click at terminal position `(x, y)`.
    pub fn click(&mut self, x: u16, y: u16) {
        let Some(area) = self.chat_area else { return };
        if x < area.x || x >= area.right() || y < area.y || y >= area.bottom() {
            return;
        }

        let line = usize::from(self.scroll) + usize::from(y - area.y);
        if let Some(key) = self.transcript.target_at(line, x - area.x) {
            self.copy_code(key);
        }
    }

    pub fn copy_code(&mut self, key: CopyKey) {
        let (id, index) = key;
        let Some(block) = self
            .documents
            .get(id)
            .and_then(|doc| doc.code_blocks().get(index).map(|b| (*b).clone()))
        else {
            debug!(%id, index, "copy target no longer exists");
            return;
        };

        let button = self.copy_buttons.entry(key).or_default();
        match button.click(&block, self.clipboard.as_mut()) {
            Ok(()) => info!(%id, index, bytes = block.code.len(), "code block copied"),
            Err(e) => warn!(error = %e, "copy to clipboard failed"),
        }
    }

    pub fn open_settings(&mut self) {
        self.settings_input = self.credential();
        self.settings_cursor = self.settings_input.chars().count();
        self.show_settings = true;
    }

    pub fn save_settings(&mut self) {
        self.store
            .set(self.mode.credential_key(), &self.settings_input);
        info!(mode = self.mode.as_str(), "credential updated");
        self.close_settings();
    }

    pub fn close_settings(&mut self) {
        self.show_settings = false;
        self.settings_input.clear();
        self.settings_cursor = 0;
    }

    pub fn tick_animation(&mut self) {
        if self.controller.is_busy() {
            self.animation_frame = (self.animation_frame + 1) % SPINNER.len();
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use futures_util::stream::{self, StreamExt};
    use streamchat_core::{
        AllowAll, Authorizer, ChatController, ChatEvent, ChatTransport, Clipboard,
        ClipboardError, FragmentStream, LocalStore, Message, Mode, TransportError,
    };
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    use super::App;

    /// Never answers the credential check.
    pub struct Silent;

    #[async_trait]
    impl Authorizer for Silent {
        async fn authorize(&self, _credential: &str) -> bool {
            futures_util::future::pending().await
        }
    }

    /// Replies with fixed fragments.
    pub struct Reply(pub Vec<String>);

    #[async_trait]
    impl ChatTransport for Reply {
        async fn stream(
            &self,
            _history: &[Message],
            _credential: &str,
        ) -> Result<FragmentStream, TransportError> {
            let items: Vec<Result<String, TransportError>> =
                self.0.iter().cloned().map(Ok).collect();
            Ok(stream::iter(items).boxed())
        }
    }

    #[derive(Clone, Default)]
    pub struct SharedClipboard(pub Arc<Mutex<Vec<String>>>);

    impl Clipboard for SharedClipboard {
        fn write_text(&mut self, text: &str) -> Result<(), ClipboardError> {
            self.0.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    pub struct Harness {
        pub app: App,
        pub events: mpsc::UnboundedReceiver<ChatEvent>,
        pub clipboard: SharedClipboard,
        _dir: TempDir,
    }

    impl Harness {
        pub fn new(reply: &[&str]) -> Self {
            Self::with_authorizer(reply, Arc::new(AllowAll))
        }

        pub fn with_authorizer(reply: &[&str], authorizer: Arc<dyn Authorizer>) -> Self {
            let dir = TempDir::new().unwrap();
            let store = LocalStore::open(dir.path().join("storage.json"));
            let (tx, events) = mpsc::unbounded_channel();
            let controller = ChatController::new(
                Arc::new(Reply(reply.iter().map(|f| f.to_string()).collect())),
                authorizer,
                Arc::new(tx),
            );
            let clipboard = SharedClipboard::default();
            let app = App::new(
                controller,
                store,
                Mode::Proxy,
                "http://127.0.0.1:3000".to_string(),
                Box::new(clipboard.clone()),
            );
            Self {
                app,
                events,
                clipboard,
                _dir: dir,
            }
        }

        /// Feed events to the app until the credential check is decided.
        pub async fn authorize(&mut self) {
            while self.app.controller.is_authorizing() {
                let Some(event) = self.events.recv().await else { break };
                self.app.apply(event);
            }
        }

        /// Feed events to the app until the turn ends.
        pub async fn finish_turn(&mut self) {
            while self.app.controller.is_busy() {
                let Some(event) = self.events.recv().await else { break };
                self.app.apply(event);
            }
        }
    }
}
