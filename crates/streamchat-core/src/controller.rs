//! Chat controller: owns the session, the input buffer and the in-flight
//! turn.
//!
//! Both the credential check and the stream run in background tasks that
//! report back through a [`ChatEventSink`]; the owner of the controller
//! feeds those events to [`ChatController::apply`] from its event loop, so
//! the loop never waits on the network, fragments land in the session in
//! arrival order, and only one turn can be pending or in flight.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::state::{Message, MessageId, Session};
use crate::transport::{Authorizer, ChatTransport};

/// Progress of a turn. `id` is the id of the assistant message the turn
/// streams into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// Verdict of the credential check started by [`ChatController::submit`]
    Authorized { id: MessageId, approved: bool },
    Fragment { id: MessageId, text: String },
    Finished { id: MessageId },
    Failed { id: MessageId, error: String },
}

/// Receiver of [`ChatEvent`]s from the background tasks.
pub trait ChatEventSink: Send + Sync + 'static {
    fn send(&self, event: ChatEvent);
}

impl ChatEventSink for mpsc::UnboundedSender<ChatEvent> {
    fn send(&self, event: ChatEvent) {
        // The receiver only goes away when the client is shutting down.
        let _ = mpsc::UnboundedSender::send(self, event);
    }
}

/// A send waiting for its credential check
struct PendingSend {
    id: MessageId,
    text: String,
    credential: String,
}

pub struct ChatController {
    session: Session,
    input: String,
    pending: Option<PendingSend>,
    in_flight: Option<MessageId>,
    transport: Arc<dyn ChatTransport>,
    authorizer: Arc<dyn Authorizer>,
    sink: Arc<dyn ChatEventSink>,
    notifier: watch::Sender<Session>,
}

impl ChatController {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        authorizer: Arc<dyn Authorizer>,
        sink: Arc<dyn ChatEventSink>,
    ) -> Self {
        let (notifier, _) = watch::channel(Session::new());
        Self {
            session: Session::new(),
            input: String::new(),
            pending: None,
            in_flight: None,
            transport,
            authorizer,
            sink,
            notifier,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Observe every new session snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.notifier.subscribe()
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut String {
        &mut self.input
    }

    /// A submitted send is waiting for its credential check.
    pub fn is_authorizing(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn is_busy(&self) -> bool {
        self.is_authorizing() || self.is_in_flight()
    }

    /// Whether a send would be attempted: input not blank and no turn
    /// pending or in flight.
    pub fn can_submit(&self) -> bool {
        !self.input.trim().is_empty() && !self.is_busy()
    }

    /// Send the input buffer as a new user turn.
    ///
    /// Returns immediately with the id the assistant reply will carry, or
    /// `None` if the input is blank or a turn is already pending or in
    /// flight. The credential is checked in the background; the turn starts
    /// when the approving [`ChatEvent::Authorized`] is applied. A refused
    /// check leaves the session and input untouched.
    pub fn submit(&mut self, credential: &str) -> Option<MessageId> {
        if !self.can_submit() {
            return None;
        }

        let id = MessageId::new();
        self.pending = Some(PendingSend {
            id,
            text: self.input.clone(),
            credential: credential.to_string(),
        });

        debug!(%id, "checking credential before send");
        spawn_authorization(
            Arc::clone(&self.authorizer),
            credential.to_string(),
            id,
            Arc::clone(&self.sink),
        );

        Some(id)
    }

    /// Fold an event into the session. Returns true if the session or the
    /// pending/in-flight state changed.
    pub fn apply(&mut self, event: ChatEvent) -> bool {
        match event {
            ChatEvent::Authorized { id, approved } => {
                if self.pending.as_ref().map(|p| p.id) != Some(id) {
                    return false;
                }
                let Some(pending) = self.pending.take() else {
                    return false;
                };
                if approved {
                    self.start_turn(pending);
                } else {
                    info!(%id, "send refused: credential not authorized");
                }
                true
            }
            ChatEvent::Fragment { id, text } => {
                if self.in_flight != Some(id) {
                    debug!(%id, "dropping fragment for a turn that is not in flight");
                    return false;
                }
                match self.session.with_appended(id, &text) {
                    Some(next) => {
                        self.publish(next);
                        true
                    }
                    None => false,
                }
            }
            ChatEvent::Finished { id } => {
                if self.in_flight != Some(id) {
                    return false;
                }
                info!(%id, "chat turn finished");
                self.in_flight = None;
                true
            }
            ChatEvent::Failed { id, error } => {
                if self.in_flight != Some(id) {
                    return false;
                }
                warn!(%id, %error, "chat turn failed; keeping partial response");
                self.in_flight = None;
                true
            }
        }
    }

    fn start_turn(&mut self, pending: PendingSend) {
        let PendingSend {
            id,
            text,
            credential,
        } = pending;

        self.input.clear();
        let with_user = self.session.with_message(Message::user(text));
        let history = with_user.messages().to_vec();
        self.publish(with_user.with_message(Message::assistant_placeholder(id)));
        self.in_flight = Some(id);

        info!(%id, turns = history.len(), "submitting chat turn");
        spawn_stream(
            Arc::clone(&self.transport),
            history,
            credential,
            id,
            Arc::clone(&self.sink),
        );
    }

    fn publish(&mut self, session: Session) {
        self.session = session.clone();
        self.notifier.send_replace(session);
    }
}

/// Run the credential check in the background. Exactly one `Authorized`
/// event is sent; a panicking authorizer counts as a refusal.
fn spawn_authorization(
    authorizer: Arc<dyn Authorizer>,
    credential: String,
    id: MessageId,
    sink: Arc<dyn ChatEventSink>,
) {
    tokio::spawn(async move {
        let task = tokio::spawn(async move { authorizer.authorize(&credential).await });
        let approved = match task.await {
            Ok(approved) => approved,
            Err(e) => {
                warn!(%id, error = %e, "credential check aborted");
                false
            }
        };
        sink.send(ChatEvent::Authorized { id, approved });
    });
}

/// Run the transport in the background. Exactly one `Finished` or `Failed`
/// event is sent when it ends, even if the streaming task panics.
fn spawn_stream(
    transport: Arc<dyn ChatTransport>,
    history: Vec<Message>,
    credential: String,
    id: MessageId,
    sink: Arc<dyn ChatEventSink>,
) {
    let fragment_sink = Arc::clone(&sink);
    tokio::spawn(async move {
        let task = tokio::spawn(async move {
            forward_fragments(transport.as_ref(), &history, &credential, id, fragment_sink.as_ref())
                .await
        });

        let event = match task.await {
            Ok(Ok(())) => ChatEvent::Finished { id },
            Ok(Err(e)) => ChatEvent::Failed {
                id,
                error: e.to_string(),
            },
            Err(e) => ChatEvent::Failed {
                id,
                error: e.to_string(),
            },
        };
        sink.send(event);
    });
}

async fn forward_fragments(
    transport: &dyn ChatTransport,
    history: &[Message],
    credential: &str,
    id: MessageId,
    sink: &dyn ChatEventSink,
) -> Result<(), TransportError> {
    let mut stream = transport.stream(history, credential).await?;
    while let Some(fragment) = stream.next().await {
        sink.send(ChatEvent::Fragment {
            id,
            text: fragment?,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Role;
    use crate::transport::{AllowAll, FragmentStream};
    use async_trait::async_trait;
    use futures_util::{future, stream};
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    #[derive(Clone, Copy)]
    enum Step {
        Text(&'static str),
        Fail(&'static str),
    }

    #[derive(Default)]
    struct ScriptedTransport {
        steps: Vec<Step>,
        refuse_to_start: bool,
        seen: Mutex<Vec<(Vec<Message>, String)>>,
    }

    impl ScriptedTransport {
        fn new(steps: Vec<Step>) -> Self {
            Self {
                steps,
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl ChatTransport for ScriptedTransport {
        async fn stream(
            &self,
            history: &[Message],
            credential: &str,
        ) -> Result<FragmentStream, TransportError> {
            self.seen
                .lock()
                .unwrap()
                .push((history.to_vec(), credential.to_string()));
            if self.refuse_to_start {
                return Err(TransportError::Unauthorized);
            }
            let items: Vec<Result<String, TransportError>> = self
                .steps
                .iter()
                .map(|step| match step {
                    Step::Text(t) => Ok(t.to_string()),
                    Step::Fail(e) => Err(TransportError::Stream(e.to_string())),
                })
                .collect();
            Ok(Box::pin(stream::iter(items)))
        }
    }

    struct Deny;

    #[async_trait]
    impl Authorizer for Deny {
        async fn authorize(&self, _credential: &str) -> bool {
            false
        }
    }

    /// Never answers, like a server that accepts and then goes quiet.
    struct Silent;

    #[async_trait]
    impl Authorizer for Silent {
        async fn authorize(&self, _credential: &str) -> bool {
            future::pending().await
        }
    }

    struct Harness {
        controller: ChatController,
        events: mpsc::UnboundedReceiver<ChatEvent>,
        transport: Arc<ScriptedTransport>,
    }

    impl Harness {
        fn new(transport: ScriptedTransport) -> Self {
            Self::with_authorizer(transport, Arc::new(AllowAll))
        }

        fn with_authorizer(transport: ScriptedTransport, authorizer: Arc<dyn Authorizer>) -> Self {
            let transport = Arc::new(transport);
            let (tx, events) = mpsc::unbounded_channel();
            let controller = ChatController::new(transport.clone(), authorizer, Arc::new(tx));
            Self {
                controller,
                events,
                transport,
            }
        }

        async fn next_event(&mut self) -> ChatEvent {
            let event = self.events.recv().await.expect("event channel closed");
            self.controller.apply(event.clone());
            event
        }

        /// Apply events until the credential check has been decided.
        async fn authorize(&mut self) {
            while self.controller.is_authorizing() {
                self.next_event().await;
            }
        }

        /// Apply events until the turn has ended.
        async fn drain(&mut self) -> Vec<ChatEvent> {
            let mut seen = Vec::new();
            while self.controller.is_busy() {
                seen.push(self.next_event().await);
            }
            seen
        }
    }

    #[tokio::test]
    async fn test_submit_appends_user_then_assistant_and_clears_input() {
        let mut h = Harness::new(ScriptedTransport::new(vec![]));
        h.controller.input_mut().push_str("hello there");

        let id = h.controller.submit("key").unwrap();
        h.authorize().await;

        let messages = h.controller.session().messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "hello there");
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].id, id);
        assert_eq!(messages[1].content, "");
        assert_eq!(h.controller.input(), "");
        assert!(h.controller.is_in_flight());
    }

    #[tokio::test]
    async fn test_nothing_changes_until_the_check_is_decided() {
        let mut h = Harness::new(ScriptedTransport::new(vec![]));
        h.controller.input_mut().push_str("hello");

        h.controller.submit("key").unwrap();

        assert!(h.controller.is_authorizing());
        assert!(!h.controller.can_submit());
        assert!(h.controller.session().is_empty());
        assert_eq!(h.controller.input(), "hello");
        assert!(h.controller.submit("key").is_none());
    }

    #[tokio::test]
    async fn test_silent_authorizer_does_not_block_submit() {
        let mut h = Harness::with_authorizer(ScriptedTransport::new(vec![]), Arc::new(Silent));
        h.controller.input_mut().push_str("hello");

        // Returns without waiting on the check.
        assert!(h.controller.submit("key").is_some());
        assert!(h.controller.is_authorizing());

        let quiet = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            h.events.recv(),
        )
        .await;
        assert!(quiet.is_err());
        assert!(h.controller.session().is_empty());
        assert_eq!(h.controller.input(), "hello");
    }

    #[tokio::test]
    async fn test_blank_input_is_a_no_op() {
        let mut h = Harness::new(ScriptedTransport::new(vec![]));
        assert!(h.controller.submit("key").is_none());

        h.controller.input_mut().push_str("  \n\t ");
        assert!(h.controller.submit("key").is_none());

        assert!(h.controller.session().is_empty());
        assert_eq!(h.controller.input(), "  \n\t ");
        assert!(!h.controller.is_busy());
    }

    #[tokio::test]
    async fn test_second_submit_while_in_flight_is_a_no_op() {
        let mut h = Harness::new(ScriptedTransport::new(vec![Step::Text("ok")]));
        h.controller.input_mut().push_str("first");
        h.controller.submit("key").unwrap();
        h.authorize().await;

        h.controller.input_mut().push_str("second");
        assert!(!h.controller.can_submit());
        assert!(h.controller.submit("key").is_none());
        assert_eq!(h.controller.session().len(), 2);
        assert_eq!(h.controller.input(), "second");

        h.drain().await;
        assert!(h.controller.can_submit());
    }

    #[tokio::test]
    async fn test_fragments_accumulate_on_a_stable_message() {
        let mut h = Harness::new(ScriptedTransport::new(vec![
            Step::Text("Hel"),
            Step::Text("lo"),
            Step::Text("!"),
        ]));
        h.controller.input_mut().push_str("greet me");
        let id = h.controller.submit("key").unwrap();
        h.authorize().await;

        let mut contents = Vec::new();
        while h.controller.is_in_flight() {
            h.next_event().await;
            let last = h.controller.session().last().unwrap();
            assert_eq!(last.id, id);
            contents.push(last.content.clone());
        }

        assert_eq!(contents, vec!["Hel", "Hello", "Hello!", "Hello!"]);
        assert_eq!(h.controller.session().len(), 2);
    }

    #[tokio::test]
    async fn test_history_excludes_placeholder_and_carries_credential() {
        let mut h = Harness::new(ScriptedTransport::new(vec![Step::Text("a")]));
        h.controller.input_mut().push_str("one");
        h.controller.submit("key-1").unwrap();
        h.drain().await;

        h.controller.input_mut().push_str("two");
        h.controller.submit("key-1").unwrap();
        h.drain().await;

        let seen = h.transport.seen.lock().unwrap();
        let (second_history, credential) = &seen[1];
        let turns: Vec<(Role, &str)> = second_history
            .iter()
            .map(|m| (m.role, m.content.as_str()))
            .collect();
        assert_eq!(
            turns,
            vec![(Role::User, "one"), (Role::Assistant, "a"), (Role::User, "two")]
        );
        assert_eq!(credential, "key-1");
    }

    #[tokio::test]
    async fn test_stream_failure_keeps_partial_content() {
        let mut h = Harness::new(ScriptedTransport::new(vec![
            Step::Text("par"),
            Step::Fail("connection reset"),
            Step::Text("never"),
        ]));
        h.controller.input_mut().push_str("q");
        let id = h.controller.submit("key").unwrap();

        let events = h.drain().await;

        assert!(!h.controller.is_in_flight());
        assert_eq!(h.controller.session().last().unwrap().content, "par");
        assert!(matches!(
            events.last(),
            Some(ChatEvent::Failed { id: failed, error }) if *failed == id && error.contains("connection reset")
        ));
    }

    #[tokio::test]
    async fn test_transport_start_failure_clears_in_flight() {
        let mut transport = ScriptedTransport::new(vec![]);
        transport.refuse_to_start = true;
        let mut h = Harness::new(transport);
        h.controller.input_mut().push_str("q");
        h.controller.submit("key").unwrap();

        h.drain().await;

        assert!(!h.controller.is_in_flight());
        assert_eq!(h.controller.session().len(), 2);
    }

    #[tokio::test]
    async fn test_unauthorized_submit_changes_nothing() {
        let mut h = Harness::with_authorizer(ScriptedTransport::new(vec![]), Arc::new(Deny));
        h.controller.input_mut().push_str("hello");

        let id = h.controller.submit("wrong").unwrap();
        let events = h.drain().await;

        assert_eq!(events, vec![ChatEvent::Authorized { id, approved: false }]);
        assert!(h.controller.session().is_empty());
        assert_eq!(h.controller.input(), "hello");
        assert!(!h.controller.is_busy());
        assert!(h.controller.can_submit());
        assert!(h.transport.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_events_for_other_turns_are_ignored() {
        let mut h = Harness::new(ScriptedTransport::new(vec![]));
        h.controller.input_mut().push_str("q");
        h.controller.submit("key").unwrap();

        let stranger = MessageId::new();
        assert!(!h.controller.apply(ChatEvent::Authorized {
            id: stranger,
            approved: true
        }));
        assert!(h.controller.is_authorizing());

        h.authorize().await;
        assert!(!h.controller.apply(ChatEvent::Fragment {
            id: stranger,
            text: "x".into()
        }));
        assert!(!h.controller.apply(ChatEvent::Finished { id: stranger }));
        assert!(h.controller.is_in_flight());
    }

    #[tokio::test]
    async fn test_subscribers_see_each_snapshot() {
        let mut h = Harness::new(ScriptedTransport::new(vec![Step::Text("hi")]));
        let mut rx = h.controller.subscribe();
        h.controller.input_mut().push_str("q");
        h.controller.submit("key").unwrap();
        assert!(!rx.has_changed().unwrap());

        h.authorize().await;
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().len(), 2);

        h.drain().await;
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().last().unwrap().content, "hi");
    }
}
