pub mod auth;
pub mod clipboard;
pub mod config;
pub mod controller;
pub mod error;
pub mod markdown;
pub mod mode;
pub mod state;
pub mod store;
pub mod transport;

// Re-export main types for convenience
pub use auth::{AuthConfig, AuthGate};
pub use clipboard::{Clipboard, SystemClipboard};
pub use config::Config;
pub use controller::{ChatController, ChatEvent, ChatEventSink};
pub use error::{ClipboardError, ConfigError, TransportError};
pub use mode::Mode;
pub use state::{Message, MessageId, Role, Session};
pub use store::LocalStore;
pub use transport::{
    AllowAll, Authorizer, ChatTransport, FragmentStream, OpenAiTransport, ProxyAuthorizer,
    ProxyTransport,
};
