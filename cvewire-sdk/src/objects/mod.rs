pub mod alert;
pub mod article;
pub mod channel;
pub mod control;
pub mod envelope;
pub mod identity;
pub mod stats;
pub mod system;

pub use alert::{AlertMatchPayload, AlertType, Priority};
pub use article::{Article, ArticleEventKind, ArticleSummary, IngestArticle, IngestResponse, Severity};
pub use channel::{Channel, ChannelError, slugify};
pub use control::{ClientMessage, ClientMessageError};
pub use envelope::{
    ChannelPayload, ConnectedPayload, Envelope, ErrorCode, ErrorPayload, MessageType,
    TokenExpiringPayload, WsCloseCode,
};
pub use identity::{Identity, Role};
pub use stats::HubStats;
pub use system::{Announcement, AnnouncementLevel};
