pub mod group;
pub mod login;
pub mod message;
pub mod qos;
pub mod roster;

pub use group::GroupAdminResult;
pub use login::{DeviceProfile, LoginFailure, LoginRequest, LoginResult, RegisterRequest};
pub use message::{ChatMessage, MessageEvent, MessageType, Receipt, ReceiptKind, TypingIndicator};
pub use qos::{AckEntry, HistoryBatch};
pub use roster::{GroupSummary, Peer, Roster};
