pub mod contact;
pub mod message;
pub mod tenant;

pub use contact::{ContactRecord, NewContact};
pub use message::{
    Direction, InsertOutcome, MessageContent, MessageContext, MessageError, MessageRecord,
    MessageStatus, MessageType, NormalizedMessage, StatusOutcome, StatusUpdate,
};
pub use tenant::{NewTenant, TenantRecord};
