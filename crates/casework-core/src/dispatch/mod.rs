//! Command and reply dispatch: the static action-group table, the incoming
//! processor, and the reply broadcast processor.

pub mod builtin;
pub mod group;
pub mod incoming;
pub mod response;

pub use group::{ActionGroup, ActionTable, BoxActionGroup};
pub use incoming::IncomingProcessor;
pub use response::ResponseProcessor;
