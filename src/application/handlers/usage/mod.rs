//! Usage handlers.
//!
//! ## Commands
//! - Starting a session after the quota pre-check
//! - Counting a session once it passes the threshold
//! - Ending (or cancelling) a session
//!
//! ## Queries
//! - Check access and remaining quota
//! - Read a session row

mod check_access;
mod counting;
mod end_session;
mod get_session;
mod mark_counted;
mod start_session;

// Commands
pub use end_session::{EndSessionCommand, EndSessionHandler, EndSessionResult};
pub use mark_counted::{MarkCountedCommand, MarkCountedHandler, MarkCountedResult};
pub use start_session::{StartSessionCommand, StartSessionHandler, StartSessionResult};

// Queries
pub use check_access::{CheckAccessHandler, CheckAccessQuery};
pub use get_session::{GetSessionHandler, GetSessionQuery};
