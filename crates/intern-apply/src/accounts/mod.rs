//! Account registration, login sessions, and the gate in front of the
//! application endpoints.

pub mod router;
pub mod session;
pub mod store;

pub use router::{account_router, require_session, AccountState};
pub use session::{bearer_token, SessionError, SessionStore, SessionUser};
pub use store::{AccountError, AccountStore, FileAccountStore, UserId};
