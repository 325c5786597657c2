//! Live browser control.

pub mod page;
pub mod session;

pub use page::ChromiumPage;
pub use session::{needs_login, BrowserSession, SessionConfig, Viewport};
