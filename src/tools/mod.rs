//! Client-side tools offered to the model
//!
//! The model asks for these by name in a tool-call batch; the
//! [`ToolDispatcher`] validates arguments and answers every call.

pub mod call;
pub mod dispatcher;
pub mod opener;
pub mod system;
pub mod url;

pub use call::{ThemeMode, ToolCall, ToolRequest, ToolResult};
pub use dispatcher::{ToolDispatcher, declarations};
pub use opener::{SystemOpener, UrlOpener};
pub use system::SystemSnapshot;
pub use url::{normalize_url, search_url};
