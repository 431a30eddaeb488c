//! Remote tool servers (Model Context Protocol over stdio).

pub mod catalog;
pub mod protocol;
pub mod session;

pub use catalog::{convert_result, RemoteTool, RemoteToolCatalog};
pub use session::{StdioSession, ToolSession};
