pub mod http;
pub mod server;
pub mod sessions;

pub use http::create_router;
pub use server::DataNode;
pub use sessions::{SessionManager, SessionRecord};
