pub mod auth;
pub mod client;
pub mod logging;
pub mod mock_client;
pub mod sandbox;
pub mod stream;

pub use auth::{execution_user_id, AuthClient, SessionGate, StaticSession, ANONYMOUS_USER_ID};
pub use client::{ApiClient, ByteStream, ChatRequest, FragmentStreamSource};
pub use sandbox::{SandboxClient, SandboxExecutor};
