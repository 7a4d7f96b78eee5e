//! 上游 Provider

pub mod cursor;
pub mod traits;

pub use cursor::{extract_auth_token, generate_checksum, resolve_checksum, CursorProvider};
pub use traits::{ByteStream, ChatBackend, ProviderError, UpstreamRequest};
