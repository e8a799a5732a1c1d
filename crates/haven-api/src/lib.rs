pub mod http;
pub mod ndjson;
pub mod reply_stream;

pub mod mock;

pub use http::ApiClient;
pub use mock::{MockBackend, MockReply};
pub use ndjson::NdjsonParser;
pub use reply_stream::ReplyStream;
