//! Portal page parsers. Every parser is a pure function from HTML to typed
//! values; nothing here touches the network or the cache.

pub mod detail;
pub mod home;
pub mod html;
pub mod release;

pub use detail::{DetailPage, parse_detail};
pub use home::{HomeIndex, parse_home};
pub use html::TextValue;
pub use release::{ReleasePage, parse_release};
