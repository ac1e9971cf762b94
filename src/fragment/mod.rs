//! Fragment pseudo-protocol: parser and fallback adapter.
//!
//! Active only when no host is detected; recovers the same canonical event
//! stream a host would have produced from the page's address fragment.

mod adapter;
mod parser;

pub(crate) use adapter::FragmentAdapter;
pub use parser::{FragmentPairs, parse_fragment, value};
