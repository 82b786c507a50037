pub mod cache;
pub mod diagnostics;
pub mod extract;
pub mod http;
