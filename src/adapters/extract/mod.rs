//! Job attribute extraction from Upwork job pages.

pub mod collector;
pub mod html_parser;
pub mod js_literal;
pub mod nuxt_data;
pub mod nuxt_state;
pub mod pipeline;
pub mod reference;
pub mod scorer;
pub mod tree_walker;

pub use pipeline::{ExtractContext, Stage, extract};
