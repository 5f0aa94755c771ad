mod document;

pub use document::{Data, Document};
