// Document preprocessing: uploaded files to plain text

pub mod document_processor;

pub use document_processor::*;
