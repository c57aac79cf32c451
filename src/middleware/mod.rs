// Middleware shared by every HTTP role

pub mod cors;

pub use cors::*;
