pub mod source;
pub mod sync;
