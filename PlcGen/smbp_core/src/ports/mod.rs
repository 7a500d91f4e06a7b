pub mod backend;
pub mod generator;

pub use backend::DocumentCodec;
pub use generator::TextGenerator;
