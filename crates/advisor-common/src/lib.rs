pub mod completion;
pub mod error;
pub mod openai;
