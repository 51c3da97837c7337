pub mod memory;
pub mod pool;
pub mod question_store;
