pub mod health;
pub mod job;
pub mod record;

pub use health::*;
pub use job::*;
pub use record::*;
