pub mod checkpoint;
pub mod rate;
pub mod scheduler;
