pub mod delay;
pub mod drive;
pub mod filter;
pub mod mix;
pub mod pitch;
pub mod reverb;
pub mod shifter;
