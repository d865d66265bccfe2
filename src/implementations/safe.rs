pub mod channel;
pub mod rayon;
pub mod single;
