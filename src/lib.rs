pub mod manifest;
pub mod normalize;
pub mod pipeline;
pub mod tools;
pub mod watch;
