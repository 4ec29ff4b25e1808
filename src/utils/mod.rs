pub mod atomic_file;
pub mod constants;
pub mod ring_buffer;

pub use atomic_file::{read_json, write_atomic, write_json_atomic};
pub use constants::*;
pub use ring_buffer::RingBuffer;
