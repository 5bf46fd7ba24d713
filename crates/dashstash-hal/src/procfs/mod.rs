pub mod mountinfo;
pub mod process_io;
