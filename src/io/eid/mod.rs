// src/io/eid/mod.rs
//
// EID tag reader device: connection lifecycle, transport seam, and
// identifier framing.

pub mod framer;
pub mod link;
pub mod reader;

pub use framer::{EidFramer, EidFramerConfig, MAX_BUFFER_LEN, MIN_FRAME_LEN};
pub use link::{list_reader_ports, LinkConnector, ReaderLink, ReaderPortInfo, SerialConnector};
pub use reader::{
    EidReader, EidReaderConfig, DEFAULT_BAUD_RATE, POLL_INTERVAL, READ_BUFFER_SIZE, STARTUP_DELAY,
};
