//! eidlink: serial-over-Bluetooth EID reader link.
//!
//! Connects to one predetermined RFID/EID tag reader over its serial
//! channel, reassembles the reader's noisy byte stream into identifier
//! frames, and delivers status and scan events to the consumer. The
//! consumer owns everything downstream of the events: normalising
//! identifier length, deduplicating scans, and persisting survey records.
//!
//! ```no_run
//! use eidlink::{EidReader, EidReaderConfig, ReaderEvent, TargetDescriptor};
//!
//! # async fn run() {
//! let target = TargetDescriptor::new("00:07:80:E6:95:52");
//! let config = EidReaderConfig::new(target, "/dev/rfcomm0");
//! let (mut reader, mut events) = EidReader::new(config);
//!
//! reader.start().expect("reader already running");
//! while let Some(event) = events.recv().await {
//!     match event {
//!         ReaderEvent::Eid(id) => println!("scan: {}", id),
//!         ReaderEvent::Status(_, line) => println!("{}", line),
//!         ReaderEvent::Error(err) => println!("{}", err),
//!         ReaderEvent::Ended(_) => break,
//!     }
//! }
//! reader.stop().await;
//! # }
//! ```

#[macro_use]
mod logging;

pub mod io;

pub use io::{
    list_reader_ports, ConnectionState, EidFramer, EidFramerConfig, EidReader, EidReaderConfig,
    ReaderError, ReaderEvent, ReaderPortInfo, TargetDescriptor, SPP_SERVICE_UUID,
};
pub use logging::{init_file_logging, stop_file_logging};
