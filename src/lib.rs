#![warn(future_incompatible, nonstandard_style, rust_2018_idioms, unused)]
#![warn(clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::wildcard_imports,
    clippy::similar_names,
    clippy::cast_possible_truncation,
    clippy::too_many_lines
)]

pub mod connection;
pub mod error;
pub mod event;
pub mod flags;
pub mod flow;
pub mod frame;
pub mod hpack;
pub mod request;
pub mod settings;
pub mod stream;
pub mod stream_table;
pub mod transport;
pub mod types;

pub use bytes::Bytes;
pub use connection::{ConnectOptions, Connection, Direction, Mode, StreamChunk, StreamOutcome, TransportMessage};
pub use error::{ArgumentError, Http2Error, TransportError, WindowScope};
pub use event::ResponseEvent;
pub use request::{Method, RequestBody};
pub use transport::{MockTransport, Transport, TransportConnector, TransportOpts};
pub use types::RequestRef;
