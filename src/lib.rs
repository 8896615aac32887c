//! # gridwire-client
//!
//! Client-side transport for the binary, frame-based protocol spoken by a
//! clustered data-grid server.
//!
//! This crate moves messages between a client and one server connection.
//! What a message means is up to the per-operation codecs built on top of
//! [`codec`].
//!
//! ## Architecture
//!
//! - **Protocol** ([`protocol`]): frames, messages, the 6-byte frame header,
//!   the incremental reader and fragment reassembly
//! - **Codecs** ([`codec`]): builtin primitives for scalars, strings, lists
//!   and maps
//! - **Writer** ([`writer`]): a dedicated task that coalesces small messages
//!   into few socket writes and reports each message's outcome
//! - **Connection** ([`Connection`]): one socket with its read and write
//!   tasks, dispatching complete inbound messages on a channel
//!
//! ## Example
//!
//! ```no_run
//! use gridwire_client::protocol::{offsets, ClientMessage, Frame};
//! use gridwire_client::ConnectionBuilder;
//!
//! #[tokio::main]
//! async fn main() -> gridwire_client::Result<()> {
//!     let (connection, mut inbound) = ConnectionBuilder::new()
//!         .connect("127.0.0.1:5701")
//!         .await?;
//!
//!     let mut ping = ClientMessage::for_encode();
//!     ping.add_frame(Frame::initial(offsets::REQUEST_HEADER_SIZE));
//!     ping.set_message_type(0x000B00)?;
//!     ping.set_correlation_id(1)?;
//!     ping.set_partition_id(-1)?;
//!     connection.write(ping).await?;
//!
//!     while let Some(message) = inbound.recv().await {
//!         println!("received correlation id {}", message.correlation_id()?);
//!     }
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod protocol;
pub mod writer;

mod connection;

pub use config::ConnectionConfig;
pub use connection::{CloseEvent, Connection, ConnectionBuilder, REMOTE_CLOSE_REASON};
pub use error::{GridwireError, Result};
pub use writer::{WriteCompletion, WriterHandle};
