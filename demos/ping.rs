//! Ping - send one request and print the first response.
//!
//! This example demonstrates:
//! - Building a connection with the builder pattern
//! - Encoding a request header with the fixed-size codecs
//! - Receiving inbound messages from the dispatch channel
//!
//! # Running
//!
//! ```text
//! cargo run --example ping -- 127.0.0.1:5701
//! ```

use gridwire_client::codec::fixed;
use gridwire_client::protocol::{offsets, request_header_size, ClientMessage, Direction, Frame};
use gridwire_client::Connection;

/// Message type of the server's ping request.
const PING_REQUEST_TYPE: i32 = 0x000B00;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:5701".to_string());

    let (connection, mut inbound) = Connection::builder().connect(&addr).await?;
    println!("{connection}");

    let mut request = ClientMessage::for_encode();
    request.set_operation_name("Client.Ping");
    let mut header = Frame::initial(request_header_size(0));
    header.update_content(|buf| {
        fixed::encode_int(buf, offsets::MESSAGE_TYPE, PING_REQUEST_TYPE);
        fixed::encode_long(buf, offsets::CORRELATION_ID, 1);
        fixed::encode_int(buf, offsets::PARTITION_ID, -1);
    });
    request.add_frame(header);

    connection.write(request).await?;

    if let Some(response) = inbound.recv().await {
        println!("{:?}", response.header(Direction::Response)?);
    }

    connection.close(Some("Ping finished"), None);
    Ok(())
}
