//! Minimal client: connects to the command server and runs one
//! pick-and-place cycle against named positions.
//!
//!     cargo run --example client -- 192.168.137.1:5000

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let address = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:5000".to_string());

    let stream = TcpStream::connect(&address).await?;
    println!("Connected to {address}");
    let mut lines = Framed::new(stream, LinesCodec::new());

    for request in [
        r#"{"command": "list_positions"}"#,
        r#"{"command": "pick_piece", "piece": "piece 1"}"#,
        r#"{"command": "wait", "duration": 1.0}"#,
        r#"{"command": "place_piece", "location": "bad bin"}"#,
        r#"{"command": "move_home"}"#,
    ] {
        println!("-> {request}");
        lines.send(request).await?;
        match lines.next().await {
            Some(Ok(response)) => println!("<- {response}"),
            Some(Err(e)) => {
                eprintln!("Read failed: {e}");
                break;
            }
            None => {
                eprintln!("Server closed the connection.");
                break;
            }
        }
    }

    Ok(())
}
