use std::env::args;
use std::process::exit;

use futures::stream::StreamExt;

use xmpp_core::stanza::{Message, MessageType, Presence};
use xmpp_core::{Client, Event, Stanza};

#[tokio::main]
async fn main() {
    env_logger::init();

    let args: Vec<String> = args().collect();
    if args.len() != 4 {
        println!("Usage: {} <jid> <password> <server:port>", args[0]);
        exit(1);
    }
    let jid: jid::Jid = args[1].parse().unwrap_or_else(|e| {
        eprintln!("invalid JID {}: {e}", &args[1]);
        exit(1);
    });
    let password = args[2].clone();
    let (host, port) = args[3].rsplit_once(':').unwrap_or_else(|| {
        eprintln!("expected <server:port>, got {}", &args[3]);
        exit(1);
    });
    let port: u16 = port.parse().expect("invalid port");

    let mut client = Client::new(jid, password, host, port);

    while let Some(event) = client.next().await {
        println!("event: {:?}", event);
        match event {
            Event::Online { .. } => {
                client
                    .send_stanza(Stanza::Presence(Presence::available()))
                    .await
                    .unwrap();
            }
            Event::Stanza(Stanza::Message(message)) => {
                let Some(from) = message.from.clone() else {
                    continue;
                };
                let Some(body) = message.body.as_deref() else {
                    continue;
                };
                if body == "die" {
                    println!("secret die command triggered by {from}");
                    break;
                }
                if message.type_ != MessageType::Error {
                    let reply = Message::chat(from, body);
                    client.send_stanza(Stanza::Message(reply)).await.unwrap();
                }
            }
            _ => {}
        }
    }

    client.send_end().await.unwrap();
}
