//! Interactive commands read from stdin while a peer or discovery node is running.

use crate::chord::peer::Peer;
use crate::discovery::server::DiscoveryProcessor;
use std::io;
use std::str::FromStr;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

const PEER_USAGE: &str = "Peer usage:
\tget-host                : print the address other peers use to reach us
\tget-id                  : print our ring id
\tget-ft                  : print the finger table
\tget-predecessor | get-p : print our predecessor
\tget-successor | get-s   : print our successor
\tget-files               : print the files stored on this peer
\texit                    : leave the ring and shut down
";

const DISCOVERY_USAGE: &str = "Discovery node usage:
\tget-host  : print the address peers use to reach us
\tget-peers : print every tracked peer
";

/// Why a console loop returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsoleExit {
    /// The operator typed `exit`.
    Requested,
    /// Standard input reached EOF.
    InputClosed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeerCommand {
    GetHost,
    GetId,
    GetFingerTable,
    GetPredecessor,
    GetSuccessor,
    GetFiles,
    Exit,
    Help,
}

impl FromStr for PeerCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "get-host" => Ok(PeerCommand::GetHost),
            "get-id" => Ok(PeerCommand::GetId),
            "get-ft" => Ok(PeerCommand::GetFingerTable),
            "get-predecessor" | "get-p" => Ok(PeerCommand::GetPredecessor),
            "get-successor" | "get-s" => Ok(PeerCommand::GetSuccessor),
            "get-files" => Ok(PeerCommand::GetFiles),
            "exit" => Ok(PeerCommand::Exit),
            "help" => Ok(PeerCommand::Help),
            other => Err(format!("Invalid command '{}'", other)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiscoveryCommand {
    GetHost,
    GetPeers,
    Help,
}

impl FromStr for DiscoveryCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "get-host" => Ok(DiscoveryCommand::GetHost),
            "get-peers" => Ok(DiscoveryCommand::GetPeers),
            "help" => Ok(DiscoveryCommand::Help),
            other => Err(format!("Invalid command '{}'", other)),
        }
    }
}

async fn write_line<W: AsyncWrite + Unpin>(output: &mut W, text: &str) -> io::Result<()> {
    output.write_all(text.as_bytes()).await?;
    if !text.ends_with('\n') {
        output.write_all(b"\n").await?;
    }
    output.flush().await
}

/// Runs peer commands until `exit` or EOF. Leaving the ring is up to the caller.
pub async fn run_peer_console<R, W>(peer: &Peer, input: R, output: &mut W) -> io::Result<ConsoleExit>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    write_line(output, "Enter commands for peer: (type 'help' for usage)").await?;
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let command = match line.parse::<PeerCommand>() {
            Ok(command) => command,
            Err(e) => {
                write_line(output, &e).await?;
                continue;
            }
        };
        let text = match command {
            PeerCommand::GetHost => peer.identifier().hostname.clone(),
            PeerCommand::GetId => peer.identifier().id.to_hex(),
            PeerCommand::GetFingerTable => peer.finger_table().await.to_string(),
            PeerCommand::GetPredecessor => peer.predecessor().await.to_string(),
            PeerCommand::GetSuccessor => peer.successor().await.to_string(),
            PeerCommand::GetFiles => {
                let items = peer.snapshot().await.stored_items;
                serde_json::to_string_pretty(&items)
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
            }
            PeerCommand::Help => PEER_USAGE.to_string(),
            PeerCommand::Exit => return Ok(ConsoleExit::Requested),
        };
        write_line(output, &text).await?;
    }
    Ok(ConsoleExit::InputClosed)
}

/// Runs discovery commands until EOF.
pub async fn run_discovery_console<R, W>(
    processor: &DiscoveryProcessor,
    input: R,
    output: &mut W,
) -> io::Result<ConsoleExit>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    write_line(output, "Enter commands for discovery node: (type 'help' for usage)").await?;
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let text = match line.parse::<DiscoveryCommand>() {
            Ok(DiscoveryCommand::GetHost) => processor.header().hostname.clone(),
            Ok(DiscoveryCommand::GetPeers) => {
                let peers = processor.registry().await.peers();
                if peers.is_empty() {
                    "No peers in the ring".to_string()
                } else {
                    peers
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join("\n")
                }
            }
            Ok(DiscoveryCommand::Help) => DISCOVERY_USAGE.to_string(),
            Err(e) => e,
        };
        write_line(output, &text).await?;
    }
    Ok(ConsoleExit::InputClosed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chord::types::{Identifier, RingId, StoredItem};
    use crate::chord::FINGER_TABLE_SIZE;
    use crate::network::messages::{Header, Message, MessageBody};
    use tracing::Span;

    fn peer() -> Peer {
        Peer::new(
            Identifier::new("127.0.0.1:9001", RingId::new(0x3dcf)),
            FINGER_TABLE_SIZE,
            FINGER_TABLE_SIZE,
            Span::none(),
        )
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!(
            "get-p".parse::<PeerCommand>(),
            Ok(PeerCommand::GetPredecessor)
        );
        assert_eq!(
            " get-successor ".parse::<PeerCommand>(),
            Ok(PeerCommand::GetSuccessor)
        );
        assert!("get-everything".parse::<PeerCommand>().is_err());
        assert_eq!(
            "get-peers".parse::<DiscoveryCommand>(),
            Ok(DiscoveryCommand::GetPeers)
        );
    }

    #[tokio::test]
    async fn test_peer_console_answers_and_exits() {
        let peer = peer();
        peer.store_item(StoredItem {
            key: RingId::new(0x3dc0),
            name: "notes.txt".into(),
            bytes: b"abc".to_vec(),
        })
        .await;

        let input: &[u8] = b"get-id\n\nbogus\nget-files\nexit\nget-host\n";
        let mut output = Vec::new();
        let exit = run_peer_console(&peer, input, &mut output).await.unwrap();
        assert_eq!(exit, ConsoleExit::Requested);

        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("3dcf\n"));
        assert!(text.contains("Invalid command 'bogus'"));
        assert!(text.contains("\"name\": \"notes.txt\""));
        // nothing after exit is processed
        assert!(!text.contains("127.0.0.1:9001"));
    }

    #[tokio::test]
    async fn test_peer_console_reports_eof() {
        let peer = peer();
        let input: &[u8] = b"get-ft\n";
        let mut output = Vec::new();
        let exit = run_peer_console(&peer, input, &mut output).await.unwrap();
        assert_eq!(exit, ConsoleExit::InputClosed);
        assert!(String::from_utf8(output).unwrap().contains("Finger Table for"));
    }

    #[tokio::test]
    async fn test_discovery_console_lists_peers() {
        let processor = DiscoveryProcessor::new(Header::new("127.0.0.1:9000", "127.0.0.1"));
        processor
            .process(Message::new(
                Header::new("p", "127.0.0.1"),
                MessageBody::NetworkJoinNotification {
                    peer: Identifier::new("127.0.0.1:9001", RingId::new(7)),
                },
            ))
            .await
            .unwrap();

        let input: &[u8] = b"get-host\nget-peers\n";
        let mut output = Vec::new();
        run_discovery_console(&processor, input, &mut output)
            .await
            .unwrap();
        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("127.0.0.1:9000\n"));
        assert!(text.contains("hostname: \"127.0.0.1:9001\""));
    }
}
