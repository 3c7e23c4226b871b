//! Full-mesh TCP transport for ranks running as separate processes.
//!
//! Rank `r` listens on `peers[r]`, dials every lower rank and accepts every
//! higher rank. Each connection opens with a hello frame naming the dialling
//! rank. A reader thread per peer drains frames into a queue, so a rank that is
//! still writing never blocks a rank that has started reading.
//!
//! Frames are a big-endian `u32` length followed by a `serde_json` body.

use super::{CollectiveChannel, Envelope, Topology};
use crate::error::{IdSortError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc::{channel, Receiver};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const MAX_FRAME_LEN: usize = 512 * 1024 * 1024;
const RETRY_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Serialize, Deserialize)]
struct Hello {
    rank: usize,
    participant_count: usize,
}

struct Peer {
    writer: BufWriter<TcpStream>,
    inbox: Receiver<io::Result<Vec<u8>>>,
    reader: Option<JoinHandle<()>>,
}

pub struct TcpChannel {
    rank: usize,
    participant_count: usize,
    epoch: u64,
    /// Indexed by rank; `None` at our own index.
    peers: Vec<Option<Peer>>,
}

impl TcpChannel {
    /// Bind `peers[rank]` and build the mesh.
    pub fn connect(rank: usize, peers: &[SocketAddr], timeout: Duration) -> Result<Self> {
        let addr = peers.get(rank).ok_or_else(|| {
            IdSortError::Configuration(format!("rank {} has no listen address", rank))
        })?;
        let listener = TcpListener::bind(addr)
            .map_err(|e| IdSortError::Transport(format!("failed to bind {}: {}", addr, e)))?;
        Self::from_listener(rank, listener, peers, timeout)
    }

    /// Build the mesh on an already bound listener.
    pub fn from_listener(
        rank: usize,
        listener: TcpListener,
        peers: &[SocketAddr],
        timeout: Duration,
    ) -> Result<Self> {
        let participant_count = peers.len();
        if rank >= participant_count {
            return Err(IdSortError::Configuration(format!(
                "rank {} out of range for {} participants",
                rank, participant_count
            )));
        }

        let deadline = Instant::now() + timeout;
        let mut streams: Vec<Option<TcpStream>> = (0..participant_count).map(|_| None).collect();

        for (peer, addr) in peers.iter().enumerate().take(rank) {
            let mut stream = dial(*addr, deadline)?;
            let hello = serde_json::to_vec(&Hello { rank, participant_count })?;
            write_frame(&mut stream, &hello)?;
            stream.flush()?;
            log::debug!("rank {} connected to rank {} at {}", rank, peer, addr);
            streams[peer] = Some(stream);
        }

        listener.set_nonblocking(true)?;
        let mut pending = participant_count - rank - 1;
        while pending > 0 {
            match listener.accept() {
                Ok((mut stream, remote)) => {
                    stream.set_nonblocking(false)?;
                    stream.set_nodelay(true)?;
                    let hello: Hello = match read_frame(&mut stream)? {
                        Some(bytes) => serde_json::from_slice(&bytes)?,
                        None => {
                            return Err(IdSortError::Transport(format!(
                                "{} closed before saying hello",
                                remote
                            )))
                        }
                    };
                    validate_hello(rank, participant_count, &hello, &streams)?;
                    log::debug!("rank {} accepted rank {} from {}", rank, hello.rank, remote);
                    streams[hello.rank] = Some(stream);
                    pending -= 1;
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Err(IdSortError::Transport(format!(
                            "rank {} timed out waiting for {} higher ranks",
                            rank, pending
                        )));
                    }
                    thread::sleep(RETRY_INTERVAL);
                }
                Err(e) => return Err(e.into()),
            }
        }

        let mut mesh = Vec::with_capacity(participant_count);
        for (peer, stream) in streams.into_iter().enumerate() {
            match stream {
                Some(stream) => mesh.push(Some(spawn_peer(rank, peer, stream)?)),
                None => mesh.push(None),
            }
        }

        log::info!("rank {} joined a mesh of {} ranks", rank, participant_count);

        Ok(Self {
            rank,
            participant_count,
            epoch: 0,
            peers: mesh,
        })
    }
}

fn validate_hello(
    rank: usize,
    participant_count: usize,
    hello: &Hello,
    streams: &[Option<TcpStream>],
) -> Result<()> {
    if hello.participant_count != participant_count {
        return Err(IdSortError::Configuration(format!(
            "rank {} expects {} participants, we expect {}",
            hello.rank, hello.participant_count, participant_count
        )));
    }
    if hello.rank <= rank || hello.rank >= participant_count {
        return Err(IdSortError::Transport(format!(
            "unexpected hello from rank {} on rank {}",
            hello.rank, rank
        )));
    }
    if streams[hello.rank].is_some() {
        return Err(IdSortError::Transport(format!("rank {} connected twice", hello.rank)));
    }
    Ok(())
}

fn dial(addr: SocketAddr, deadline: Instant) -> Result<TcpStream> {
    loop {
        match TcpStream::connect(addr) {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(e) if Instant::now() < deadline => {
                log::trace!("connect to {} failed ({}), retrying", addr, e);
                thread::sleep(RETRY_INTERVAL);
            }
            Err(e) => {
                return Err(IdSortError::Transport(format!(
                    "could not reach {}: {}",
                    addr, e
                )))
            }
        }
    }
}

fn spawn_peer(rank: usize, peer: usize, stream: TcpStream) -> Result<Peer> {
    let read_half = stream.try_clone()?;
    let (tx, inbox) = channel();

    let reader = thread::Builder::new()
        .name(format!("rank{}-from{}", rank, peer))
        .spawn(move || {
            let mut reader = BufReader::new(read_half);
            loop {
                match read_frame(&mut reader) {
                    Ok(Some(frame)) => {
                        if tx.send(Ok(frame)).is_err() {
                            break;
                        }
                    }
                    // Clean close; dropping `tx` tells the receiver
                    Ok(None) => break,
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        break;
                    }
                }
            }
        })?;

    Ok(Peer {
        writer: BufWriter::new(stream),
        inbox,
        reader: Some(reader),
    })
}

pub(crate) fn write_frame<W: Write>(writer: &mut W, body: &[u8]) -> io::Result<()> {
    let len = u32::try_from(body.len())
        .map_err(|_| io::Error::new(ErrorKind::InvalidInput, "frame too large"))?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(body)
}

/// `Ok(None)` on a clean close between frames.
pub(crate) fn read_frame<R: Read>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            ErrorKind::InvalidData,
            format!("frame of {} bytes exceeds limit", len),
        ));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    Ok(Some(body))
}

impl Topology for TcpChannel {
    fn rank(&self) -> usize {
        self.rank
    }

    fn participant_count(&self) -> usize {
        self.participant_count
    }
}

impl<T> CollectiveChannel<T> for TcpChannel
where
    T: Clone + Serialize + DeserializeOwned,
{
    fn exchange(&mut self, local: &[T]) -> Result<Vec<Vec<T>>> {
        self.epoch += 1;
        let epoch = self.epoch;
        let rank = self.rank;

        let body = serde_json::to_vec(&Envelope {
            epoch,
            rank,
            payload: local.to_vec(),
        })?;

        for (peer, slot) in self.peers.iter_mut().enumerate() {
            if let Some(link) = slot {
                write_frame(&mut link.writer, &body)
                    .and_then(|_| link.writer.flush())
                    .map_err(|e| {
                        log::error!("rank {} failed writing to rank {}: {}", rank, peer, e);
                        IdSortError::PeerDisconnected { peer, epoch }
                    })?;
            }
        }

        // Decoded like every peer's copy, so all ranks hold identical values
        let own: Envelope<T> = serde_json::from_slice(&body)?;
        let mut own = Some(own.payload);

        let mut contributions = Vec::with_capacity(self.participant_count);
        for (peer, slot) in self.peers.iter().enumerate() {
            let Some(link) = slot else {
                contributions.push(own.take().unwrap_or_default());
                continue;
            };

            let frame = match link.inbox.recv() {
                Ok(Ok(frame)) => frame,
                Ok(Err(e)) => {
                    return Err(IdSortError::Transport(format!(
                        "reading from rank {} failed: {}",
                        peer, e
                    )))
                }
                Err(_) => return Err(IdSortError::PeerDisconnected { peer, epoch }),
            };

            let envelope: Envelope<T> = serde_json::from_slice(&frame)?;
            if envelope.epoch != epoch || envelope.rank != peer {
                return Err(IdSortError::CollectiveDesync {
                    rank,
                    reason: format!(
                        "expected exchange {} from rank {}, got exchange {} from rank {}",
                        epoch, peer, envelope.epoch, envelope.rank
                    ),
                });
            }
            contributions.push(envelope.payload);
        }

        Ok(contributions)
    }

    fn epoch(&self) -> u64 {
        self.epoch
    }
}

impl Drop for TcpChannel {
    fn drop(&mut self) {
        for link in self.peers.iter_mut().flatten() {
            let _ = link.writer.flush();
            let _ = link.writer.get_ref().shutdown(Shutdown::Both);
            if let Some(reader) = link.reader.take() {
                let _ = reader.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_frame_codec_reads_back_consecutive_frames() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"first").unwrap();
        write_frame(&mut buf, b"").unwrap();
        write_frame(&mut buf, b"third frame").unwrap();

        let mut cursor = Cursor::new(buf);
        assert_eq!(read_frame(&mut cursor).unwrap(), Some(b"first".to_vec()));
        assert_eq!(read_frame(&mut cursor).unwrap(), Some(Vec::new()));
        assert_eq!(read_frame(&mut cursor).unwrap(), Some(b"third frame".to_vec()));
        assert_eq!(read_frame(&mut cursor).unwrap(), None);
    }

    #[test]
    fn test_truncated_frame_is_an_error() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"abcdef").unwrap();
        buf.truncate(7);

        let mut cursor = Cursor::new(buf);
        assert!(read_frame(&mut cursor).is_err());
    }

    #[test]
    fn test_oversized_header_is_rejected() {
        let header = u32::MAX.to_be_bytes().to_vec();
        let mut cursor = Cursor::new(header);
        let err = read_frame(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn test_rank_outside_peer_list_is_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let result = TcpChannel::from_listener(1, listener, &[addr], Duration::from_millis(10));
        assert!(matches!(result, Err(IdSortError::Configuration(_))));
    }
}
