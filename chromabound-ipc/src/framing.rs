//! Length-prefixed frame encoding.
//!
//! Provides reliable message boundaries over stream transports (pipes,
//! in-process cursors). Every frame is a little-endian `u32` body length
//! followed by the body: one kind byte, then a fixed integer payload. Node
//! bodies are the tag byte plus `n + 2` unsigned words
//! `(color[0..n), tot_colors, next)`; graph bodies are `n` followed by the
//! `n·n` packed adjacency bytes; bound bodies are a single unsigned word.

use std::io::{BufReader, BufWriter, Read, Write};

use chromabound_core::{Graph, GraphError, NodeError, SearchNode};
use thiserror::Error;

use crate::messages::{Frame, Tag};

/// Maximum frame body size (16 MB) to prevent memory exhaustion. Large
/// enough for the packed adjacency of the biggest accepted graph.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

const KIND_GRAPH: u8 = 1;
const KIND_NODE: u8 = 2;
const KIND_BOUND: u8 = 3;
const KIND_BARRIER: u8 = 4;
const KIND_RELEASE: u8 = 5;

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FrameError {
    /// Underlying stream failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended cleanly between frames.
    #[error("end of stream")]
    EndOfStream,

    /// A frame body exceeds [`MAX_FRAME_SIZE`].
    #[error("frame too large: {size} bytes (max {max} bytes)")]
    FrameTooLarge {
        /// Advertised body size.
        size: usize,
        /// The allowed maximum.
        max: usize,
    },

    /// The body cannot be decoded as any frame kind.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// A node body violates the structural coloring invariants.
    #[error("invalid node payload: {0}")]
    Node(#[from] NodeError),

    /// A graph body does not encode a valid relation.
    #[error("invalid graph payload: {0}")]
    Graph(#[from] GraphError),
}

fn encode_body(frame: &Frame) -> Vec<u8> {
    match frame {
        Frame::Graph(graph) => {
            let cells = graph.to_packed();
            let mut body = Vec::with_capacity(5 + cells.len());
            body.push(KIND_GRAPH);
            body.extend_from_slice(&(graph.size() as u32).to_le_bytes());
            body.extend_from_slice(&cells);
            body
        }
        Frame::Node(tag, node) => {
            let mut body = Vec::with_capacity(2 + (node.vertex_count() + 2) * 4);
            body.push(KIND_NODE);
            body.push(tag.to_wire());
            for &color in node.colors() {
                body.extend_from_slice(&color.to_le_bytes());
            }
            body.extend_from_slice(&node.tot_colors().to_le_bytes());
            body.extend_from_slice(&node.next().to_le_bytes());
            body
        }
        Frame::Bound(value) => {
            let mut body = Vec::with_capacity(5);
            body.push(KIND_BOUND);
            body.extend_from_slice(&value.to_le_bytes());
            body
        }
        Frame::Barrier => vec![KIND_BARRIER],
        Frame::Release => vec![KIND_RELEASE],
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn decode_body(body: &[u8]) -> Result<Frame, FrameError> {
    let (&kind, rest) = body
        .split_first()
        .ok_or_else(|| FrameError::InvalidFrame("empty body".to_string()))?;
    match kind {
        KIND_GRAPH => {
            if rest.len() < 4 {
                return Err(FrameError::InvalidFrame("truncated graph header".to_string()));
            }
            let n = read_u32(rest) as usize;
            let graph = Graph::from_packed(n, &rest[4..])?;
            Ok(Frame::Graph(graph))
        }
        KIND_NODE => {
            let (&tag_byte, words) = rest
                .split_first()
                .ok_or_else(|| FrameError::InvalidFrame("missing node tag".to_string()))?;
            let tag = Tag::from_wire(tag_byte)
                .ok_or_else(|| FrameError::InvalidFrame(format!("unknown tag {tag_byte}")))?;
            if words.len() % 4 != 0 || words.len() < 8 {
                return Err(FrameError::InvalidFrame(format!(
                    "node payload of {} bytes is not {{colors.., tot, next}}",
                    words.len()
                )));
            }
            let n = words.len() / 4 - 2;
            let colors: Vec<u32> = words[..n * 4].chunks_exact(4).map(read_u32).collect();
            let tot_colors = read_u32(&words[n * 4..]);
            let next = read_u32(&words[n * 4 + 4..]);
            let node = SearchNode::from_parts(colors, tot_colors, next)?;
            Ok(Frame::Node(tag, node))
        }
        KIND_BOUND => {
            if rest.len() != 4 {
                return Err(FrameError::InvalidFrame("bound payload must be one word".to_string()));
            }
            Ok(Frame::Bound(read_u32(rest)))
        }
        KIND_BARRIER => Ok(Frame::Barrier),
        KIND_RELEASE => Ok(Frame::Release),
        other => Err(FrameError::InvalidFrame(format!("unknown kind {other}"))),
    }
}

/// Write one frame with a length prefix and flush.
///
/// Every frame is flushed eagerly: the peers are live processes blocking on
/// these messages, not batch consumers.
pub fn write_frame<W: Write>(writer: &mut BufWriter<W>, frame: &Frame) -> Result<(), FrameError> {
    let body = encode_body(frame);
    if body.len() > MAX_FRAME_SIZE {
        return Err(FrameError::FrameTooLarge {
            size: body.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    writer.write_all(&(body.len() as u32).to_le_bytes())?;
    writer.write_all(&body)?;
    writer.flush()?;
    Ok(())
}

/// Read one length-prefixed frame.
pub fn read_frame<R: Read>(reader: &mut BufReader<R>) -> Result<Frame, FrameError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(FrameError::EndOfStream);
        }
        Err(e) => return Err(FrameError::Io(e)),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(FrameError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }
    if len == 0 {
        return Err(FrameError::InvalidFrame("zero-length frame".to_string()));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    decode_body(&body)
}

/// Frame writer wrapper for convenient message sending.
#[derive(Debug)]
pub struct FrameWriter<W: Write> {
    writer: BufWriter<W>,
}

impl<W: Write> FrameWriter<W> {
    /// Create a new frame writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::with_capacity(64 * 1024, writer),
        }
    }

    /// Write one frame and flush it.
    pub fn write(&mut self, frame: &Frame) -> Result<(), FrameError> {
        write_frame(&mut self.writer, frame)
    }
}

/// Frame reader wrapper for convenient message receiving.
#[derive(Debug)]
pub struct FrameReader<R: Read> {
    reader: BufReader<R>,
}

impl<R: Read> FrameReader<R> {
    /// Create a new frame reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::with_capacity(64 * 1024, reader),
        }
    }

    /// Read one frame.
    pub fn read(&mut self) -> Result<Frame, FrameError> {
        read_frame(&mut self.reader)
    }

    /// Whether bytes are already buffered.
    ///
    /// A readiness poll on the underlying descriptor cannot see these, so
    /// multiplexing readers must check this before polling.
    pub fn has_buffered_data(&self) -> bool {
        !self.reader.buffer().is_empty()
    }
}
