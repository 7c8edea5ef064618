//! Stdio message framing for the JSON-RPC transport.
//!
//! Clients disagree on stdio framing: some prefix each message with a
//! `Content-Length` header block, others write one JSON object per line.
//! The wire makes the two distinguishable from the first line alone — a
//! JSON object never starts with a header field name — so [`RequestReader`]
//! classifies each incoming message instead of being configured. Header
//! names are matched case-insensitively; byte counts are taken literally
//! (UTF-8 bytes, not characters). Responses always go out line-delimited.

use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// What the first line of an incoming message turned out to be.
enum FirstLine {
    /// A complete line-delimited JSON message
    Message(String),
    /// A `Content-Length` header declaring a framed body of this many bytes
    FramedBody(usize),
}

fn classify(line: &str) -> io::Result<FirstLine> {
    let Some((field, value)) = line.split_once(':') else {
        return Ok(FirstLine::Message(line.to_string()));
    };
    if !field.trim().eq_ignore_ascii_case("content-length") {
        // A JSON object also lands here ('{"id": ...' splits at its first
        // colon); either way the line is a message, not framing.
        return Ok(FirstLine::Message(line.to_string()));
    }
    let declared = value.trim().parse::<usize>().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unusable Content-Length value {:?}", value.trim()),
        )
    })?;
    Ok(FirstLine::FramedBody(declared))
}

/// Reads framed JSON-RPC messages from the transport, either framing style,
/// decided per message.
pub struct RequestReader<R> {
    input: BufReader<R>,
    scratch: String,
}

impl<R: AsyncRead + Unpin> RequestReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            input: BufReader::new(input),
            scratch: String::new(),
        }
    }

    /// Next message, or `None` once the peer closes the stream.
    ///
    /// # Errors
    ///
    /// Underlying I/O errors; `InvalidData` for an unusable
    /// `Content-Length` value or a non-UTF-8 body; `UnexpectedEof` when the
    /// stream ends inside a framed message.
    pub async fn next_message(&mut self) -> io::Result<Option<String>> {
        let Some(first) = self.next_line().await? else {
            return Ok(None);
        };
        match classify(&first)? {
            FirstLine::Message(json) => Ok(Some(json)),
            FirstLine::FramedBody(declared) => self.read_framed_body(declared).await.map(Some),
        }
    }

    /// Next non-blank trimmed line, or `None` at EOF.
    async fn next_line(&mut self) -> io::Result<Option<String>> {
        loop {
            self.scratch.clear();
            if self.input.read_line(&mut self.scratch).await? == 0 {
                return Ok(None);
            }
            let line = self.scratch.trim();
            if !line.is_empty() {
                return Ok(Some(line.to_string()));
            }
        }
    }

    /// Consume the rest of a header block and its body.
    async fn read_framed_body(&mut self, declared: usize) -> io::Result<String> {
        // Remaining headers are uninteresting; drain until the blank
        // separator. `read_line` returning 0 here means the client died
        // mid-frame.
        loop {
            self.scratch.clear();
            if self.input.read_line(&mut self.scratch).await? == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "stream ended inside a message header block",
                ));
            }
            if self.scratch.trim().is_empty() {
                break;
            }
        }

        let mut body = vec![0u8; declared];
        self.input.read_exact(&mut body).await?;
        String::from_utf8(body)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

/// Write one JSON message, line-delimited, and flush.
///
/// `json` must not contain embedded newlines; serialized `serde_json`
/// values never do.
pub async fn write_message<W: AsyncWrite + Unpin>(writer: &mut W, json: &str) -> io::Result<()> {
    let mut frame = String::with_capacity(json.len() + 1);
    frame.push_str(json);
    frame.push('\n');
    writer.write_all(frame.as_bytes()).await?;
    writer.flush().await
}
