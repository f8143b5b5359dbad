//! Block sources.
//!
//! The index loop pulls blocks one at a time from a [`BlockSource`]. Blocks
//! must arrive in ascending order with their events in stream order.

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};

use salesindex_core::error::IndexerError;
use salesindex_core::types::{Block, EventFilter};

/// Trait for pulling filtered blocks from a stream.
#[async_trait]
pub trait BlockSource: Send {
    /// Next block, or `None` once the stream is exhausted.
    async fn next_block(&mut self) -> Result<Option<Block>, IndexerError>;
}

// ─── JsonLinesSource ─────────────────────────────────────────────────────────

type BoxedReader = Box<dyn AsyncRead + Unpin + Send>;

/// Replays a newline-delimited JSON stream, one [`Block`] per line.
///
/// ```text
/// {"header":{"number":1,"hash":"0x1","timestamp":1700000000},"events":[...]}
/// ```
pub struct JsonLinesSource {
    lines: Lines<BufReader<BoxedReader>>,
    line_no: usize,
    filter: Option<EventFilter>,
}

impl JsonLinesSource {
    /// Open a file, or stdin when `location` is `"-"`.
    pub async fn open(location: &str) -> Result<Self, IndexerError> {
        let reader: BoxedReader = if location == "-" {
            Box::new(tokio::io::stdin())
        } else {
            let file = tokio::fs::File::open(location)
                .await
                .map_err(|e| IndexerError::Stream(format!("cannot open {location}: {e}")))?;
            Box::new(file)
        };
        Ok(Self::from_reader(reader))
    }

    pub fn from_reader(reader: impl AsyncRead + Unpin + Send + 'static) -> Self {
        let boxed: BoxedReader = Box::new(reader);
        Self {
            lines: BufReader::new(boxed).lines(),
            line_no: 0,
            filter: None,
        }
    }

    /// Drop blocks before `filter.from_block` and events the filter does not match.
    pub fn with_filter(mut self, filter: EventFilter) -> Self {
        self.filter = Some(filter);
        self
    }
}

#[async_trait]
impl BlockSource for JsonLinesSource {
    async fn next_block(&mut self) -> Result<Option<Block>, IndexerError> {
        loop {
            let Some(line) = self
                .lines
                .next_line()
                .await
                .map_err(|e| IndexerError::Stream(e.to_string()))?
            else {
                return Ok(None);
            };
            self.line_no += 1;

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let mut block: Block = serde_json::from_str(line).map_err(|e| {
                IndexerError::Stream(format!("line {}: invalid block: {e}", self.line_no))
            })?;

            if let Some(filter) = &self.filter {
                if block.header.number < filter.from_block {
                    continue;
                }
                block.events.retain(|event| filter.matches(event));
            }
            return Ok(Some(block));
        }
    }
}

// ─── VecSource ───────────────────────────────────────────────────────────────

/// In-memory source over a fixed list of blocks.
#[derive(Debug, Default)]
pub struct VecSource {
    blocks: VecDeque<Block>,
}

impl VecSource {
    pub fn new(blocks: impl IntoIterator<Item = Block>) -> Self {
        Self {
            blocks: blocks.into_iter().collect(),
        }
    }
}

#[async_trait]
impl BlockSource for VecSource {
    async fn next_block(&mut self) -> Result<Option<Block>, IndexerError> {
        Ok(self.blocks.pop_front())
    }
}
