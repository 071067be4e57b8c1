//! Purpose: Ordered range reads delivered as a bounded stream of typed events.
//! Exports: `ReadOptions`, `ReadEvent`, `ReadStream`.
//! Role: Bridges the blocking cursor walk onto async consumers.
//! Invariants: Records arrive in strict key order (descending when reversed).
//! Invariants: A stream yields at most one terminal event (`End` or `Error`), then nothing.
//! Invariants: The producer stops at its next step once the stream is dropped or cancelled.
#![allow(clippy::result_large_err)]

use super::client::ApiResult;
use super::store::Store;
use crate::core::cursor::{Cursor, Direction};
use crate::core::error::{Error, ErrorKind};
use crate::core::key::Key;
use crate::core::range::{EncodedRange, RangeOptions, build_range};
use crate::core::record::Record;
use crate::core::table::{Table, read_record};
use indexmap::IndexMap;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Sleep;
use tokio_stream::{Stream, StreamExt};

#[derive(Clone, Debug, Default)]
pub struct ReadOptions {
    pub range: RangeOptions,
    /// Stop after this many records; `Some(0)` ends immediately.
    pub limit: Option<usize>,
    pub reverse: bool,
    /// Longest wait for any single event before the stream fails with `Timeout`.
    pub timeout: Option<Duration>,
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gt(mut self, key: impl Into<Key>) -> Self {
        self.range.gt = Some(key.into());
        self
    }

    pub fn gte(mut self, key: impl Into<Key>) -> Self {
        self.range.gte = Some(key.into());
        self
    }

    pub fn lt(mut self, key: impl Into<Key>) -> Self {
        self.range.lt = Some(key.into());
        self
    }

    pub fn lte(mut self, key: impl Into<Key>) -> Self {
        self.range.lte = Some(key.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn direction(&self) -> Direction {
        if self.reverse {
            Direction::PrevUnique
        } else {
            Direction::Next
        }
    }
}

#[derive(Debug)]
pub enum ReadEvent {
    Data(Record),
    Error(Error),
    End,
}

impl ReadEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReadEvent::Data(_))
    }
}

pub struct ReadStream {
    rx: mpsc::Receiver<ReadEvent>,
    finished: bool,
    timeout: Option<Duration>,
    deadline: Option<Pin<Box<Sleep>>>,
}

impl ReadStream {
    fn new(rx: mpsc::Receiver<ReadEvent>, timeout: Option<Duration>) -> Self {
        Self {
            rx,
            finished: false,
            timeout,
            deadline: None,
        }
    }

    pub async fn next_event(&mut self) -> Option<ReadEvent> {
        self.next().await
    }

    /// Stop the read. The producer notices at its next step; no further events are yielded.
    pub fn cancel(&mut self) {
        self.finish();
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn finish(&mut self) {
        self.finished = true;
        self.deadline = None;
        self.rx.close();
    }
}

impl Stream for ReadStream {
    type Item = ReadEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<ReadEvent>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(event)) => {
                if event.is_terminal() {
                    this.finish();
                } else {
                    this.deadline = None;
                }
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => {
                this.finish();
                Poll::Ready(Some(ReadEvent::Error(
                    Error::new(ErrorKind::Internal)
                        .with_message("read worker stopped before the end of the range"),
                )))
            }
            Poll::Pending => {
                let Some(timeout) = this.timeout else {
                    return Poll::Pending;
                };
                let deadline = this
                    .deadline
                    .get_or_insert_with(|| Box::pin(tokio::time::sleep(timeout)));
                if deadline.as_mut().poll(cx).is_pending() {
                    return Poll::Pending;
                }
                this.finish();
                Poll::Ready(Some(ReadEvent::Error(
                    Error::new(ErrorKind::Timeout)
                        .with_message("read timed out")
                        .with_hint("Raise the read timeout or narrow the range."),
                )))
            }
        }
    }
}

impl std::fmt::Debug for ReadStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadStream")
            .field("finished", &self.finished)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Store {
    /// Start an ordered read over `options.range`.
    ///
    /// Returns before scanning begins; records follow on the stream as the cursor advances.
    /// Must be called from within a tokio runtime.
    pub fn read(&self, options: ReadOptions) -> ApiResult<ReadStream> {
        let range = build_range(&options.range);
        let encoded = EncodedRange::from_range(range.as_ref())?;
        let (tx, rx) = mpsc::channel(self.inner.options.read_capacity());
        let stream = ReadStream::new(rx, options.timeout);

        let empty = range.as_ref().is_some_and(|range| range.is_empty());
        if empty || options.limit == Some(0) {
            tracing::debug!(store = %self.inner.name, "read covers nothing");
            let _ = tx.try_send(ReadEvent::End);
            return Ok(stream);
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("read requires a tokio runtime")
                .with_source(err)
        })?;
        tracing::debug!(store = %self.inner.name, op = "read", reverse = options.reverse, limit = ?options.limit, "store op");
        let store = self.clone();
        let direction = options.direction();
        let limit = options.limit;
        runtime.spawn_blocking(move || {
            match run_scan(&store.inner.table, encoded, direction, limit, &tx) {
                Ok(true) => {
                    let _ = tx.blocking_send(ReadEvent::End);
                }
                Ok(false) => {
                    tracing::debug!(store = %store.inner.name, "read abandoned by consumer");
                }
                Err(err) => {
                    store.report("read", &err);
                    let _ = tx.blocking_send(ReadEvent::Error(err));
                }
            }
        });
        Ok(stream)
    }

    /// Collect a read into a map in cursor order.
    pub async fn read_all(&self, options: ReadOptions) -> ApiResult<IndexMap<Key, Value>> {
        let mut stream = self.read(options)?;
        let mut records = IndexMap::new();
        while let Some(event) = stream.next_event().await {
            match event {
                ReadEvent::Data(record) => {
                    records.insert(record.key, record.value);
                }
                ReadEvent::Error(err) => return Err(err),
                ReadEvent::End => break,
            }
        }
        Ok(records)
    }
}

/// Walk the cursor, sending one `Data` per key. `Ok(false)` when the consumer went away.
fn run_scan(
    table: &Table,
    range: EncodedRange,
    direction: Direction,
    limit: Option<usize>,
    tx: &mpsc::Sender<ReadEvent>,
) -> Result<bool, Error> {
    let records = table.read()?;
    let mut cursor = Cursor::new(range, direction);
    let mut sent = 0usize;
    while limit.is_none_or(|limit| sent < limit) {
        if tx.is_closed() {
            return Ok(false);
        }
        let Some(key) = cursor.advance(&records)? else {
            break;
        };
        let Some(record) = read_record(&records, &key)? else {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message("cursor position has no record")
                .with_path(table.path()));
        };
        if tx.blocking_send(ReadEvent::Data(record)).is_err() {
            return Ok(false);
        }
        sent += 1;
    }
    Ok(true)
}
