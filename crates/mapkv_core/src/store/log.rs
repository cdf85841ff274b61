//! The append-only record log inside a data file.
//!
//! The log owns the backend region and the materialized index. It knows
//! nothing about locking, listeners or other processes; the store drives it.
//!
//! ## Replay
//!
//! Frames are replayed from the end of the header up to `actual_size`. The
//! first frame that fails its checksum, decryption or decoding ends the
//! log: everything from there on is dropped, zeroed and the header is
//! rewritten. A header with a bad checksum is recovered by scanning frames
//! until the first invalid one.

use crate::config::Config;
use crate::crypto::{EncryptionKey, RecordCipher};
use crate::error::{CoreError, CoreResult};
use crate::header::{Header, HeaderState, HEADER_SIZE};
use mapkv_codec::{decode_record, encode_frame, encode_record, FrameReader, Record, Value};
use mapkv_storage::StorageBackend;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Smallest capacity a data file is given.
pub(crate) const MIN_CAPACITY: u64 = 256;

const ZERO_CHUNK: usize = 4096;

/// An indexed value and the size of the frame that holds it.
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub(crate) value: Value,
    pub(crate) encoded_len: u64,
}

/// What happened while loading a data file.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LoadReport {
    /// Records replayed.
    pub(crate) records: usize,
    /// A damaged tail or header was repaired.
    pub(crate) recovered: bool,
    /// The header was written (new file, repair or encryption adopted).
    pub(crate) rewritten: bool,
}

/// Result of a single append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Appended {
    /// Frame size.
    pub(crate) bytes: u64,
    /// The log was compacted to make room.
    pub(crate) compacted: bool,
}

pub(crate) struct Log {
    label: String,
    backend: Box<dyn StorageBackend>,
    cipher: Option<RecordCipher>,
    header: Header,
    index: HashMap<String, Entry>,
    live_bytes: u64,
    config: Config,
}

impl Log {
    /// Loads the log in `backend`, initializing a blank region.
    pub(crate) fn open(
        label: &str,
        mut backend: Box<dyn StorageBackend>,
        key: Option<&EncryptionKey>,
        config: Config,
    ) -> CoreResult<(Self, LoadReport)> {
        let initial = config.initial_capacity.max(MIN_CAPACITY);
        if !backend.is_read_only() && backend.capacity() < initial {
            backend.resize(initial)?;
        }

        let mut log = Self {
            label: label.to_string(),
            backend,
            cipher: None,
            header: Header::default(),
            index: HashMap::new(),
            live_bytes: 0,
            config,
        };
        let report = log.load(key)?;
        Ok((log, report))
    }

    /// Remaps the backend and loads it from scratch.
    ///
    /// The current index is kept if loading fails.
    pub(crate) fn reopen(&mut self, key: Option<&EncryptionKey>) -> CoreResult<LoadReport> {
        self.backend.reload()?;
        self.load(key)
    }

    fn load(&mut self, key: Option<&EncryptionKey>) -> CoreResult<LoadReport> {
        let read_only = self.backend.is_read_only();
        let (mut header, claimed) = match Header::decode(self.backend.as_slice())? {
            HeaderState::Blank => {
                let cipher = match key {
                    Some(key) if !read_only => Some(RecordCipher::new(key)?),
                    _ => None,
                };
                let header = Header::new(cipher.as_ref());
                if !read_only {
                    self.write_header(&header)?;
                }
                self.commit(header, cipher, Vec::new());
                return Ok(LoadReport {
                    records: 0,
                    recovered: false,
                    rewritten: !read_only,
                });
            }
            HeaderState::Valid(header) => (header, Some(header.actual_size)),
            HeaderState::Damaged(header) => {
                warn!(store = %self.label, "data header checksum mismatch, scanning frames");
                (header, None)
            }
        };

        let mut cipher = cipher_for(&header, key)?;
        let log_capacity = self.log_capacity();
        let limit = claimed.map_or(log_capacity, |size| size.min(log_capacity));
        let scan = scan(self.log_slice(0, limit), cipher.as_ref());
        let end = scan.end as u64;

        let mut adopted = false;
        if let (false, Some(key)) = (header.is_encrypted(), key) {
            if end > 0 {
                return Err(CoreError::KeyMismatch);
            }
            if !read_only {
                cipher = Some(RecordCipher::new(key)?);
                header = Header::new(cipher.as_ref());
                adopted = true;
            }
        }

        let recovered = claimed != Some(end);
        if recovered {
            match &scan.error {
                Some(error) => warn!(
                    store = %self.label,
                    claimed = ?claimed,
                    recovered = end,
                    %error,
                    "dropping damaged log tail"
                ),
                None => warn!(
                    store = %self.label,
                    claimed = ?claimed,
                    recovered = end,
                    "log is shorter than its header claims"
                ),
            }
        }

        header.actual_size = end;
        let rewritten = !read_only && (recovered || adopted);
        if rewritten {
            if recovered {
                self.zero_log(end, limit)?;
            }
            self.write_header(&header)?;
        }

        let records = scan.records.len();
        self.commit(header, cipher, scan.records);
        Ok(LoadReport {
            records,
            recovered,
            rewritten,
        })
    }

    /// Replays frames appended by another process since the last load.
    ///
    /// Fails if the file was rewritten underneath; the caller then falls
    /// back to [`Log::reopen`].
    pub(crate) fn catch_up(&mut self) -> CoreResult<usize> {
        let mut header = self.peek_header()?;
        if HEADER_SIZE as u64 + header.actual_size > self.backend.capacity() {
            self.backend.reload()?;
            header = self.peek_header()?;
        }
        if header.flags != self.header.flags || header.salt != self.header.salt {
            return Err(CoreError::corrupt_record("data file was rewritten"));
        }
        if header.actual_size < self.header.actual_size {
            return Err(CoreError::corrupt_record("log shrank without a rewrite"));
        }
        if header.actual_size == self.header.actual_size {
            return Ok(0);
        }

        let start = self.header.actual_size;
        let scan = scan(
            self.log_slice(start, header.actual_size),
            self.cipher.as_ref(),
        );
        if let Some(error) = scan.error {
            return Err(error);
        }
        if start + scan.end as u64 != header.actual_size {
            return Err(CoreError::corrupt_record("log ends before its header claims"));
        }

        let records = scan.records.len();
        for (record, len) in scan.records {
            self.apply(record.key, record.value, len);
        }
        self.header = header;
        Ok(records)
    }

    fn peek_header(&self) -> CoreResult<Header> {
        match Header::decode(self.backend.as_slice())? {
            HeaderState::Valid(header) => Ok(header),
            _ => Err(CoreError::corrupt_record("data header is not valid")),
        }
    }

    /// Appends a value, or a tombstone when `value` is `None`.
    pub(crate) fn append(&mut self, key: &str, value: Option<&Value>) -> CoreResult<Appended> {
        let frame = seal_frame(self.cipher.as_ref(), key, value)?;
        let bytes = frame.len() as u64;
        let compacted = self.ensure_room(bytes)?;

        let offset = HEADER_SIZE as u64 + self.header.actual_size;
        self.backend.write_at(offset, &frame)?;
        if self.config.sync_on_write {
            self.backend.flush_range(offset, frame.len())?;
        }

        let mut header = self.header;
        header.actual_size += bytes;
        self.write_header(&header)?;
        self.header = header;

        self.apply(key.to_string(), value.cloned(), bytes);
        Ok(Appended { bytes, compacted })
    }

    /// Makes room for `len` more bytes, compacting or growing the file.
    fn ensure_room(&mut self, len: u64) -> CoreResult<bool> {
        let capacity = self.backend.capacity();
        let needed = HEADER_SIZE as u64 + self.header.actual_size + len;
        if needed <= capacity {
            return Ok(false);
        }

        let mut compacted = false;
        let mut needed = needed;
        if self.config.auto_compact && HEADER_SIZE as u64 + self.live_bytes + len <= capacity / 2 {
            debug!(
                store = %self.label,
                actual_size = self.header.actual_size,
                live_bytes = self.live_bytes,
                "compacting log instead of growing"
            );
            self.compact(false)?;
            compacted = true;
            needed = HEADER_SIZE as u64 + self.header.actual_size + len;
        }

        let capacity = self.backend.capacity();
        if needed > capacity {
            let mut new_capacity = capacity.max(MIN_CAPACITY);
            while new_capacity < needed {
                new_capacity = new_capacity
                    .checked_mul(2)
                    .ok_or_else(|| CoreError::corrupt_record("data file size overflow"))?;
            }
            debug!(
                store = %self.label,
                from = capacity,
                to = new_capacity,
                "growing data file"
            );
            self.backend.resize(new_capacity)?;
        }
        Ok(compacted)
    }

    /// Rewrites live entries into a fresh image.
    ///
    /// With `shrink`, the file shrinks to the smallest power of two that
    /// holds the image (never below the initial capacity); otherwise the
    /// capacity is kept.
    pub(crate) fn compact(&mut self, shrink: bool) -> CoreResult<()> {
        let image = build_image(&self.index, self.cipher.as_ref())?;
        let capacity = if shrink {
            self.fitted_capacity(image.len())
        } else {
            self.backend.capacity().max(image.len() as u64)
        };
        self.backend.replace(&image, capacity)?;
        self.rebuild()
    }

    /// Returns true if a shrinking compaction would change nothing.
    pub(crate) fn is_compact(&self) -> bool {
        let image_len = HEADER_SIZE + self.live_bytes as usize;
        self.header.actual_size == self.live_bytes
            && self.backend.capacity() == self.fitted_capacity(image_len)
    }

    /// Rewrites the log under `key`, or in plaintext when `None`.
    ///
    /// The new image goes to a temp file first; on failure the original
    /// file and cipher are untouched.
    pub(crate) fn re_key(&mut self, key: Option<&EncryptionKey>) -> CoreResult<()> {
        let cipher = key.map(RecordCipher::new).transpose()?;
        let image = build_image(&self.index, cipher.as_ref())?;
        let capacity = self
            .backend
            .capacity()
            .max(self.fitted_capacity(image.len()));
        self.backend.replace(&image, capacity)?;
        self.cipher = cipher;
        self.rebuild()
    }

    /// Empties the log and shrinks the file to its initial size.
    ///
    /// Returns the keys that were present, sorted.
    pub(crate) fn clear(&mut self) -> CoreResult<Vec<String>> {
        let header = Header::new(self.cipher.as_ref());
        let capacity = self.config.initial_capacity.max(MIN_CAPACITY);
        self.backend.replace(&header.encode(), capacity)?;

        let keys = self.keys();
        let cipher = self.cipher.take();
        self.commit(header, cipher, Vec::new());
        Ok(keys)
    }

    /// Rebuilds the index from the current image.
    fn rebuild(&mut self) -> CoreResult<()> {
        let header = self.peek_header()?;
        let limit = header.actual_size.min(self.log_capacity());
        let scan = scan(self.log_slice(0, limit), self.cipher.as_ref());
        if let Some(error) = scan.error {
            return Err(error);
        }
        let cipher = self.cipher.take();
        self.commit(header, cipher, scan.records);
        Ok(())
    }

    fn commit(
        &mut self,
        header: Header,
        cipher: Option<RecordCipher>,
        records: Vec<(Record, u64)>,
    ) {
        self.header = header;
        self.cipher = cipher;
        self.index.clear();
        self.live_bytes = 0;
        for (record, len) in records {
            self.apply(record.key, record.value, len);
        }
    }

    fn apply(&mut self, key: String, value: Option<Value>, encoded_len: u64) {
        let previous = match value {
            Some(value) => {
                self.live_bytes += encoded_len;
                self.index.insert(key, Entry { value, encoded_len })
            }
            None => self.index.remove(&key),
        };
        if let Some(previous) = previous {
            self.live_bytes -= previous.encoded_len;
        }
    }

    fn write_header(&mut self, header: &Header) -> CoreResult<()> {
        self.backend.write_at(0, &header.encode())?;
        if self.config.sync_on_write {
            self.backend.flush_range(0, HEADER_SIZE)?;
        }
        Ok(())
    }

    fn zero_log(&mut self, from: u64, to: u64) -> CoreResult<()> {
        let zeroes = [0u8; ZERO_CHUNK];
        let mut offset = from;
        while offset < to {
            let len = ((to - offset) as usize).min(ZERO_CHUNK);
            self.backend
                .write_at(HEADER_SIZE as u64 + offset, &zeroes[..len])?;
            offset += len as u64;
        }
        Ok(())
    }

    fn log_capacity(&self) -> u64 {
        self.backend.capacity().saturating_sub(HEADER_SIZE as u64)
    }

    fn log_slice(&self, start: u64, end: u64) -> &[u8] {
        let data = self.backend.as_slice();
        let start = (HEADER_SIZE as u64 + start).min(data.len() as u64) as usize;
        let end = (HEADER_SIZE as u64 + end).min(data.len() as u64) as usize;
        &data[start..end.max(start)]
    }

    fn fitted_capacity(&self, image_len: usize) -> u64 {
        (image_len as u64)
            .next_power_of_two()
            .max(self.config.initial_capacity.max(MIN_CAPACITY))
    }

    /// Drops spare index capacity.
    pub(crate) fn clear_memory_cache(&mut self) {
        self.index.shrink_to_fit();
    }

    /// Flushes the whole region to disk.
    pub(crate) fn sync(&mut self) -> CoreResult<()> {
        Ok(self.backend.sync()?)
    }

    pub(crate) fn get(&self, key: &str) -> Option<&Value> {
        self.index.get(key).map(|entry| &entry.value)
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Returns all live keys, sorted.
    pub(crate) fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.index.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub(crate) fn len(&self) -> usize {
        self.index.len()
    }

    pub(crate) fn actual_size(&self) -> u64 {
        self.header.actual_size
    }

    pub(crate) fn total_size(&self) -> u64 {
        self.backend.capacity()
    }

    pub(crate) fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }
}

impl std::fmt::Debug for Log {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Log")
            .field("label", &self.label)
            .field("actual_size", &self.header.actual_size)
            .field("capacity", &self.backend.capacity())
            .field("keys", &self.index.len())
            .field("encrypted", &self.cipher.is_some())
            .finish()
    }
}

fn cipher_for(header: &Header, key: Option<&EncryptionKey>) -> CoreResult<Option<RecordCipher>> {
    match (header.is_encrypted(), key) {
        (false, _) => Ok(None),
        (true, None) => Err(CoreError::KeyMismatch),
        (true, Some(key)) => {
            let cipher = RecordCipher::with_salt(key, header.salt)?;
            if !cipher.verifies(&header.key_check) {
                return Err(CoreError::KeyMismatch);
            }
            Ok(Some(cipher))
        }
    }
}

fn seal_frame(
    cipher: Option<&RecordCipher>,
    key: &str,
    value: Option<&Value>,
) -> CoreResult<Vec<u8>> {
    let body = encode_record(key, value)?;
    let frame = match cipher {
        Some(cipher) => encode_frame(&cipher.seal(&body)?)?,
        None => encode_frame(&body)?,
    };
    Ok(frame)
}

fn open_frame(cipher: Option<&RecordCipher>, body: &[u8]) -> CoreResult<Record> {
    let record = match cipher {
        Some(cipher) => decode_record(&cipher.open(body)?)?,
        None => decode_record(body)?,
    };
    Ok(record)
}

fn build_image(
    index: &HashMap<String, Entry>,
    cipher: Option<&RecordCipher>,
) -> CoreResult<Vec<u8>> {
    let mut keys: Vec<&String> = index.keys().collect();
    keys.sort();

    let mut frames = Vec::new();
    for key in keys {
        frames.extend(seal_frame(cipher, key, Some(&index[key].value))?);
    }

    let mut header = Header::new(cipher);
    header.actual_size = frames.len() as u64;
    let mut image = Vec::with_capacity(HEADER_SIZE + frames.len());
    image.extend_from_slice(&header.encode());
    image.extend(frames);
    Ok(image)
}

struct Scan {
    records: Vec<(Record, u64)>,
    end: usize,
    error: Option<CoreError>,
}

/// Decodes frames until the end of `log` or the first bad one.
fn scan(log: &[u8], cipher: Option<&RecordCipher>) -> Scan {
    let mut records = Vec::new();
    let mut end = 0;
    let mut error = None;

    for frame in FrameReader::new(log) {
        let decoded = frame
            .map_err(CoreError::from)
            .and_then(|frame| Ok((open_frame(cipher, frame.body)?, frame)));
        match decoded {
            Ok((record, frame)) => {
                end = frame.offset + frame.encoded_len();
                records.push((record, frame.encoded_len() as u64));
            }
            Err(e) => {
                error = Some(e);
                break;
            }
        }
    }

    Scan {
        records,
        end,
        error,
    }
}
