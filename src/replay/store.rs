//! Replay recording and reading
//!
//! A run is recorded through a `ReplayRecorder` (append-only, gap-free) and
//! sealed once by `finalize`. Sealed bytes are opened as a read-only `Replay`
//! with random access by tick.
//!
//! Byte layout (little-endian):
//! ```text
//! header   "XMRP" | version u8 | level str | player str | tick_rate u32
//!          | compressed u8 | record_size u16 | body_len u32 | stored_len u32
//! body     stored_len bytes (zlib when compressed):
//!          snapshot_count u32 | snapshots | event_count u32 | (tick u32, entity u32)*
//! trailer  "FIN!" | finished u8 | finish_time f32
//! ```
//! The header and trailer stay uncompressed so `ReplayInfo::probe` can read
//! them without expanding the body.

use serde::{Deserialize, Serialize};

use super::codec::{self, ByteReader, ByteWriter};
use super::snapshot::{RECORD_SIZE, Snapshot};
use crate::error::{ReplayError, Result};
use crate::persistence::Storage;

const MAGIC: &[u8; 4] = b"XMRP";
const TRAILER_MAGIC: &[u8; 4] = b"FIN!";
/// Current (and only readable) format version
pub const FORMAT_VERSION: u8 = 1;
const TRAILER_SIZE: usize = 4 + 1 + 4;

/// Identifier of a collectible/checkpoint entity in a level
pub type EntityId = u32;

/// Recording metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayHeader {
    pub level_id: String,
    pub player_id: String,
    /// Recorded samples per second of game time
    pub tick_rate: u32,
    pub compressed: bool,
}

/// A collectible taken during the run, at a replay-relative tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub tick: u64,
    pub entity: EntityId,
}

/// Terminal record written by `finalize`
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FinishRecord {
    pub finished: bool,
    /// Seconds; meaningful only when `finished`
    pub finish_time: f32,
}

/// Append-only recorder for one live run
#[derive(Debug)]
pub struct ReplayRecorder {
    header: ReplayHeader,
    snapshots: Vec<Snapshot>,
    events: Vec<ProgressEvent>,
    /// Scene tick of the first appended snapshot (replay tick 0)
    first_tick: Option<u64>,
    finish: Option<FinishRecord>,
}

impl ReplayRecorder {
    pub fn new(header: ReplayHeader) -> Self {
        Self {
            header,
            snapshots: Vec::with_capacity(1024),
            events: Vec::new(),
            first_tick: None,
            finish: None,
        }
    }

    pub fn header(&self) -> &ReplayHeader {
        &self.header
    }

    /// Append the snapshot for scene tick `tick`
    ///
    /// The first append fixes replay tick 0; every later tick must be exactly
    /// one past the previous one.
    pub fn append(&mut self, tick: u64, snapshot: Snapshot) -> Result<()> {
        if self.finish.is_some() {
            return Err(ReplayError::ReplayClosed);
        }
        if let Some(last) = self.last_tick() {
            let expected = last + 1;
            if tick != expected {
                return Err(ReplayError::OutOfOrder { expected, got: tick });
            }
        } else {
            self.first_tick = Some(tick);
        }
        self.snapshots.push(snapshot);
        Ok(())
    }

    /// Record a collectible taken at scene tick `tick`
    pub fn record_event(&mut self, tick: u64, entity: EntityId) -> Result<()> {
        if self.finish.is_some() {
            return Err(ReplayError::ReplayClosed);
        }
        let base = self.first_tick.unwrap_or(tick);
        self.events.push(ProgressEvent {
            tick: tick.saturating_sub(base),
            entity,
        });
        Ok(())
    }

    /// Write the terminal record and close the recording for writes
    pub fn finalize(&mut self, finished: bool, finish_time: f32) -> Result<()> {
        if self.finish.is_some() {
            return Err(ReplayError::AlreadyFinalized);
        }
        self.finish = Some(FinishRecord {
            finished,
            finish_time,
        });
        log::info!(
            "Replay of '{}' on '{}' finalized: {} ticks, {}",
            self.header.player_id,
            self.header.level_id,
            self.snapshots.len(),
            if finished {
                format!("finished in {:.2}s", finish_time)
            } else {
                "unfinished".to_string()
            }
        );
        Ok(())
    }

    pub fn is_finalized(&self) -> bool {
        self.finish.is_some()
    }

    /// Scene tick of the last appended snapshot
    pub fn last_tick(&self) -> Option<u64> {
        self.first_tick
            .map(|first| first + self.snapshots.len() as u64 - 1)
    }

    pub fn tick_count(&self) -> u64 {
        self.snapshots.len() as u64
    }

    /// Serialize a finalized recording
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let finish = self.finish.ok_or(ReplayError::NotFinalized)?;
        encode_replay(&self.header, &self.snapshots, &self.events, finish)
    }

    /// Turn a finalized recording into a readable replay without a byte round trip
    pub fn into_replay(self) -> Result<Replay> {
        let finish = self.finish.ok_or(ReplayError::NotFinalized)?;
        Replay::from_parts(self.header, self.snapshots, self.events, finish)
    }
}

/// Owner of at most one recording at a time
#[derive(Debug, Default)]
pub struct ReplayStore {
    active: Option<ReplayRecorder>,
}

impl ReplayStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a new empty recording bound to the given metadata
    pub fn start_recording(
        &mut self,
        level_id: &str,
        player_id: &str,
        tick_rate: u32,
        compressed: bool,
    ) -> Result<&mut ReplayRecorder> {
        if self.active.is_some() {
            return Err(ReplayError::AlreadyActive);
        }
        log::info!("Recording '{}' on level '{}'", player_id, level_id);
        let recorder = self.active.insert(ReplayRecorder::new(ReplayHeader {
            level_id: level_id.to_string(),
            player_id: player_id.to_string(),
            tick_rate,
            compressed,
        }));
        Ok(recorder)
    }

    /// True while a recording accepts snapshots
    pub fn is_recording(&self) -> bool {
        self.active.as_ref().is_some_and(|r| !r.is_finalized())
    }

    pub fn recorder(&self) -> Option<&ReplayRecorder> {
        self.active.as_ref()
    }

    fn active_mut(&mut self) -> Result<&mut ReplayRecorder> {
        self.active.as_mut().ok_or(ReplayError::NotRecording)
    }

    pub fn append_snapshot(&mut self, tick: u64, snapshot: Snapshot) -> Result<()> {
        self.active_mut()?.append(tick, snapshot)
    }

    pub fn record_event(&mut self, tick: u64, entity: EntityId) -> Result<()> {
        self.active_mut()?.record_event(tick, entity)
    }

    pub fn finalize(&mut self, finished: bool, finish_time: f32) -> Result<()> {
        self.active_mut()?.finalize(finished, finish_time)
    }

    /// Discard the current recording without finalizing
    pub fn abort(&mut self) {
        if let Some(recorder) = self.active.take() {
            log::info!(
                "Recording on '{}' discarded after {} ticks",
                recorder.header.level_id,
                recorder.tick_count()
            );
        }
    }

    /// Hand off a finalized recording, leaving the store idle
    pub fn take_finalized(&mut self) -> Result<ReplayRecorder> {
        match self.active.take() {
            Some(recorder) if recorder.is_finalized() => Ok(recorder),
            Some(recorder) => {
                self.active = Some(recorder);
                Err(ReplayError::NotFinalized)
            }
            None => Err(ReplayError::NotRecording),
        }
    }

    /// Write the finalized recording to `storage` under `name`
    ///
    /// Returns the number of bytes written. The store is idle afterwards.
    pub fn persist(&mut self, storage: &dyn Storage, name: &str) -> Result<usize> {
        let recorder = self.take_finalized()?;
        let bytes = recorder.to_bytes()?;
        storage.write_bytes(name, &bytes)?;
        log::info!("Replay saved as '{}' ({} bytes)", name, bytes.len());
        Ok(bytes.len())
    }
}

/// A sealed, read-only replay
#[derive(Debug, Clone)]
pub struct Replay {
    header: ReplayHeader,
    snapshots: Vec<Snapshot>,
    events: Vec<ProgressEvent>,
    finish: FinishRecord,
    terminal_tick: u64,
}

impl Replay {
    fn from_parts(
        header: ReplayHeader,
        snapshots: Vec<Snapshot>,
        mut events: Vec<ProgressEvent>,
        finish: FinishRecord,
    ) -> Result<Self> {
        if header.level_id.is_empty() {
            return Err(ReplayError::invalid("empty level id"));
        }
        if header.player_id.is_empty() {
            return Err(ReplayError::invalid("empty player id"));
        }
        if snapshots.is_empty() {
            return Err(ReplayError::invalid("replay has no snapshots"));
        }
        events.sort_by_key(|e| e.tick);

        let last = snapshots.len() as u64 - 1;
        let terminal_tick = snapshots
            .iter()
            .position(Snapshot::is_terminal)
            .map_or(last, |i| i as u64);

        Ok(Self {
            header,
            snapshots,
            events,
            finish,
            terminal_tick,
        })
    }

    /// Parse and validate a serialized replay
    pub fn open(bytes: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(bytes);
        let header = read_header(&mut r)?;
        let (body_len, stored_len) = read_body_lengths(&mut r)?;

        if r.remaining() < stored_len as usize + TRAILER_SIZE {
            return Err(ReplayError::invalid("truncated replay body"));
        }
        let stored = r.take(stored_len as usize)?;
        let finish = read_trailer(&mut r)?;
        if r.remaining() != 0 {
            return Err(ReplayError::invalid("trailing bytes after finish record"));
        }

        let body = if header.compressed {
            codec::decompress(stored, body_len as usize)?
        } else if body_len != stored_len {
            return Err(ReplayError::invalid("uncompressed body size mismatch"));
        } else {
            stored.to_vec()
        };

        let (snapshots, events) = decode_body(&body)?;
        if header.compressed {
            log::debug!(
                "Replay body {} -> {} bytes ({:.1}%)",
                body_len,
                stored_len,
                stored_len as f32 * 100.0 / body_len.max(1) as f32
            );
        }

        let replay = Self::from_parts(header, snapshots, events, finish)?;
        log::info!(
            "Opened replay of '{}' on '{}': {} ticks",
            replay.header.player_id,
            replay.header.level_id,
            replay.snapshots.len()
        );
        Ok(replay)
    }

    /// Serialize back to bytes, honouring the header's compression flag
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        encode_replay(&self.header, &self.snapshots, &self.events, self.finish)
    }

    /// Copy with a different compression setting
    pub fn with_compression(&self, compressed: bool) -> Self {
        let mut copy = self.clone();
        copy.header.compressed = compressed;
        copy
    }

    /// Exact recorded snapshot at `tick`; never extrapolates
    pub fn snapshot_at(&self, tick: u64) -> Result<&Snapshot> {
        self.snapshots
            .get(tick as usize)
            .ok_or(ReplayError::OutOfRange {
                tick,
                len: self.tick_count(),
            })
    }

    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    pub fn tick_count(&self) -> u64 {
        self.snapshots.len() as u64
    }

    /// First dead/finished tick, or the last recorded tick
    pub fn terminal_tick(&self) -> u64 {
        self.terminal_tick
    }

    pub fn header(&self) -> &ReplayHeader {
        &self.header
    }

    pub fn level_id(&self) -> &str {
        &self.header.level_id
    }

    pub fn player_id(&self) -> &str {
        &self.header.player_id
    }

    pub fn tick_rate(&self) -> u32 {
        self.header.tick_rate
    }

    pub fn is_compressed(&self) -> bool {
        self.header.compressed
    }

    pub fn is_finished(&self) -> bool {
        self.finish.finished
    }

    pub fn finish_time(&self) -> f32 {
        self.finish.finish_time
    }

    /// Collectibles taken during the run, in tick order
    pub fn events(&self) -> &[ProgressEvent] {
        &self.events
    }
}

/// Header and finish record of a replay, read without expanding the body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayInfo {
    pub header: ReplayHeader,
    pub finished: bool,
    /// None for unfinished runs
    pub finish_time: Option<f32>,
}

impl ReplayInfo {
    pub fn probe(bytes: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(bytes);
        let header = read_header(&mut r)?;
        if bytes.len() < r.position() + TRAILER_SIZE {
            return Err(ReplayError::invalid("missing finish record"));
        }
        let mut tail = ByteReader::new(&bytes[bytes.len() - TRAILER_SIZE..]);
        let finish = read_trailer(&mut tail)?;
        Ok(Self {
            header,
            finished: finish.finished,
            finish_time: finish.finished.then_some(finish.finish_time),
        })
    }
}

fn malformed(what: &str) -> impl FnOnce(crate::error::CodecError) -> ReplayError + '_ {
    move |e| ReplayError::invalid(format!("malformed {}: {}", what, e))
}

fn read_header(r: &mut ByteReader<'_>) -> Result<ReplayHeader> {
    let magic = r.take(4).map_err(malformed("header"))?;
    if magic != MAGIC {
        return Err(ReplayError::invalid("bad magic"));
    }
    let version = r.u8().map_err(malformed("header"))?;
    if version != FORMAT_VERSION {
        return Err(ReplayError::invalid(format!("unsupported version {}", version)));
    }
    let level_id = r.str().map_err(malformed("header"))?;
    let player_id = r.str().map_err(malformed("header"))?;
    let tick_rate = r.u32().map_err(malformed("header"))?;
    let compressed = r.bool().map_err(malformed("header"))?;
    let record_size = r.u16().map_err(malformed("header"))?;

    if level_id.is_empty() {
        return Err(ReplayError::invalid("empty level id"));
    }
    if player_id.is_empty() {
        return Err(ReplayError::invalid("empty player id"));
    }
    if tick_rate == 0 {
        return Err(ReplayError::invalid("zero tick rate"));
    }
    if record_size as usize != RECORD_SIZE {
        return Err(ReplayError::invalid(format!(
            "snapshot record size {} (expected {})",
            record_size, RECORD_SIZE
        )));
    }

    Ok(ReplayHeader {
        level_id,
        player_id,
        tick_rate,
        compressed,
    })
}

fn read_body_lengths(r: &mut ByteReader<'_>) -> Result<(u32, u32)> {
    let body_len = r.u32().map_err(malformed("header"))?;
    let stored_len = r.u32().map_err(malformed("header"))?;
    Ok((body_len, stored_len))
}

fn read_trailer(r: &mut ByteReader<'_>) -> Result<FinishRecord> {
    let magic = r.take(4).map_err(malformed("finish record"))?;
    if magic != TRAILER_MAGIC {
        return Err(ReplayError::invalid("missing finish record"));
    }
    let finished = r.bool().map_err(malformed("finish record"))?;
    let finish_time = r.f32().map_err(malformed("finish record"))?;
    Ok(FinishRecord {
        finished,
        finish_time,
    })
}

fn decode_body(body: &[u8]) -> Result<(Vec<Snapshot>, Vec<ProgressEvent>)> {
    let mut r = ByteReader::new(body);
    let count = r.u32().map_err(malformed("body"))? as usize;
    let span = count
        .checked_mul(RECORD_SIZE)
        .filter(|&n| n <= r.remaining())
        .ok_or_else(|| ReplayError::invalid("snapshot stream shorter than declared"))?;
    let snapshots = codec::decode_snapshots(r.take(span)?)?;

    let event_count = r.u32().map_err(malformed("body"))? as usize;
    let mut events = Vec::with_capacity(event_count.min(r.remaining() / 8));
    for _ in 0..event_count {
        let tick = r.u32().map_err(malformed("event list"))? as u64;
        let entity = r.u32().map_err(malformed("event list"))?;
        if tick >= count as u64 {
            return Err(ReplayError::invalid(format!("event at tick {} past end of stream", tick)));
        }
        events.push(ProgressEvent { tick, entity });
    }
    if r.remaining() != 0 {
        return Err(ReplayError::invalid("unexpected bytes after event list"));
    }
    Ok((snapshots, events))
}

fn encode_replay(
    header: &ReplayHeader,
    snapshots: &[Snapshot],
    events: &[ProgressEvent],
    finish: FinishRecord,
) -> Result<Vec<u8>> {
    let mut body = ByteWriter::with_capacity(8 + snapshots.len() * RECORD_SIZE + events.len() * 8);
    body.len_u32("snapshot count", snapshots.len())?;
    body.bytes(&codec::encode_snapshots(snapshots));
    body.len_u32("event count", events.len())?;
    for e in events {
        let tick = usize::try_from(e.tick).unwrap_or(usize::MAX);
        body.len_u32("event tick", tick)?;
        body.u32(e.entity);
    }
    let body = body.into_inner();
    let stored = if header.compressed {
        codec::compress(&body)?
    } else {
        body.clone()
    };

    let mut w = ByteWriter::with_capacity(stored.len() + 64);
    w.bytes(MAGIC);
    w.u8(FORMAT_VERSION);
    w.str(&header.level_id)?;
    w.str(&header.player_id)?;
    w.u32(header.tick_rate);
    w.bool(header.compressed);
    w.u16(RECORD_SIZE as u16);
    w.len_u32("body length", body.len())?;
    w.len_u32("stored body length", stored.len())?;
    w.bytes(&stored);
    w.bytes(TRAILER_MAGIC);
    w.bool(finish.finished);
    w.f32(finish.finish_time);
    Ok(w.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::TICKS_PER_SECOND;
    use crate::error::CodecError;
    use crate::persistence::MemoryStorage;
    use glam::Vec2;
    use proptest::prelude::*;

    fn moving(tick: u64) -> Snapshot {
        let mut s = Snapshot::at(Vec2::new(tick as f32 * 0.1, 2.0));
        s.velocity = Vec2::new(10.0, 0.0);
        s
    }

    fn record(ticks: u64, compressed: bool) -> ReplayRecorder {
        let mut store = ReplayStore::new();
        store
            .start_recording("L1", "alice", TICKS_PER_SECOND, compressed)
            .unwrap();
        for t in 0..ticks {
            store.append_snapshot(t, moving(t)).unwrap();
        }
        store.finalize(true, ticks as f32 / 100.0).unwrap();
        store.take_finalized().unwrap()
    }

    #[test]
    fn test_500_tick_run_reopens() {
        let bytes = record(500, true).to_bytes().unwrap();
        let replay = Replay::open(&bytes).unwrap();
        assert_eq!(replay.tick_count(), 500);
        assert!(replay.is_finished());
        assert_eq!(replay.finish_time(), 5.0);
        assert_eq!(replay.level_id(), "L1");
        assert_eq!(replay.player_id(), "alice");
        assert_eq!(*replay.snapshot_at(499).unwrap(), moving(499));
        assert!(matches!(
            replay.snapshot_at(500),
            Err(ReplayError::OutOfRange { tick: 500, len: 500 })
        ));
    }

    #[test]
    fn test_compression_does_not_change_content() {
        let packed = record(300, true).to_bytes().unwrap();
        let plain = record(300, false).to_bytes().unwrap();
        assert!(packed.len() < plain.len());
        let a = Replay::open(&packed).unwrap();
        let b = Replay::open(&plain).unwrap();
        assert_eq!(a.snapshots(), b.snapshots());
        assert!(a.is_compressed() && !b.is_compressed());
    }

    #[test]
    fn test_first_append_sets_origin() {
        let mut rec = ReplayRecorder::new(ReplayHeader {
            level_id: "L1".into(),
            player_id: "bob".into(),
            tick_rate: 100,
            compressed: false,
        });
        rec.append(40, moving(0)).unwrap();
        rec.append(41, moving(1)).unwrap();
        rec.record_event(41, 7).unwrap();
        assert_eq!(rec.last_tick(), Some(41));
        rec.finalize(false, 0.0).unwrap();
        let replay = rec.into_replay().unwrap();
        assert_eq!(replay.tick_count(), 2);
        assert_eq!(replay.events(), &[ProgressEvent { tick: 1, entity: 7 }]);
    }

    #[test]
    fn test_out_of_order_rejected() {
        let mut store = ReplayStore::new();
        store.start_recording("L1", "alice", 100, false).unwrap();
        store.append_snapshot(0, moving(0)).unwrap();
        assert!(matches!(
            store.append_snapshot(2, moving(2)),
            Err(ReplayError::OutOfOrder { expected: 1, got: 2 })
        ));
        assert!(matches!(
            store.append_snapshot(0, moving(0)),
            Err(ReplayError::OutOfOrder { expected: 1, got: 0 })
        ));
        store.append_snapshot(1, moving(1)).unwrap();
    }

    #[test]
    fn test_lifecycle_errors() {
        let mut store = ReplayStore::new();
        assert!(matches!(store.append_snapshot(0, moving(0)), Err(ReplayError::NotRecording)));
        store.start_recording("L1", "alice", 100, false).unwrap();
        assert!(matches!(
            store.start_recording("L1", "alice", 100, false),
            Err(ReplayError::AlreadyActive)
        ));
        store.append_snapshot(0, moving(0)).unwrap();
        assert!(matches!(store.take_finalized(), Err(ReplayError::NotFinalized)));
        assert!(store.is_recording());

        store.finalize(false, 0.0).unwrap();
        assert!(!store.is_recording());
        assert!(matches!(store.finalize(true, 1.0), Err(ReplayError::AlreadyFinalized)));
        assert!(matches!(store.append_snapshot(1, moving(1)), Err(ReplayError::ReplayClosed)));
        assert!(matches!(store.record_event(1, 3), Err(ReplayError::ReplayClosed)));

        store.abort();
        assert!(store.recorder().is_none());
        store.start_recording("L2", "alice", 100, false).unwrap();
    }

    #[test]
    fn test_unfinalized_cannot_serialize() {
        let mut rec = ReplayRecorder::new(ReplayHeader {
            level_id: "L1".into(),
            player_id: "bob".into(),
            tick_rate: 100,
            compressed: true,
        });
        rec.append(0, moving(0)).unwrap();
        assert!(matches!(rec.to_bytes(), Err(ReplayError::NotFinalized)));
    }

    #[test]
    fn test_persist_to_storage() {
        let storage = MemoryStorage::new();
        let mut store = ReplayStore::new();
        store.start_recording("L1", "alice", 100, true).unwrap();
        for t in 0..50 {
            store.append_snapshot(t, moving(t)).unwrap();
        }
        store.finalize(true, 0.5).unwrap();
        let written = store.persist(&storage, "alice-L1").unwrap();
        assert!(store.recorder().is_none());

        let bytes = storage.read_bytes("alice-L1").unwrap();
        assert_eq!(bytes.len(), written);
        assert_eq!(Replay::open(&bytes).unwrap().tick_count(), 50);
    }

    #[test]
    fn test_structural_errors() {
        let good = record(20, false).to_bytes().unwrap();
        let invalid = |bytes: &[u8]| matches!(Replay::open(bytes), Err(ReplayError::InvalidReplay { .. }));

        let mut bad_magic = good.clone();
        bad_magic[0] = b'Z';
        assert!(invalid(&bad_magic));

        let mut bad_version = good.clone();
        bad_version[4] = 9;
        assert!(invalid(&bad_version));

        assert!(invalid(&good[..good.len() - 1]));
        assert!(invalid(&good[..30]));
        assert!(invalid(&good[..3]));
        assert!(invalid(&[]));

        let mut extra = good.clone();
        extra.push(0);
        assert!(invalid(&extra));

        let mut no_trailer = good.clone();
        let n = no_trailer.len();
        no_trailer[n - TRAILER_SIZE] = b'X';
        assert!(invalid(&no_trailer));
    }

    #[test]
    fn test_empty_ids_and_stream_rejected() {
        let header = |level: &str, player: &str| ReplayHeader {
            level_id: level.into(),
            player_id: player.into(),
            tick_rate: 100,
            compressed: false,
        };
        let finish = FinishRecord::default();
        let snaps = [moving(0)];

        let bytes = encode_replay(&header("", "alice"), &snaps, &[], finish).unwrap();
        assert!(matches!(Replay::open(&bytes), Err(ReplayError::InvalidReplay { .. })));
        let bytes = encode_replay(&header("L1", ""), &snaps, &[], finish).unwrap();
        assert!(matches!(Replay::open(&bytes), Err(ReplayError::InvalidReplay { .. })));
        let bytes = encode_replay(&header("L1", "alice"), &[], &[], finish).unwrap();
        assert!(matches!(Replay::open(&bytes), Err(ReplayError::InvalidReplay { .. })));
    }

    #[test]
    fn test_non_finite_snapshot_rejected() {
        let header = ReplayHeader {
            level_id: "L1".into(),
            player_id: "alice".into(),
            tick_rate: 50,
            compressed: true,
        };
        let mut snaps: Vec<Snapshot> = (0..10).map(moving).collect();
        snaps[4].angle = f32::NEG_INFINITY;
        let bytes = encode_replay(&header, &snaps, &[], FinishRecord::default()).unwrap();
        assert!(matches!(
            Replay::open(&bytes),
            Err(ReplayError::Codec(CodecError::NonFinite { field: "angle" }))
        ));
    }

    #[test]
    fn test_huge_angle_replay_still_blends() {
        let mut store = ReplayStore::new();
        store.start_recording("L1", "alice", 50, false).unwrap();
        for t in 0..10 {
            let mut s = moving(t);
            s.angle = 1.0e30;
            store.append_snapshot(t, s).unwrap();
        }
        store.finalize(true, 0.2).unwrap();
        let bytes = store.take_finalized().unwrap().to_bytes().unwrap();
        let replay = std::sync::Arc::new(Replay::open(&bytes).unwrap());

        let mut playback = crate::replay::PlaybackController::new(replay);
        playback.advance(1);
        assert_eq!(playback.current_tick(), 0.5);
        let s = playback.current_snapshot();
        assert!(s.angle.is_finite());
        assert!((s.position.x - 0.05).abs() < 1e-5);
    }

    #[test]
    fn test_oversized_ids_fail_to_encode() {
        let header = ReplayHeader {
            level_id: "L1".into(),
            player_id: "x".repeat(70_000),
            tick_rate: 100,
            compressed: false,
        };
        let result = encode_replay(&header, &[moving(0)], &[], FinishRecord::default());
        assert!(matches!(
            result,
            Err(ReplayError::Codec(CodecError::TooLong { len: 70_000, .. }))
        ));

        let event = ProgressEvent {
            tick: u32::MAX as u64 + 1,
            entity: 1,
        };
        let header = ReplayHeader {
            player_id: "alice".into(),
            ..header
        };
        let result = encode_replay(&header, &[moving(0)], &[event], FinishRecord::default());
        assert!(matches!(
            result,
            Err(ReplayError::Codec(CodecError::TooLong { what: "event tick", .. }))
        ));
    }

    #[test]
    fn test_corrupt_compressed_body_is_codec_error() {
        let mut bytes = record(200, true).to_bytes().unwrap();
        // Clobber the middle of the zlib stream, keep framing intact
        let mid = bytes.len() / 2;
        for b in &mut bytes[mid..mid + 16] {
            *b = 0xA5;
        }
        match Replay::open(&bytes) {
            Err(ReplayError::Codec(CodecError::Decompress(_)))
            | Err(ReplayError::Codec(CodecError::LengthMismatch { .. }))
            | Err(ReplayError::InvalidReplay { .. }) => {}
            other => panic!("expected failure, got {:?}", other.map(|r| r.tick_count())),
        }
    }

    #[test]
    fn test_probe_reads_header_only() {
        let bytes = record(120, true).to_bytes().unwrap();
        let info = ReplayInfo::probe(&bytes).unwrap();
        assert_eq!(info.header.level_id, "L1");
        assert_eq!(info.header.player_id, "alice");
        assert!(info.header.compressed);
        assert_eq!(info.finish_time, Some(1.2));

        let mut rec = ReplayRecorder::new(info.header.clone());
        rec.append(0, moving(0)).unwrap();
        rec.finalize(false, 3.0).unwrap();
        let info = ReplayInfo::probe(&rec.to_bytes().unwrap()).unwrap();
        assert!(!info.finished);
        assert_eq!(info.finish_time, None);
    }

    #[test]
    fn test_terminal_tick() {
        let mut store = ReplayStore::new();
        store.start_recording("L1", "alice", 100, false).unwrap();
        for t in 0..10 {
            let mut s = moving(t);
            s.flags.dead = t >= 6;
            store.append_snapshot(t, s).unwrap();
        }
        store.finalize(false, 0.0).unwrap();
        let replay = store.take_finalized().unwrap().into_replay().unwrap();
        assert_eq!(replay.terminal_tick(), 6);
        assert_eq!(record(10, false).into_replay().unwrap().terminal_tick(), 9);
    }

    proptest! {
        #[test]
        fn prop_round_trip(
            xs in prop::collection::vec(-500.0f32..500.0, 1..80),
            compressed in any::<bool>(),
            events in prop::collection::vec((0u64..80, 0u32..20), 0..6),
        ) {
            let mut rec = ReplayRecorder::new(ReplayHeader {
                level_id: "prop".into(),
                player_id: "p".into(),
                tick_rate: 100,
                compressed,
            });
            for (t, x) in xs.iter().enumerate() {
                let mut s = Snapshot::at(Vec2::new(*x, -*x));
                s.angle = x.sin();
                rec.append(t as u64, s).unwrap();
            }
            let n = xs.len() as u64;
            for (tick, entity) in &events {
                rec.record_event(tick % n, *entity).unwrap();
            }
            rec.finalize(true, n as f32 / 100.0).unwrap();
            let bytes = rec.to_bytes().unwrap();
            let replay = Replay::open(&bytes).unwrap();

            prop_assert_eq!(replay.tick_count(), n);
            prop_assert_eq!(replay.level_id(), "prop");
            prop_assert_eq!(replay.player_id(), "p");
            prop_assert_eq!(replay.events().len(), events.len());
            let again = Replay::open(&replay.with_compression(!compressed).to_bytes().unwrap()).unwrap();
            for t in 0..n {
                prop_assert_eq!(replay.snapshot_at(t).unwrap(), again.snapshot_at(t).unwrap());
                let expected = Vec2::new(xs[t as usize], -xs[t as usize]);
                prop_assert_eq!(replay.snapshot_at(t).unwrap().position, expected);
            }
        }

        #[test]
        fn prop_gaps_are_rejected(start in 0u64..1000, skip in 2u64..50) {
            let mut rec = ReplayRecorder::new(ReplayHeader {
                level_id: "L".into(),
                player_id: "p".into(),
                tick_rate: 100,
                compressed: false,
            });
            rec.append(start, Snapshot::default()).unwrap();
            let is_out_of_order = matches!(
                rec.append(start + skip, Snapshot::default()),
                Err(ReplayError::OutOfOrder { .. })
            );
            prop_assert!(is_out_of_order);
            prop_assert_eq!(rec.tick_count(), 1);
        }
    }
}
