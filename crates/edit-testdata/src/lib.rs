//! Helpers for generating, saving and loading edit traces. A trace is a sequence of upstream
//! array edits, interleaved with changes to the filter predicate and sort order of views built
//! on top of that array. Its used by the fuzzer and the benchmarks.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use flate2::bufread::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use rand::prelude::*;
use serde::{Deserialize, Serialize};

/// The orderings a trace can switch between.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "arg")]
pub enum OrderKey {
    Ascending,
    Descending,
    /// Sort by `value % n`. Produces lots of ties.
    Modulo(u32),
}

impl OrderKey {
    pub fn cmp(&self, a: &u32, b: &u32) -> std::cmp::Ordering {
        match self {
            OrderKey::Ascending => a.cmp(b),
            OrderKey::Descending => b.cmp(a),
            OrderKey::Modulo(n) => (a % n).cmp(&(b % n)),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TraceOp {
    Insert { value: u32, pos: usize },
    Remove { pos: usize },
    /// Only show items where `value % modulus == 0`.
    SetFilter { modulus: u32 },
    SetOrder { key: OrderKey },
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct EditTrace {
    #[serde(rename = "startContent")]
    pub start_content: Vec<u32>,
    #[serde(rename = "endContent")]
    pub end_content: Vec<u32>,

    pub ops: Vec<TraceOp>,
}

impl EditTrace {
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// The number of upstream edits in the trace (ignoring predicate and order switches).
    pub fn num_edits(&self) -> usize {
        self.ops.iter()
            .filter(|op| matches!(op, TraceOp::Insert { .. } | TraceOp::Remove { .. }))
            .count()
    }
}

/// Generate a random trace. The same seed always produces the same trace.
pub fn generate_trace(seed: u64, len: usize) -> EditTrace {
    let mut rng = SmallRng::seed_from_u64(seed);
    let start_content: Vec<u32> = (0..rng.gen_range(0..20))
        .map(|_| rng.gen_range(0..100))
        .collect();

    let mut content = start_content.clone();
    let mut ops = Vec::with_capacity(len);

    for _ in 0..len {
        let op = if rng.gen_bool(0.05) {
            TraceOp::SetFilter { modulus: rng.gen_range(1..5) }
        } else if rng.gen_bool(0.05) {
            let key = match rng.gen_range(0..3) {
                0 => OrderKey::Ascending,
                1 => OrderKey::Descending,
                _ => OrderKey::Modulo(rng.gen_range(2..8)),
            };
            TraceOp::SetOrder { key }
        } else {
            let insert_weight = if content.len() < 50 { 0.6 } else { 0.4 };
            if content.is_empty() || rng.gen_bool(insert_weight) {
                let pos = rng.gen_range(0..=content.len());
                let value = rng.gen_range(0..100);
                content.insert(pos, value);
                TraceOp::Insert { value, pos }
            } else {
                let pos = rng.gen_range(0..content.len());
                content.remove(pos);
                TraceOp::Remove { pos }
            }
        };
        ops.push(op);
    }

    EditTrace { start_content, end_content: content, ops }
}

fn is_gz(filename: &Path) -> bool {
    filename.extension().map_or(false, |ext| ext == "gz")
}

/// Load a trace from a JSON file. Files ending in `.gz` are decompressed first.
pub fn load_trace<P: AsRef<Path>>(filename: P) -> io::Result<EditTrace> {
    let filename = filename.as_ref();
    let reader = BufReader::new(File::open(filename)?);

    // Decompressing up front is much faster than handing the decoder to serde.
    let mut raw_json = vec![];
    if is_gz(filename) {
        GzDecoder::new(reader).read_to_end(&mut raw_json)?;
    } else {
        let mut reader = reader;
        reader.read_to_end(&mut raw_json)?;
    }

    Ok(serde_json::from_slice(&raw_json)?)
}

/// Save a trace as JSON. If the filename ends in `.gz` the file is gzipped.
pub fn save_trace<P: AsRef<Path>>(filename: P, trace: &EditTrace) -> io::Result<()> {
    let filename = filename.as_ref();
    let writer = BufWriter::new(File::create(filename)?);

    if is_gz(filename) {
        let mut encoder = GzEncoder::new(writer, Compression::default());
        serde_json::to_writer(&mut encoder, trace)?;
        encoder.finish()?.flush()?;
    } else {
        let mut writer = writer;
        serde_json::to_writer(&mut writer, trace)?;
        writer.flush()?;
    }
    Ok(())
}
