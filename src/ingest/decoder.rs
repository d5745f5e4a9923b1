//! Streaming decoder for GeoJSON feature collections.
//!
//! The document is walked with serde's token-driven visitor API instead of
//! being deserialized into a tree: the envelope visitor sees one top-level key
//! at a time, the designated array is consumed one element per iteration, and
//! every other member is skipped with [`IgnoredAny`]. Memory use is bounded by
//! the size of a single feature plus the read buffer.
//!
//! Any structural violation (wrong envelope, truncated input, a feature with
//! mistyped members, trailing garbage) aborts decoding. Records emitted before
//! the failure have already been handed to the sink.

use crate::ingest::channel::{ChannelClosed, RecordSink};
use crate::models::GeoFeature;
use flate2::read::GzDecoder;
use serde::Deserializer as _;
use serde::de::{self, DeserializeSeed, IgnoredAny, MapAccess, SeqAccess, Visitor};
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use thiserror::Error;

const PROGRESS_INTERVAL: u64 = 10_000;
const READ_BUFFER_BYTES: usize = 256 * 1024;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed feature collection at line {line}, column {column}: {message}")]
    Structural {
        line: usize,
        column: usize,
        message: String,
    },
    #[error("failed to read input: {0}")]
    Io(#[from] io::Error),
    #[error("record channel closed after {emitted} features")]
    ChannelClosed { emitted: u64 },
}

impl DecodeError {
    fn from_json(err: serde_json::Error) -> Self {
        if err.is_io() {
            let kind = err.io_error_kind().unwrap_or(io::ErrorKind::Other);
            return DecodeError::Io(io::Error::new(kind, err.to_string()));
        }
        DecodeError::Structural {
            line: err.line(),
            column: err.column(),
            message: err.to_string(),
        }
    }
}

/// Open an input file for streaming. `.gz` files are decompressed on the fly.
pub fn open_input(path: &Path) -> io::Result<Box<dyn BufRead + Send>> {
    let file = File::open(path)?;
    let gzipped = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false);

    if gzipped {
        log::debug!("reading gzip-compressed input {}", path.display());
        let decoder = GzDecoder::new(BufReader::with_capacity(READ_BUFFER_BYTES, file));
        Ok(Box::new(BufReader::with_capacity(READ_BUFFER_BYTES, decoder)))
    } else {
        Ok(Box::new(BufReader::with_capacity(READ_BUFFER_BYTES, file)))
    }
}

/// Decode the feature collection in `reader`, pushing every element of the
/// top-level `array_field` array into `sink`. Returns the number of records
/// emitted.
pub fn decode_features<R, S>(reader: R, array_field: &str, sink: &mut S) -> Result<u64, DecodeError>
where
    R: Read,
    S: RecordSink,
{
    let mut state = EmitState {
        sink,
        emitted: 0,
        closed: false,
    };

    let mut deserializer = serde_json::Deserializer::from_reader(reader);
    let result = (&mut deserializer)
        .deserialize_map(EnvelopeVisitor {
            array_field,
            state: &mut state,
        })
        .and_then(|()| deserializer.end());

    match result {
        Ok(()) => {
            log::debug!("decoder finished after {} features", state.emitted);
            Ok(state.emitted)
        }
        Err(_) if state.closed => Err(DecodeError::ChannelClosed {
            emitted: state.emitted,
        }),
        Err(err) => Err(DecodeError::from_json(err)),
    }
}

struct EmitState<'s, S> {
    sink: &'s mut S,
    emitted: u64,
    closed: bool,
}

impl<S: RecordSink> EmitState<'_, S> {
    fn emit(&mut self, feature: GeoFeature) -> Result<(), ChannelClosed> {
        if let Err(err) = self.sink.push(feature) {
            self.closed = true;
            return Err(err);
        }
        self.emitted += 1;
        if self.emitted % PROGRESS_INTERVAL == 0 {
            log::debug!("decoded {} features", self.emitted);
        }
        Ok(())
    }
}

struct EnvelopeVisitor<'a, 's, S> {
    array_field: &'a str,
    state: &'a mut EmitState<'s, S>,
}

impl<'de, S: RecordSink> Visitor<'de> for EnvelopeVisitor<'_, '_, S> {
    type Value = ();

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(
            formatter,
            "a JSON object containing a `{}` array",
            self.array_field
        )
    }

    fn visit_map<A>(self, mut map: A) -> Result<(), A::Error>
    where
        A: MapAccess<'de>,
    {
        let EnvelopeVisitor { array_field, state } = self;
        while let Some(key) = map.next_key::<String>()? {
            if key == array_field {
                map.next_value_seed(FeatureArray { state: &mut *state })?;
            } else {
                log::trace!("skipping top-level member `{}`", key);
                map.next_value::<IgnoredAny>()?;
            }
        }
        Ok(())
    }
}

struct FeatureArray<'a, 's, S> {
    state: &'a mut EmitState<'s, S>,
}

impl<'de, S: RecordSink> DeserializeSeed<'de> for FeatureArray<'_, '_, S> {
    type Value = ();

    fn deserialize<D>(self, deserializer: D) -> Result<(), D::Error>
    where
        D: de::Deserializer<'de>,
    {
        deserializer.deserialize_seq(self)
    }
}

impl<'de, S: RecordSink> Visitor<'de> for FeatureArray<'_, '_, S> {
    type Value = ();

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("an array of GeoJSON features")
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<(), A::Error>
    where
        A: SeqAccess<'de>,
    {
        let FeatureArray { state } = self;
        while let Some(feature) = seq.next_element::<GeoFeature>()? {
            state
                .emit(feature)
                .map_err(<A::Error as de::Error>::custom)?;
        }
        Ok(())
    }
}
