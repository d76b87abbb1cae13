//! The streaming assembler.
//!
//! Generated output arrives as a JSON object in arbitrary fragments. The
//! assembler appends each fragment to its buffer and scans the new bytes for
//! *candidate boundaries*: offsets just after a closing string quote or a
//! closing `}`/`]`. A candidate is closed with the terminators the scan says
//! are still open and decoded with a trial parse; the newest candidate that
//! decodes wins. Every field whose value has become a complete string is then
//! emitted, once, in the order its key appears in the object.
//!
//! ```text
//! {"a": "int", "b": "st        <- buffer
//!             ^                <- newest candidate, closed as {"a": "int"}
//! ```

use std::collections::HashSet;

use serde_json::{Map, Value};
use tracing::{debug, trace, warn};

use crate::schema::FieldKey;

/// A field value ready for splicing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldEmission {
    pub key: FieldKey,
    pub value: String,
}

/// Lifecycle of one request's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblerState {
    /// Nothing received yet.
    Empty,
    /// Receiving; the last fragment completed no field.
    Accumulating,
    /// The last fragment completed at least one field.
    FieldComplete,
    /// The stream ended; remaining fields are being flushed.
    Draining,
    Done,
}

/// A field the schema expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingField {
    pub key: FieldKey,
    pub has_default: bool,
    pub complete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    end: usize,
    closers: String,
}

/// Incremental bracket/string scanner over the assembler's buffer.
#[derive(Debug, Clone, Default)]
struct Scanner {
    pos: usize,
    start: Option<usize>,
    in_string: bool,
    escaped: bool,
    stack: Vec<u8>,
}

impl Scanner {
    fn closers(&self) -> String {
        self.stack
            .iter()
            .rev()
            .map(|&b| if b == b'{' { '}' } else { ']' })
            .collect()
    }

    /// Scan `buffer` from the cursor to its end, collecting candidates.
    fn scan(&mut self, buffer: &str, out: &mut Vec<Candidate>) {
        let bytes = buffer.as_bytes();
        while self.pos < bytes.len() {
            let b = bytes[self.pos];
            self.pos += 1;

            if self.start.is_none() {
                if b == b'{' {
                    self.start = Some(self.pos - 1);
                    self.stack.push(b);
                }
                continue;
            }
            if self.stack.is_empty() {
                continue;
            }

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if b == b'\\' {
                    self.escaped = true;
                } else if b == b'"' {
                    self.in_string = false;
                    out.push(Candidate {
                        end: self.pos,
                        closers: self.closers(),
                    });
                }
                continue;
            }

            match b {
                b'"' => self.in_string = true,
                b'{' | b'[' => self.stack.push(b),
                b'}' | b']' => {
                    self.stack.pop();
                    out.push(Candidate {
                        end: self.pos,
                        closers: self.closers(),
                    });
                }
                _ => {}
            }
        }
    }
}

/// Turns a fragment stream into completed field values.
#[derive(Debug, Clone)]
pub struct StreamingAssembler {
    buffer: String,
    scanner: Scanner,
    candidates: Vec<Candidate>,
    tried: usize,
    fields: Vec<PendingField>,
    overwrite: bool,
    ignored: HashSet<String>,
    state: AssemblerState,
}

impl StreamingAssembler {
    /// Create an assembler for `fields`, each paired with whether the field
    /// has a default. With `overwrite`, an empty value completes a field that
    /// has a default.
    pub fn new(fields: impl IntoIterator<Item = (FieldKey, bool)>, overwrite: bool) -> Self {
        StreamingAssembler {
            buffer: String::new(),
            scanner: Scanner::default(),
            candidates: Vec::new(),
            tried: 0,
            fields: fields
                .into_iter()
                .map(|(key, has_default)| PendingField {
                    key,
                    has_default,
                    complete: false,
                })
                .collect(),
            overwrite,
            ignored: HashSet::new(),
            state: AssemblerState::Empty,
        }
    }

    pub fn state(&self) -> AssemblerState {
        self.state
    }

    /// Everything received so far.
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn fields(&self) -> &[PendingField] {
        &self.fields
    }

    /// Fields that have not been emitted.
    pub fn pending(&self) -> impl Iterator<Item = &FieldKey> {
        self.fields.iter().filter(|f| !f.complete).map(|f| &f.key)
    }

    /// Append a fragment and return the fields it completed.
    pub fn feed(&mut self, fragment: &str) -> Vec<FieldEmission> {
        if self.state == AssemblerState::Done {
            warn!("fragment received after the stream finished; ignoring");
            return Vec::new();
        }
        self.buffer.push_str(fragment);
        self.scanner.scan(&self.buffer, &mut self.candidates);

        let decoded = self.decode_newest();
        self.tried = self.candidates.len();

        let emitted = match decoded {
            Some(object) => self.collect(&object),
            None => Vec::new(),
        };
        self.state = if emitted.is_empty() {
            AssemblerState::Accumulating
        } else {
            AssemblerState::FieldComplete
        };
        emitted
    }

    /// End of stream: decode the whole buffer and flush remaining fields.
    pub fn finish(&mut self) -> Vec<FieldEmission> {
        if self.state == AssemblerState::Done {
            return Vec::new();
        }
        self.state = AssemblerState::Draining;

        let start = self.scanner.start.unwrap_or(self.buffer.len());
        let whole = self.buffer[start..].trim_end();
        let decoded = match serde_json::from_str::<Value>(whole) {
            Ok(Value::Object(object)) => Some(object),
            _ => {
                self.tried = 0;
                self.decode_newest()
            }
        };

        let emitted = match decoded {
            Some(object) => self.collect(&object),
            None => {
                if !self.buffer.trim().is_empty() {
                    warn!(len = self.buffer.len(), "generated output did not decode");
                }
                Vec::new()
            }
        };

        let missing: Vec<String> = self.pending().map(ToString::to_string).collect();
        if !missing.is_empty() {
            debug!(?missing, "fields left without a value");
        }
        self.state = AssemblerState::Done;
        emitted
    }

    /// Try untried candidates from the newest backwards.
    fn decode_newest(&self) -> Option<Map<String, Value>> {
        let start = self.scanner.start?;
        self.candidates[self.tried..].iter().rev().find_map(|c| {
            let mut text = String::with_capacity(c.end - start + c.closers.len());
            text.push_str(&self.buffer[start..c.end]);
            text.push_str(&c.closers);
            match serde_json::from_str::<Value>(&text).ok()? {
                Value::Object(object) => Some(object),
                _ => None,
            }
        })
    }

    fn collect(&mut self, object: &Map<String, Value>) -> Vec<FieldEmission> {
        let mut out = Vec::new();
        for (key, value) in object {
            match value {
                Value::Object(inner) if !self.is_flat_key(key) => {
                    for (name, value) in inner {
                        self.offer(FieldKey::grouped(key.as_str(), name.as_str()), value, &mut out);
                    }
                }
                _ => self.offer(FieldKey::flat(key.as_str()), value, &mut out),
            }
        }
        out
    }

    fn is_flat_key(&self, key: &str) -> bool {
        self.fields
            .iter()
            .any(|f| f.key.group.is_none() && f.key.name == key)
    }

    fn offer(&mut self, key: FieldKey, value: &Value, out: &mut Vec<FieldEmission>) {
        let Some(field) = self.fields.iter_mut().find(|f| f.key == key) else {
            if self.ignored.insert(key.to_string()) {
                warn!(%key, "ignoring unknown field");
            }
            return;
        };
        if field.complete {
            return;
        }
        let Value::String(text) = value else {
            return;
        };
        if text.is_empty() && !(field.has_default && self.overwrite) {
            return;
        }
        field.complete = true;
        trace!(%key, "field complete");
        out.push(FieldEmission {
            key,
            value: text.clone(),
        });
    }
}

// ============================================================================
// Tests
// ============================================================================
