//! Named register bus shared by every actor of a run.
//!
//! Actors never hold references to each other; they bind to registers by
//! name during `init` and keep the returned [`ValueId`] handles. A name maps
//! to exactly one register for the lifetime of the bus.

use std::collections::BTreeMap;
use std::sync::mpsc::{self, Receiver, Sender};

use crate::error::{SimError, SimResult};

/// Opaque handle to a register on a [`SharedBus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(usize);

/// Linear transform applied to raw input samples: `raw * multiplier + offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scale {
    pub multiplier: f64,
    pub offset: f64,
}

impl Scale {
    /// Parses a scale cell of the form `*<multiplier>+<offset>`.
    ///
    /// Either part may be omitted (`*2`, `+10`), and the offset may be
    /// negative (`*1.5-3`).
    ///
    /// # Returns
    ///
    /// `None` if the text is not a valid scale expression.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let (multiplier, rest) = match text.strip_prefix('*') {
            Some(body) => {
                let bytes = body.as_bytes();
                // A sign at position 0 or after an exponent belongs to the multiplier.
                let split = (1..bytes.len())
                    .find(|&i| {
                        matches!(bytes[i], b'+' | b'-') && !matches!(bytes[i - 1], b'e' | b'E')
                    })
                    .unwrap_or(bytes.len());
                (body[..split].trim().parse().ok()?, &body[split..])
            }
            None => (1.0, text),
        };
        let offset = if rest.is_empty() {
            0.0
        } else if rest.starts_with(['+', '-']) {
            rest.trim().parse().ok()?
        } else {
            return None;
        };
        Some(Self { multiplier, offset })
    }

    fn apply(&self, raw: f64) -> f64 {
        raw * self.multiplier + self.offset
    }

    fn undo(&self, stored: f64) -> f64 {
        if self.multiplier == 0.0 {
            stored - self.offset
        } else {
            (stored - self.offset) / self.multiplier
        }
    }
}

/// Notification published to subscribers after a register changes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueChange {
    pub id: ValueId,
    pub old: f64,
    pub new: f64,
}

/// A named mutable double with an optional input scale.
#[derive(Debug)]
pub struct SharedValue {
    name: String,
    value: f64,
    scale: Option<Scale>,
    subscribers: Vec<Sender<ValueChange>>,
}

impl SharedValue {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            value: 0.0,
            scale: None,
            subscribers: Vec::new(),
        }
    }

    /// Register name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current logical value.
    pub fn value(&self) -> f64 {
        self.value
    }
}

/// Registry of named registers, sorted by name.
#[derive(Debug, Default)]
pub struct SharedBus {
    values: Vec<SharedValue>,
    index: BTreeMap<String, ValueId>,
}

impl SharedBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the handle for `name`, creating the register with value 0 on
    /// first reference.
    pub fn get_or_new(&mut self, name: &str) -> ValueId {
        if let Some(id) = self.index.get(name) {
            return *id;
        }
        let id = ValueId(self.values.len());
        self.values.push(SharedValue::new(name));
        self.index.insert(name.to_string(), id);
        id
    }

    /// Returns the handle for an existing register.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::UnknownRegister`] if `name` was never referenced.
    pub fn get_existing(&self, name: &str) -> SimResult<ValueId> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| SimError::UnknownRegister(name.to_string()))
    }

    /// Current value of a register.
    pub fn get(&self, id: ValueId) -> f64 {
        self.values[id.0].value
    }

    /// Current value of a register looked up by name, if it exists.
    pub fn value_of(&self, name: &str) -> Option<f64> {
        self.index.get(name).map(|id| self.get(*id))
    }

    /// Stores a logical value, notifying subscribers if it changed.
    pub fn set(&mut self, id: ValueId, value: f64) {
        let slot = &mut self.values[id.0];
        let old = slot.value;
        slot.value = value;
        // NaN never equals itself; treat NaN -> NaN as unchanged.
        let unchanged = old == value || (old.is_nan() && value.is_nan());
        if !unchanged && !slot.subscribers.is_empty() {
            let change = ValueChange { id, old, new: value };
            slot.subscribers.retain(|tx| tx.send(change).is_ok());
        }
    }

    /// Stores a value by name, creating the register if needed.
    pub fn set_by_name(&mut self, name: &str, value: f64) {
        let id = self.get_or_new(name);
        self.set(id, value);
    }

    /// Adds `delta` to a register.
    pub fn add(&mut self, id: ValueId, delta: f64) {
        let v = self.get(id);
        self.set(id, v + delta);
    }

    /// Stores a raw input sample, passing it through the register's scale.
    pub fn set_raw(&mut self, id: ValueId, raw: f64) {
        let value = match self.values[id.0].scale {
            Some(scale) => scale.apply(raw),
            None => raw,
        };
        self.set(id, value);
    }

    /// Replaces the scale of a register.
    ///
    /// The stored value is converted back to its raw form through the
    /// previous scale before the new one is applied, so a value is never
    /// scaled twice.
    pub fn set_scale(&mut self, id: ValueId, scale: Scale) {
        let slot = &self.values[id.0];
        let raw = match slot.scale {
            Some(previous) => previous.undo(slot.value),
            None => slot.value,
        };
        self.values[id.0].scale = Some(scale);
        self.set(id, scale.apply(raw));
    }

    /// Scale currently attached to a register.
    pub fn scale(&self, id: ValueId) -> Option<Scale> {
        self.values[id.0].scale
    }

    /// Name of a register.
    pub fn name(&self, id: ValueId) -> &str {
        &self.values[id.0].name
    }

    /// All register names in sorted order.
    pub fn all_names(&self) -> Vec<String> {
        self.index.keys().cloned().collect()
    }

    /// Expands glob patterns (`*`, `?`) into register names.
    ///
    /// Patterns are processed in order; matches of one pattern come out
    /// sorted and names already produced by an earlier pattern are dropped.
    /// A literal pattern with no wildcard creates its register if missing.
    pub fn match_globs<S: AsRef<str>>(&mut self, patterns: &[S]) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            if !pattern.contains(['*', '?']) {
                self.get_or_new(pattern);
                if !out.iter().any(|n| n == pattern) {
                    out.push(pattern.to_string());
                }
                continue;
            }
            for name in self.index.keys() {
                if glob_match(pattern, name) && !out.contains(name) {
                    out.push(name.clone());
                }
            }
        }
        out
    }

    /// Subscribes to changes of one register.
    ///
    /// Notifications are queued on the returned channel after each write
    /// completes; the receiver drains them at its own pace.
    pub fn subscribe(&mut self, id: ValueId) -> Receiver<ValueChange> {
        let (tx, rx) = mpsc::channel();
        self.values[id.0].subscribers.push(tx);
        rx
    }

    /// Number of registers.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Drops every register. Handles issued earlier become invalid.
    pub fn clear(&mut self) {
        self.values.clear();
        self.index.clear();
    }
}

/// Matches `name` against a glob supporting `*` (any run) and `?` (one char).
pub fn glob_match(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();
    let (mut pi, mut ni) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while ni < n.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == n[ni]) {
            pi += 1;
            ni += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ni));
            pi += 1;
        } else if let Some((sp, sn)) = star {
            pi = sp + 1;
            ni = sn + 1;
            star = Some((sp, sn + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}
