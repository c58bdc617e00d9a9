use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::source::SourceDocument;

/// Lines starting with this marker push a breakpoint to the next line.
pub const SKIP_DOWN_MARKER: char = '+';
/// Lines starting with this marker pull a breakpoint to the previous line.
pub const SKIP_UP_MARKER: char = '-';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    pub id: i64,
    /// 0-based line in the document
    pub line: usize,
    pub verified: bool,
}

/// Source breakpoints for every file, keyed by normalized path.
#[derive(Debug)]
pub struct BreakpointTable {
    next_id: i64,
    by_path: HashMap<String, Vec<Breakpoint>>,
}

impl Default for BreakpointTable {
    fn default() -> Self {
        Self {
            next_id: 1,
            by_path: HashMap::new(),
        }
    }
}

impl BreakpointTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an unverified breakpoint; ids are never reused.
    pub fn add(&mut self, path: &str, line: usize) -> Breakpoint {
        let bp = Breakpoint {
            id: self.next_id,
            line,
            verified: false,
        };
        self.next_id += 1;
        self.by_path
            .entry(path.to_string())
            .or_default()
            .push(bp.clone());
        bp
    }

    /// Remove the first breakpoint on `line`.
    pub fn remove(&mut self, path: &str, line: usize) -> Option<Breakpoint> {
        let bps = self.by_path.get_mut(path)?;
        let index = bps.iter().position(|bp| bp.line == line)?;
        Some(bps.remove(index))
    }

    pub fn clear(&mut self, path: &str) {
        self.by_path.remove(path);
    }

    pub fn get(&self, path: &str) -> &[Breakpoint] {
        self.by_path.get(path).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn find(&self, path: &str, id: i64) -> Option<&Breakpoint> {
        self.get(path).iter().find(|bp| bp.id == id)
    }

    /// Breakpoint on `line`, verified on the spot if it was not yet.
    ///
    /// Returns the breakpoint and whether this call verified it.
    pub fn hit(&mut self, path: &str, line: usize) -> Option<(Breakpoint, bool)> {
        let bp = self
            .by_path
            .get_mut(path)?
            .iter_mut()
            .find(|bp| bp.line == line)?;
        let newly = !bp.verified;
        bp.verified = true;
        Some((bp.clone(), newly))
    }

    /// Verify the unverified breakpoints of `path` against `doc`, shifting off blank and marker
    /// lines. Already verified and out-of-range breakpoints are left alone.
    ///
    /// Returns the breakpoints verified by this call.
    pub fn verify(&mut self, path: &str, doc: &SourceDocument) -> Vec<Breakpoint> {
        let Some(bps) = self.by_path.get_mut(path) else {
            return Vec::new();
        };
        let last = doc.len().saturating_sub(1);
        let mut verified = Vec::new();
        for bp in bps.iter_mut().filter(|bp| !bp.verified) {
            let Ok(text) = doc.line(bp.line) else {
                continue;
            };
            if text.is_empty() || text.starts_with(SKIP_DOWN_MARKER) {
                bp.line = (bp.line + 1).min(last);
            } else if text.starts_with(SKIP_UP_MARKER) {
                bp.line = bp.line.saturating_sub(1);
            }
            bp.verified = true;
            verified.push(bp.clone());
        }
        verified
    }
}

/// Access recorded for a data breakpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessType {
    Read,
    Write,
    ReadWrite,
}

impl AccessType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "read" => Some(Self::Read),
            "write" => Some(Self::Write),
            "readWrite" | "read write" => Some(Self::ReadWrite),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::ReadWrite => "read write",
        }
    }
}

/// Data breakpoints keyed by data id; different access kinds on one id merge.
#[derive(Debug, Default)]
pub struct DataBreakpoints {
    by_id: BTreeMap<String, AccessType>,
}

impl DataBreakpoints {
    pub fn set(&mut self, data_id: &str, access: AccessType) {
        let merged = match self.by_id.get(data_id) {
            Some(existing) if *existing != access => AccessType::ReadWrite,
            _ => access,
        };
        self.by_id.insert(data_id.to_string(), merged);
    }

    pub fn get(&self, data_id: &str) -> Option<AccessType> {
        self.by_id.get(data_id).copied()
    }

    pub fn clear(&mut self) {
        self.by_id.clear();
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Instruction breakpoint addresses.
pub type InstructionBreakpoints = BTreeSet<i64>;
