use condor_runtime::RuntimeVariable;

/// First handle handed out; 0 means "no children" on the wire.
const START_HANDLE: i64 = 1000;

/// What a variables reference points at.
#[derive(Debug, Clone, PartialEq)]
pub enum VariableContainer {
    Locals,
    Globals,
    Methods,
    /// A structured value (or a string exposing memory), snapshotted when it was listed
    Variable(RuntimeVariable),
}

/// Opaque integer references for the session. Handles are never recycled.
#[derive(Debug)]
pub struct Handles<T> {
    entries: Vec<T>,
}

impl<T> Default for Handles<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T: PartialEq> Handles<T> {
    pub fn create(&mut self, value: T) -> i64 {
        self.entries.push(value);
        START_HANDLE + self.entries.len() as i64 - 1
    }

    /// Reuse the handle of an equal value, creating one on first sight.
    pub fn lookup_or_create(&mut self, value: T) -> i64 {
        match self.entries.iter().position(|entry| *entry == value) {
            Some(index) => START_HANDLE + index as i64,
            None => self.create(value),
        }
    }

    pub fn get(&self, handle: i64) -> Option<&T> {
        let index = usize::try_from(handle.checked_sub(START_HANDLE)?).ok()?;
        self.entries.get(index)
    }

    pub fn get_mut(&mut self, handle: i64) -> Option<&mut T> {
        let index = usize::try_from(handle.checked_sub(START_HANDLE)?).ok()?;
        self.entries.get_mut(index)
    }
}
