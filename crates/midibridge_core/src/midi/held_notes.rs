use arrayvec::ArrayVec;

/// Notes currently down or held by the sustain pedal, oldest first.
///
/// A note appears at most once; pressing it again moves it to the top.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeldNoteStack {
    notes: ArrayVec<u8, 128>,
}

impl HeldNoteStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, note: u8) {
        let note = note.min(127);
        self.remove(note);
        // at most 128 distinct notes, so this never overflows
        let _ = self.notes.try_push(note);
    }

    /// Returns whether the note was held.
    pub fn remove(&mut self, note: u8) -> bool {
        match self.notes.iter().position(|&n| n == note) {
            Some(idx) => {
                self.notes.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, note: u8) -> bool {
        self.notes.contains(&note)
    }

    /// Most recently pressed note.
    pub fn last(&self) -> Option<u8> {
        self.notes.last().copied()
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.notes
    }

    pub fn clear(&mut self) {
        self.notes.clear();
    }
}
