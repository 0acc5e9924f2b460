use codepane_core::Mode;

/// Host-owned copy of the editor buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentModel {
    text: String,
    mode: Mode,
    revision: u64,
}

impl ContentModel {
    pub fn new(text: impl Into<String>, mode: Mode) -> Self {
        ContentModel {
            text: text.into(),
            mode,
            revision: 0,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Replace the buffer. Returns whether the text actually changed.
    pub fn set_text(&mut self, text: impl Into<String>) -> bool {
        let text = text.into();
        if text == self.text {
            return false;
        }
        self.text = text;
        self.revision += 1;
        true
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Mode) -> bool {
        if mode == self.mode {
            return false;
        }
        self.mode = mode;
        self.revision += 1;
        true
    }

    /// Bumped on every effective change to text or mode.
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revision_tracks_effective_changes_only() {
        let mut model = ContentModel::new("{}", Mode::Json);
        assert_eq!(model.revision(), 0);
        assert!(!model.set_text("{}"));
        assert_eq!(model.revision(), 0);
        assert!(model.set_text("{\"a\":1}"));
        assert!(model.set_mode(Mode::Plain));
        assert!(!model.set_mode(Mode::Plain));
        assert_eq!(model.revision(), 2);
        assert_eq!(model.text(), "{\"a\":1}");
        assert_eq!(model.mode(), Mode::Plain);
    }
}
