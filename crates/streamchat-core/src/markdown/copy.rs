use super::CodeBlock;
use crate::clipboard::Clipboard;
use crate::error::ClipboardError;

/// Copy control attached to a rendered code block.
///
/// Starts out as "Copy" and switches to "Copied!" after a successful
/// click. There is no timed reset; the state lives as long as the view
/// keeps the button around.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyButton {
    copied: bool,
}

impl CopyButton {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_copied(&self) -> bool {
        self.copied
    }

    pub fn label(&self) -> &'static str {
        if self.copied {
            "Copied!"
        } else {
            "Copy"
        }
    }

    /// Write the literal code of `block` to `clipboard`.
    ///
    /// The label only changes when the write succeeds.
    pub fn click(
        &mut self,
        block: &CodeBlock,
        clipboard: &mut dyn Clipboard,
    ) -> Result<(), ClipboardError> {
        clipboard.write_text(&block.code)?;
        self.copied = true;
        Ok(())
    }
}
