//! Append-only WGSL text buffer with a declare-once registry

use std::collections::HashSet;

/// Append-only buffer for shader source
///
/// Text can only be appended. Declarations keyed through [`declare_once`]
/// are emitted the first time the key is seen and skipped afterwards.
///
/// [`declare_once`]: WgslBuilder::declare_once
#[derive(Debug, Default)]
pub struct WgslBuilder {
    code: String,
    indent: usize,
    declared: HashSet<String>,
}

impl WgslBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one line at the current indentation
    pub fn line(&mut self, text: impl AsRef<str>) -> &mut Self {
        let text = text.as_ref();
        if !text.is_empty() {
            for _ in 0..self.indent {
                self.code.push_str("  ");
            }
            self.code.push_str(text);
        }
        self.code.push('\n');
        self
    }

    /// Append formatted text on one line
    pub fn line_fmt(&mut self, args: std::fmt::Arguments<'_>) -> &mut Self {
        self.line(args.to_string())
    }

    /// Append raw text verbatim, without indentation
    pub fn raw(&mut self, text: &str) -> &mut Self {
        self.code.push_str(text);
        if !text.is_empty() && !text.ends_with('\n') {
            self.code.push('\n');
        }
        self
    }

    /// Open a block: append `header {` and indent
    pub fn open(&mut self, header: impl AsRef<str>) -> &mut Self {
        self.line(format!("{} {{", header.as_ref()));
        self.indent += 1;
        self
    }

    /// Close the innermost block
    pub fn close(&mut self) -> &mut Self {
        self.indent = self.indent.saturating_sub(1);
        self.line("}")
    }

    /// Run `emit` only if `key` has not been declared yet
    ///
    /// Returns true if the declaration was emitted.
    pub fn declare_once(&mut self, key: &str, emit: impl FnOnce(&mut Self)) -> bool {
        if !self.declared.insert(key.to_string()) {
            return false;
        }
        emit(self);
        true
    }

    /// Whether `key` was already declared
    pub fn is_declared(&self, key: &str) -> bool {
        self.declared.contains(key)
    }

    /// Current text
    pub fn as_str(&self) -> &str {
        &self.code
    }

    /// Consume the builder and return its text
    pub fn finish(self) -> String {
        self.code
    }
}
