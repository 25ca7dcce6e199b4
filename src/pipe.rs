use crate::{format, value::Value};
use std::fmt::{Result, Write};

/// Wraps some underlying buffer by providing methods that write to it
/// in different formats.
///
/// Output may be redirected into a capture, which collects text instead of
/// forwarding it. Captures nest, and each one starts without indentation.
pub struct Pipe<'buffer> {
    buffer: &'buffer mut (dyn Write + 'buffer),
    captures: Vec<Capture>,
    /// Indentation written in front of every line, outermost first.
    indents: Vec<String>,
    /// True when the next text written starts a new line.
    pending: bool,
}

struct Capture {
    text: String,
    indents: Vec<String>,
    pending: bool,
}

impl<'buffer> Pipe<'buffer> {
    /// Create a new Pipe that writes to the given buffer.
    pub fn new(buffer: &'buffer mut (dyn Write + 'buffer)) -> Self {
        Self {
            buffer,
            captures: vec![],
            indents: vec![],
            pending: false,
        }
    }

    /// Write the printed form of the value.
    pub fn write_value(&mut self, value: &Value) -> Result {
        self.write_text(&format::display(value))
    }

    /// Write text, putting the current indentation in front of each line.
    pub fn write_text(&mut self, text: &str) -> Result {
        if self.indents.is_empty() {
            return self.forward(text);
        }

        for line in text.split_inclusive('\n') {
            if self.pending {
                let prefix = self.indents.concat();
                self.forward(&prefix)?;
                self.pending = false;
            }
            self.forward(line)?;
            self.pending = line.ends_with('\n');
        }

        Ok(())
    }

    /// Indent every following line of output by the given text, in addition
    /// to the current indentation.
    pub fn push_indent(&mut self, indent: &str) {
        self.indents.push(indent.to_string());
        self.pending = true;
    }

    /// Remove the indentation added last.
    pub fn pop_indent(&mut self) {
        self.indents.pop();
    }

    /// Start collecting output instead of writing it.
    pub fn begin_capture(&mut self) {
        self.captures.push(Capture {
            text: String::new(),
            indents: std::mem::take(&mut self.indents),
            pending: self.pending,
        });
        self.pending = false;
    }

    /// Stop the capture started last and return the collected output.
    pub fn end_capture(&mut self) -> String {
        match self.captures.pop() {
            Some(capture) => {
                self.indents = capture.indents;
                self.pending = capture.pending;
                capture.text
            }
            None => String::new(),
        }
    }

    fn forward(&mut self, text: &str) -> Result {
        match self.captures.last_mut() {
            Some(capture) => capture.text.write_str(text),
            None => self.buffer.write_str(text),
        }
    }
}

impl Write for Pipe<'_> {
    #[inline]
    fn write_str(&mut self, s: &str) -> Result {
        self.write_text(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_value() {
        let mut buffer = String::new();
        let mut pipe = Pipe::new(&mut buffer);
        pipe.write_value(&Value::None).unwrap();
        pipe.write_value(&Value::from("a")).unwrap();
        pipe.write_value(&Value::Int(1)).unwrap();

        assert_eq!(buffer, "a1");
    }

    #[test]
    fn test_indent() {
        let mut buffer = String::new();
        let mut pipe = Pipe::new(&mut buffer);
        pipe.write_text("a\n").unwrap();
        pipe.push_indent("\t");
        pipe.write_text("b\nc\n").unwrap();
        pipe.push_indent("  ");
        pipe.write_text("d\n").unwrap();
        pipe.pop_indent();
        pipe.pop_indent();
        pipe.write_text("e").unwrap();

        assert_eq!(buffer, "a\n\tb\n\tc\n\t  d\ne");
    }

    #[test]
    fn test_capture() {
        let mut buffer = String::new();
        let mut pipe = Pipe::new(&mut buffer);
        pipe.push_indent("  ");
        pipe.begin_capture();
        pipe.write_text("x\ny").unwrap();
        let captured = pipe.end_capture();
        pipe.write_text("z\n").unwrap();

        assert_eq!(captured, "x\ny");
        assert_eq!(buffer, "  z\n");
    }
}
