//! Code generation passes from resolved schemas.

use std::fmt::{self, Write};

/// Write a line to an [`Emitter`], formatted like [`format!`].
macro_rules! emit {
    ($emitter:expr) => {
        $emitter.line(format_args!(""))
    };
    ($emitter:expr, $($arg:tt)*) => {
        $emitter.line(format_args!($($arg)*))
    };
}

pub mod core_to_c;
pub mod core_to_cpp;
pub mod core_to_python;

/// An indenting line writer. Output is kept in memory so that nothing is
/// written out unless generation succeeds as a whole.
pub struct Emitter {
    output: String,
    indent_width: usize,
    depth: usize,
}

impl Emitter {
    pub fn new(indent_width: usize) -> Emitter {
        Emitter {
            output: String::new(),
            indent_width,
            depth: 0,
        }
    }

    /// Write a line at the current depth. Empty lines are not indented.
    pub fn line(&mut self, args: fmt::Arguments<'_>) {
        let start = self.output.len();
        // Writing to a `String` cannot fail
        let _ = self.output.write_fmt(args);

        if self.output.len() > start {
            let indent = " ".repeat(self.depth * self.indent_width);
            self.output.insert_str(start, &indent);
        }
        self.output.push('\n');
    }

    pub fn indent(&mut self) {
        self.depth += 1;
    }

    pub fn dedent(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn finish(self) -> String {
        self.output
    }
}
