/// Output Capture Sink
///
/// Holds the lines produced by the sandbox's `console.log`, in call order.
/// The JavaScript side only stringifies and buffers; after every unit of work
/// the context drains that buffer into this sink, so the Rust side owns the
/// captured text for the lifetime of the context.
///
/// **Line convention:**
/// The last captured line of a run is the return-value representation and
/// everything before it is auxiliary console output. For entry-point runs
/// the harness appends the return value after the call returns, so user
/// logging can never come after it. Whole-script runs have no such guarantee:
/// whatever the script logged last is taken as the result.

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CaptureSink {
    lines: Vec<String>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend<I>(&mut self, lines: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.lines.extend(lines);
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Hand over everything captured so far and start empty.
    pub fn take(&mut self) -> Vec<String> {
        std::mem::take(&mut self.lines)
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

/// Captured lines of one run, split by the line convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitOutput {
    /// Last line, or empty when nothing was logged
    pub output: String,
    /// Earlier lines joined with `\n`; `None` when there were none
    pub console_output: Option<String>,
}

pub fn split_output(lines: &[String]) -> SplitOutput {
    match lines.split_last() {
        None => SplitOutput {
            output: String::new(),
            console_output: None,
        },
        Some((last, rest)) => SplitOutput {
            output: last.clone(),
            console_output: if rest.is_empty() {
                None
            } else {
                Some(rest.join("\n"))
            },
        },
    }
}
