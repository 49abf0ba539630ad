//! Minimal VCD dump of the debug pins.
//!
//! One frame per `eval`, keyed by simulated time in nanoseconds. Only
//! signals that changed since the previous frame are emitted, which is
//! all a VCD viewer needs.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

const SIGNALS: [(&str, char); 6] = [
    ("clk", '!'),
    ("rstn", '"'),
    ("tck", '#'),
    ("tms", '$'),
    ("tdi", '%'),
    ("tdo", '&'),
];

pub struct VcdWriter {
    out: BufWriter<File>,
    last: Option<[bool; 6]>,
}

impl VcdWriter {
    pub fn create(path: &Path) -> io::Result<Self> {
        let mut out = BufWriter::new(File::create(path)?);

        writeln!(out, "$timescale 1ns $end")?;
        writeln!(out, "$scope module corev $end")?;
        for (name, id) in SIGNALS {
            writeln!(out, "$var wire 1 {id} {name} $end")?;
        }
        writeln!(out, "$upscope $end")?;
        writeln!(out, "$enddefinitions $end")?;

        Ok(VcdWriter { out, last: None })
    }

    /// Append a frame at time `t`. Unchanged signals are skipped.
    pub fn dump(&mut self, t: u64, values: &[bool; 6]) {
        let changed: Vec<usize> = match &self.last {
            None => (0..SIGNALS.len()).collect(),
            Some(last) => (0..SIGNALS.len()).filter(|&i| last[i] != values[i]).collect(),
        };
        if changed.is_empty() {
            return;
        }

        // Tracing is best effort: an I/O failure must not take the
        // simulation down with it.
        let _ = writeln!(self.out, "#{t}");
        for i in changed {
            let _ = writeln!(
                self.out,
                "{}{}",
                if values[i] { '1' } else { '0' },
                SIGNALS[i].1
            );
        }
        self.last = Some(*values);
    }
}

impl Drop for VcdWriter {
    fn drop(&mut self) {
        let _ = self.out.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn frames_contain_header_and_deltas() {
        let path = std::env::temp_dir().join(format!("corev-vcd-test-{}.vcd", std::process::id()));

        {
            let mut wave = VcdWriter::create(&path).unwrap();
            wave.dump(0, &[true, false, true, false, false, false]);
            wave.dump(10, &[false, false, true, false, false, false]);
            // Identical frame, should emit nothing.
            wave.dump(20, &[false, false, true, false, false, false]);
        }

        let text = fs::read_to_string(&path).unwrap();
        fs::remove_file(&path).unwrap();

        assert!(text.contains("$timescale 1ns $end"));
        assert!(text.contains("$var wire 1 ! clk $end"));
        assert!(text.contains("#0\n"));
        assert!(text.contains("#10\n0!\n"));
        assert!(!text.contains("#20"));
    }
}
