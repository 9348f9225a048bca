use std::io::Write;
use std::process::{Command, Stdio};

use anyhow::{anyhow, Context, Result};

use crate::pipeline::backend::VisionBackend;

/// OCR backend that pipes the image through a command-line engine.
///
/// The command is invoked as `<program> stdin stdout`, which is the
/// tesseract calling convention.
pub struct CommandOcrBackend {
    program: String,
}

impl CommandOcrBackend {
    /// Check that `program --version` runs before accepting it.
    pub fn probe(program: &str) -> Result<Self> {
        let status = Command::new(program)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .with_context(|| format!("failed to run ocr engine '{}'", program))?;
        if !status.success() {
            return Err(anyhow!(
                "ocr engine '{}' probe exited with {}",
                program,
                status
            ));
        }
        Ok(Self {
            program: program.to_string(),
        })
    }
}

impl VisionBackend for CommandOcrBackend {
    fn name(&self) -> &'static str {
        "command-ocr"
    }

    fn describe(&self, image: &[u8]) -> Result<String> {
        let mut child = Command::new(&self.program)
            .args(["stdin", "stdout"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.program))?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(err) = stdin.write_all(image) {
                // The engine may have exited early; reap it either way.
                drop(stdin);
                let _ = child.kill();
                let _ = child.wait();
                return Err(anyhow::Error::new(err).context("write image to ocr engine"));
            }
        }

        let output = child.wait_with_output().context("wait for ocr engine")?;
        if !output.status.success() {
            return Err(anyhow!(
                "{} exited with status {}",
                self.program,
                output.status
            ));
        }
        Ok(join_lines(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Collapse recognized lines into one space-separated string.
fn join_lines(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}
