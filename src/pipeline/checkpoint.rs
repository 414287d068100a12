use std::{
    io::{BufRead, Write},
    path::Path,
};

use miette::{miette, Context, IntoDiagnostic, Result};
use owo_colors::OwoColorize;

use crate::types::AssemblyBatch;

/// Point where the pipeline waits for the operator before assembling.
pub trait Checkpoint {
    /// Block until the batch may be assembled.
    ///
    /// The operator may delete files of the work directory in the meantime,
    /// the corresponding clips will then be left out.
    fn confirm(&self, batch: &AssemblyBatch, work_dir: &Path) -> Result<()>;
}

/// Continue immediately
#[derive(Debug)]
pub struct Proceed;

impl Checkpoint for Proceed {
    fn confirm(&self, _batch: &AssemblyBatch, _work_dir: &Path) -> Result<()> {
        Ok(())
    }
}

/// Print the batch and wait for a line on the standard input
#[derive(Debug)]
pub struct StdinCheckpoint;

impl Checkpoint for StdinCheckpoint {
    fn confirm(&self, batch: &AssemblyBatch, work_dir: &Path) -> Result<()> {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        prompt(batch, work_dir, &mut stdin.lock(), &mut stdout)
    }
}

fn prompt<R: BufRead, W: Write>(
    batch: &AssemblyBatch,
    work_dir: &Path,
    input: &mut R,
    output: &mut W,
) -> Result<()> {
    writeln!(output, "{}", "Fetched clips:".bold())
        .and_then(|()| writeln!(output, "{batch}"))
        .and_then(|()| {
            write!(
                output,
                "Check the files in {}, delete the ones to leave out, then press {} to assemble ",
                work_dir.display(),
                "Enter".green()
            )
        })
        .and_then(|()| output.flush())
        .into_diagnostic()
        .wrap_err("Could not write the checkpoint prompt")?;

    let mut answer = String::new();
    let read = input
        .read_line(&mut answer)
        .into_diagnostic()
        .wrap_err("Could not read the checkpoint answer")?;

    // No answer can ever come from a closed input
    if read == 0 {
        return Err(miette!("Input closed while awaiting the manual check"));
    }

    Ok(())
}
