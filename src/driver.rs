use std::fs;
use std::path::{Path, PathBuf};

use crate::compile_source;
use crate::diagnostic::Diagnostic;

/// An error from driving the compiler over a path: either a plain message
/// (I/O, bad path, bad file name) or a diagnostic pointing into a source
/// file.
#[derive(Debug)]
pub enum DriverError {
    Message(String),
    Diagnostic {
        filename: String,
        source: String,
        diagnostic: Diagnostic,
    },
}

impl DriverError {
    /// Report to stderr: a plain line, or a rendered source snippet.
    pub fn report(&self) {
        match self {
            DriverError::Message(message) => eprintln!("error: {}", message),
            DriverError::Diagnostic {
                filename,
                source,
                diagnostic,
            } => diagnostic.render(filename, source),
        }
    }
}

/// Collect the .jack files named by `path`: the file itself, or the
/// directory's entries (non-recursive), in sorted order.
pub fn jack_files(path: &Path) -> Result<Vec<PathBuf>, DriverError> {
    if path.is_file() {
        if path.extension().is_some_and(|ext| ext == "jack") {
            Ok(vec![path.to_path_buf()])
        } else {
            Err(DriverError::Message(format!(
                "input must be a .jack file or a directory: '{}'",
                path.display()
            )))
        }
    } else if path.is_dir() {
        let entries = fs::read_dir(path).map_err(|err| {
            DriverError::Message(format!("cannot read directory '{}': {}", path.display(), err))
        })?;
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| {
                DriverError::Message(format!(
                    "cannot read directory '{}': {}",
                    path.display(),
                    err
                ))
            })?;
            let file = entry.path();
            if file.is_file() && file.extension().is_some_and(|ext| ext == "jack") {
                files.push(file);
            }
        }
        files.sort();
        if files.is_empty() {
            return Err(DriverError::Message(format!(
                "no .jack files found in '{}'",
                path.display()
            )));
        }
        Ok(files)
    } else {
        Err(DriverError::Message(format!(
            "no such file or directory: '{}'",
            path.display()
        )))
    }
}

/// The class name a source file must declare: its stem, which must begin
/// with an uppercase letter.
pub fn expected_class_name(path: &Path) -> Result<String, DriverError> {
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| {
            DriverError::Message(format!("invalid file name: '{}'", path.display()))
        })?;
    if !stem.starts_with(|ch: char| ch.is_ascii_uppercase()) {
        return Err(DriverError::Message(format!(
            "file name '{}' must begin with an uppercase letter",
            path.display()
        )));
    }
    Ok(stem.to_string())
}

fn compile_to_vm(path: &Path) -> Result<String, DriverError> {
    let class_name = expected_class_name(path)?;
    let source = fs::read_to_string(path).map_err(|err| {
        DriverError::Message(format!("cannot read '{}': {}", path.display(), err))
    })?;
    compile_source(&source, &class_name).map_err(|diagnostic| DriverError::Diagnostic {
        filename: path.display().to_string(),
        source,
        diagnostic,
    })
}

/// Compile one source file to `<stem>.vm` next to it. The VM text is
/// buffered in memory, so nothing is written unless compilation succeeded.
pub fn compile_file(path: &Path) -> Result<PathBuf, DriverError> {
    let vm = compile_to_vm(path)?;
    let out_path = path.with_extension("vm");
    fs::write(&out_path, vm).map_err(|err| {
        DriverError::Message(format!("cannot write '{}': {}", out_path.display(), err))
    })?;
    Ok(out_path)
}

/// Run the full pipeline on one file without writing anything.
pub fn check_file(path: &Path) -> Result<(), DriverError> {
    compile_to_vm(path)?;
    Ok(())
}
