pub mod diagnostic;
pub mod driver;
pub mod engine;
pub mod span;
pub mod symbol_table;
pub mod token;
pub mod tokenizer;
pub mod vm_writer;

use diagnostic::Diagnostic;
use engine::CompilationEngine;

/// Compile one class source to VM text. `class_name` is the file stem the
/// declared class must match.
pub fn compile_source(source: &str, class_name: &str) -> Result<String, Diagnostic> {
    CompilationEngine::new(source, class_name)?.compile_class()
}
