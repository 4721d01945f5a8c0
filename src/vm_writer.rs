/// An addressable VM memory segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Segment {
    Constant,
    Argument,
    Local,
    Static,
    This,
    That,
    Pointer,
    Temp,
}

impl Segment {
    pub fn as_str(self) -> &'static str {
        match self {
            Segment::Constant => "constant",
            Segment::Argument => "argument",
            Segment::Local => "local",
            Segment::Static => "static",
            Segment::This => "this",
            Segment::That => "that",
            Segment::Pointer => "pointer",
            Segment::Temp => "temp",
        }
    }
}

/// A VM arithmetic-logical command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Add,
    Sub,
    Neg,
    Eq,
    Gt,
    Lt,
    And,
    Or,
    Not,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Add => "add",
            Command::Sub => "sub",
            Command::Neg => "neg",
            Command::Eq => "eq",
            Command::Gt => "gt",
            Command::Lt => "lt",
            Command::And => "and",
            Command::Or => "or",
            Command::Not => "not",
        }
    }
}

/// Emits VM instructions into an in-memory buffer, one line per instruction.
/// The buffer is turned into the output file's text only after the whole
/// class compiled, so no partial file is ever written.
#[derive(Default)]
pub struct VmWriter {
    output: Vec<String>,
}

impl VmWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, segment: Segment, index: u16) {
        self.output
            .push(format!("push {} {}", segment.as_str(), index));
    }

    pub fn pop(&mut self, segment: Segment, index: u16) {
        self.output
            .push(format!("pop {} {}", segment.as_str(), index));
    }

    pub fn arithmetic(&mut self, command: Command) {
        self.output.push(command.as_str().to_string());
    }

    pub fn label(&mut self, label: &str) {
        self.output.push(format!("label {}", label));
    }

    pub fn goto(&mut self, label: &str) {
        self.output.push(format!("goto {}", label));
    }

    pub fn if_goto(&mut self, label: &str) {
        self.output.push(format!("if-goto {}", label));
    }

    pub fn call(&mut self, name: &str, n_args: u16) {
        self.output.push(format!("call {} {}", name, n_args));
    }

    pub fn function(&mut self, name: &str, n_locals: u16) {
        self.output.push(format!("function {} {}", name, n_locals));
    }

    pub fn ret(&mut self) {
        self.output.push("return".to_string());
    }

    /// The emitted text: one instruction per line, each newline-terminated.
    pub fn finish(self) -> String {
        let mut text = String::new();
        for line in &self.output {
            text.push_str(line);
            text.push('\n');
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop() {
        let mut writer = VmWriter::new();
        writer.push(Segment::Constant, 7);
        writer.push(Segment::Argument, 0);
        writer.pop(Segment::Local, 2);
        writer.pop(Segment::Pointer, 1);
        writer.pop(Segment::That, 0);
        writer.pop(Segment::Temp, 0);
        writer.push(Segment::Static, 3);
        writer.push(Segment::This, 1);
        assert_eq!(
            writer.finish(),
            "push constant 7\n\
             push argument 0\n\
             pop local 2\n\
             pop pointer 1\n\
             pop that 0\n\
             pop temp 0\n\
             push static 3\n\
             push this 1\n"
        );
    }

    #[test]
    fn test_arithmetic_commands() {
        let mut writer = VmWriter::new();
        for command in [
            Command::Add,
            Command::Sub,
            Command::Neg,
            Command::Eq,
            Command::Gt,
            Command::Lt,
            Command::And,
            Command::Or,
            Command::Not,
        ] {
            writer.arithmetic(command);
        }
        assert_eq!(writer.finish(), "add\nsub\nneg\neq\ngt\nlt\nand\nor\nnot\n");
    }

    #[test]
    fn test_control_flow_and_calls() {
        let mut writer = VmWriter::new();
        writer.function("Main.main", 2);
        writer.label("WHILE_EXP0");
        writer.if_goto("WHILE_END0");
        writer.call("Math.multiply", 2);
        writer.goto("WHILE_EXP0");
        writer.ret();
        assert_eq!(
            writer.finish(),
            "function Main.main 2\n\
             label WHILE_EXP0\n\
             if-goto WHILE_END0\n\
             call Math.multiply 2\n\
             goto WHILE_EXP0\n\
             return\n"
        );
    }

    #[test]
    fn test_empty_writer_emits_nothing() {
        assert_eq!(VmWriter::new().finish(), "");
    }
}
