use crate::diagnostic::Diagnostic;
use crate::span::{Span, Spanned};
use crate::symbol_table::{Kind, SymbolTable};
use crate::token::Token;
use crate::tokenizer::Tokenizer;
use crate::vm_writer::{Command, Segment, VmWriter};

const MAX_NESTING_DEPTH: u32 = 256;

/// Subroutine flavors; they differ in receiver handling and prologue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SubroutineKind {
    Constructor,
    Function,
    Method,
}

/// Single-pass compiler for one class: recursive descent drives the
/// tokenizer, fills the two symbol tables, and emits VM instructions as it
/// parses. No AST is built. The first error aborts the file.
pub struct CompilationEngine<'src> {
    tokenizer: Tokenizer<'src>,
    cur: Spanned<Token>,
    class_name: String,
    class_table: SymbolTable,
    sub_table: SymbolTable,
    writer: VmWriter,
    if_counter: u32,
    while_counter: u32,
    depth: u32,
}

impl<'src> CompilationEngine<'src> {
    /// `class_name` is the file stem the declared class must match.
    pub fn new(source: &'src str, class_name: &str) -> Result<Self, Diagnostic> {
        let mut tokenizer = Tokenizer::new(source);
        let cur = next_token(&mut tokenizer)?;
        Ok(Self {
            tokenizer,
            cur,
            class_name: class_name.to_string(),
            class_table: SymbolTable::new(),
            sub_table: SymbolTable::new(),
            writer: VmWriter::new(),
            if_counter: 0,
            while_counter: 0,
            depth: 0,
        })
    }

    /// class := 'class' ident '{' classVarDec* subroutine* '}'
    pub fn compile_class(mut self) -> Result<String, Diagnostic> {
        self.expect(&Token::Class)?;
        let name = self.expect_ident()?;
        if name.node != self.class_name {
            return Err(Diagnostic::error(
                format!(
                    "class name '{}' does not match file name '{}'",
                    name.node, self.class_name
                ),
                name.span,
            )
            .with_help(format!(
                "a file {0}.jack must declare 'class {0}'",
                self.class_name
            )));
        }
        self.expect(&Token::LBrace)?;
        while matches!(self.cur.node, Token::Static | Token::Field) {
            self.compile_class_var_dec()?;
        }
        while matches!(
            self.cur.node,
            Token::Constructor | Token::Function | Token::Method
        ) {
            self.compile_subroutine()?;
        }
        self.expect(&Token::RBrace)?;
        if self.cur.node != Token::Eof {
            return Err(self.unexpected("end of file after the class body"));
        }
        Ok(self.writer.finish())
    }

    /// classVarDec := ('static'|'field') type varName (',' varName)* ';'
    fn compile_class_var_dec(&mut self) -> Result<(), Diagnostic> {
        let kind = match self.cur.node {
            Token::Static => Kind::Static,
            _ => Kind::Field,
        };
        self.bump()?;
        let ty = self.expect_type()?;
        loop {
            let name = self.expect_ident()?;
            if self.class_table.contains(&name.node) {
                return Err(Diagnostic::error(
                    format!(
                        "'{}' is already declared in class '{}'",
                        name.node, self.class_name
                    ),
                    name.span,
                ));
            }
            self.class_table.define(&name.node, &ty, kind);
            if !self.eat(&Token::Comma)? {
                break;
            }
        }
        self.expect(&Token::Semicolon)
    }

    /// subroutine := ('constructor'|'function'|'method') ('void'|type)
    ///               subName '(' paramList ')' '{' varDec* statements '}'
    fn compile_subroutine(&mut self) -> Result<(), Diagnostic> {
        let kind = match self.cur.node {
            Token::Constructor => SubroutineKind::Constructor,
            Token::Function => SubroutineKind::Function,
            _ => SubroutineKind::Method,
        };
        self.bump()?;

        // Return type. Recorded nowhere: types are not checked.
        if !self.eat(&Token::Void)? {
            self.expect_type()?;
        }
        let name = self.expect_ident()?;

        self.sub_table.reset();
        self.if_counter = 0;
        self.while_counter = 0;
        if kind == SubroutineKind::Method {
            // The implicit receiver occupies argument 0; user parameters
            // start at 1.
            self.sub_table.define("this", &self.class_name, Kind::Arg);
        }

        self.expect(&Token::LParen)?;
        self.compile_parameter_list()?;
        self.expect(&Token::RParen)?;

        self.expect(&Token::LBrace)?;
        while self.cur.node == Token::Var {
            self.compile_var_dec()?;
        }

        let full_name = format!("{}.{}", self.class_name, name.node);
        self.writer
            .function(&full_name, self.sub_table.var_count(Kind::Var));
        match kind {
            SubroutineKind::Constructor => {
                self.writer
                    .push(Segment::Constant, self.class_table.var_count(Kind::Field));
                self.writer.call("Memory.alloc", 1);
                self.writer.pop(Segment::Pointer, 0);
            }
            SubroutineKind::Method => {
                self.writer.push(Segment::Argument, 0);
                self.writer.pop(Segment::Pointer, 0);
            }
            SubroutineKind::Function => {}
        }

        self.compile_statements()?;
        self.expect(&Token::RBrace)
    }

    /// paramList := ( type varName (',' type varName)* )?
    fn compile_parameter_list(&mut self) -> Result<(), Diagnostic> {
        if self.cur.node == Token::RParen {
            return Ok(());
        }
        loop {
            let ty = self.expect_type()?;
            let name = self.expect_ident()?;
            self.define_local(name, &ty, Kind::Arg)?;
            if !self.eat(&Token::Comma)? {
                break;
            }
        }
        Ok(())
    }

    /// varDec := 'var' type varName (',' varName)* ';'
    fn compile_var_dec(&mut self) -> Result<(), Diagnostic> {
        self.expect(&Token::Var)?;
        let ty = self.expect_type()?;
        loop {
            let name = self.expect_ident()?;
            self.define_local(name, &ty, Kind::Var)?;
            if !self.eat(&Token::Comma)? {
                break;
            }
        }
        self.expect(&Token::Semicolon)
    }

    fn compile_statements(&mut self) -> Result<(), Diagnostic> {
        self.enter_nesting()?;
        loop {
            match self.cur.node {
                Token::Let => self.compile_let()?,
                Token::If => self.compile_if()?,
                Token::While => self.compile_while()?,
                Token::Do => self.compile_do()?,
                Token::Return => self.compile_return()?,
                _ => break,
            }
        }
        self.exit_nesting();
        Ok(())
    }

    /// let := 'let' varName ('[' expr ']')? '=' expr ';'
    fn compile_let(&mut self) -> Result<(), Diagnostic> {
        self.expect(&Token::Let)?;
        let name = self.expect_ident()?;
        let (segment, index, _) = self.resolve(&name.node, name.span)?;
        if self.eat(&Token::LBracket)? {
            // Target address first, value second; pointer 1 is aimed at the
            // target only after the value is fully computed.
            self.writer.push(segment, index);
            self.compile_expression()?;
            self.expect(&Token::RBracket)?;
            self.writer.arithmetic(Command::Add);
            self.expect(&Token::Eq)?;
            self.compile_expression()?;
            self.expect(&Token::Semicolon)?;
            self.writer.pop(Segment::Temp, 0);
            self.writer.pop(Segment::Pointer, 1);
            self.writer.push(Segment::Temp, 0);
            self.writer.pop(Segment::That, 0);
        } else {
            self.expect(&Token::Eq)?;
            self.compile_expression()?;
            self.expect(&Token::Semicolon)?;
            self.writer.pop(segment, index);
        }
        Ok(())
    }

    /// if := 'if' '(' expr ')' '{' statements '}' ('else' '{' statements '}')?
    fn compile_if(&mut self) -> Result<(), Diagnostic> {
        let n = self.if_counter;
        self.if_counter += 1;
        self.expect(&Token::If)?;
        self.expect(&Token::LParen)?;
        self.compile_expression()?;
        self.expect(&Token::RParen)?;
        self.writer.if_goto(&format!("IF_TRUE{}", n));
        self.writer.goto(&format!("IF_FALSE{}", n));
        self.writer.label(&format!("IF_TRUE{}", n));
        self.expect(&Token::LBrace)?;
        self.compile_statements()?;
        self.expect(&Token::RBrace)?;
        if self.eat(&Token::Else)? {
            self.writer.goto(&format!("IF_END{}", n));
            self.writer.label(&format!("IF_FALSE{}", n));
            self.expect(&Token::LBrace)?;
            self.compile_statements()?;
            self.expect(&Token::RBrace)?;
            self.writer.label(&format!("IF_END{}", n));
        } else {
            self.writer.label(&format!("IF_FALSE{}", n));
        }
        Ok(())
    }

    /// while := 'while' '(' expr ')' '{' statements '}'
    fn compile_while(&mut self) -> Result<(), Diagnostic> {
        let n = self.while_counter;
        self.while_counter += 1;
        self.expect(&Token::While)?;
        self.writer.label(&format!("WHILE_EXP{}", n));
        self.expect(&Token::LParen)?;
        self.compile_expression()?;
        self.expect(&Token::RParen)?;
        self.writer.arithmetic(Command::Not);
        self.writer.if_goto(&format!("WHILE_END{}", n));
        self.expect(&Token::LBrace)?;
        self.compile_statements()?;
        self.expect(&Token::RBrace)?;
        self.writer.goto(&format!("WHILE_EXP{}", n));
        self.writer.label(&format!("WHILE_END{}", n));
        Ok(())
    }

    /// do := 'do' subCall ';' with the returned value discarded.
    fn compile_do(&mut self) -> Result<(), Diagnostic> {
        self.expect(&Token::Do)?;
        let name = self.expect_ident()?;
        self.compile_subroutine_call(name)?;
        self.expect(&Token::Semicolon)?;
        self.writer.pop(Segment::Temp, 0);
        Ok(())
    }

    /// return := 'return' expr? ';' with void subroutines returning 0.
    fn compile_return(&mut self) -> Result<(), Diagnostic> {
        self.expect(&Token::Return)?;
        if self.cur.node == Token::Semicolon {
            self.writer.push(Segment::Constant, 0);
        } else {
            self.compile_expression()?;
        }
        self.expect(&Token::Semicolon)?;
        self.writer.ret();
        Ok(())
    }

    /// expr := term (op term)*, left-associative with no precedence. Each
    /// operator is emitted after its right-hand term.
    fn compile_expression(&mut self) -> Result<(), Diagnostic> {
        self.enter_nesting()?;
        self.compile_term()?;
        loop {
            let op = match self.cur.node {
                Token::Plus
                | Token::Minus
                | Token::Star
                | Token::Slash
                | Token::Amp
                | Token::Pipe
                | Token::Lt
                | Token::Gt
                | Token::Eq => self.cur.node.clone(),
                _ => break,
            };
            self.bump()?;
            self.compile_term()?;
            match op {
                Token::Plus => self.writer.arithmetic(Command::Add),
                Token::Minus => self.writer.arithmetic(Command::Sub),
                Token::Star => self.writer.call("Math.multiply", 2),
                Token::Slash => self.writer.call("Math.divide", 2),
                Token::Amp => self.writer.arithmetic(Command::And),
                Token::Pipe => self.writer.arithmetic(Command::Or),
                Token::Lt => self.writer.arithmetic(Command::Lt),
                Token::Gt => self.writer.arithmetic(Command::Gt),
                Token::Eq => self.writer.arithmetic(Command::Eq),
                _ => unreachable!(),
            }
        }
        self.exit_nesting();
        Ok(())
    }

    fn compile_term(&mut self) -> Result<(), Diagnostic> {
        self.enter_nesting()?;
        match self.cur.node.clone() {
            Token::IntConst(value) => {
                self.bump()?;
                self.writer.push(Segment::Constant, value);
            }
            Token::StrConst(text) => {
                self.bump()?;
                self.compile_string_constant(&text);
            }
            Token::True => {
                self.bump()?;
                self.writer.push(Segment::Constant, 0);
                self.writer.arithmetic(Command::Not);
            }
            Token::False | Token::Null => {
                self.bump()?;
                self.writer.push(Segment::Constant, 0);
            }
            Token::This => {
                self.bump()?;
                self.writer.push(Segment::Pointer, 0);
            }
            Token::Ident(name) => {
                let span = self.cur.span;
                self.bump()?;
                match self.cur.node {
                    Token::LBracket => {
                        let (segment, index, _) = self.resolve(&name, span)?;
                        self.writer.push(segment, index);
                        self.bump()?;
                        self.compile_expression()?;
                        self.expect(&Token::RBracket)?;
                        self.writer.arithmetic(Command::Add);
                        self.writer.pop(Segment::Pointer, 1);
                        self.writer.push(Segment::That, 0);
                    }
                    Token::LParen | Token::Dot => {
                        self.compile_subroutine_call(Spanned::new(name, span))?;
                    }
                    _ => {
                        let (segment, index, _) = self.resolve(&name, span)?;
                        self.writer.push(segment, index);
                    }
                }
            }
            Token::LParen => {
                self.bump()?;
                self.compile_expression()?;
                self.expect(&Token::RParen)?;
            }
            Token::Minus => {
                self.bump()?;
                self.compile_term()?;
                self.writer.arithmetic(Command::Neg);
            }
            Token::Tilde => {
                self.bump()?;
                self.compile_term()?;
                self.writer.arithmetic(Command::Not);
            }
            _ => return Err(self.unexpected("an expression term")),
        }
        self.exit_nesting();
        Ok(())
    }

    /// subCall := subName '(' exprList ')'
    ///          | (className|varName) '.' subName '(' exprList ')'
    ///
    /// `first` is the identifier already consumed. Unqualified calls are
    /// methods of the current class; a qualifier that names a variable is a
    /// method call on that object; any other qualifier is a class name.
    fn compile_subroutine_call(&mut self, first: Spanned<String>) -> Result<(), Diagnostic> {
        if self.eat(&Token::Dot)? {
            let method = self.expect_ident()?;
            if let Some((segment, index, ty)) = self.lookup(&first.node) {
                self.writer.push(segment, index);
                self.expect(&Token::LParen)?;
                let n_args = self.compile_expression_list()?;
                self.expect(&Token::RParen)?;
                self.writer
                    .call(&format!("{}.{}", ty, method.node), n_args + 1);
            } else {
                self.expect(&Token::LParen)?;
                let n_args = self.compile_expression_list()?;
                self.expect(&Token::RParen)?;
                self.writer
                    .call(&format!("{}.{}", first.node, method.node), n_args);
            }
        } else {
            self.writer.push(Segment::Pointer, 0);
            self.expect(&Token::LParen)?;
            let n_args = self.compile_expression_list()?;
            self.expect(&Token::RParen)?;
            self.writer
                .call(&format!("{}.{}", self.class_name, first.node), n_args + 1);
        }
        Ok(())
    }

    fn compile_expression_list(&mut self) -> Result<u16, Diagnostic> {
        let mut n_args = 0;
        if self.cur.node != Token::RParen {
            self.compile_expression()?;
            n_args = 1;
            while self.eat(&Token::Comma)? {
                self.compile_expression()?;
                n_args += 1;
            }
        }
        Ok(n_args)
    }

    /// Every occurrence builds the string at runtime; there is no pool.
    fn compile_string_constant(&mut self, text: &str) {
        self.writer.push(Segment::Constant, text.len() as u16);
        self.writer.call("String.new", 1);
        for byte in text.bytes() {
            self.writer.push(Segment::Constant, byte as u16);
            self.writer.call("String.appendChar", 2);
        }
    }

    // ── token cursor ──

    fn bump(&mut self) -> Result<(), Diagnostic> {
        self.cur = next_token(&mut self.tokenizer)?;
        Ok(())
    }

    fn expect(&mut self, expected: &Token) -> Result<(), Diagnostic> {
        if self.cur.node == *expected {
            self.bump()
        } else {
            Err(self.unexpected(expected.description()))
        }
    }

    fn eat(&mut self, token: &Token) -> Result<bool, Diagnostic> {
        if self.cur.node == *token {
            self.bump()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn expect_ident(&mut self) -> Result<Spanned<String>, Diagnostic> {
        match &self.cur.node {
            Token::Ident(name) => {
                let name = Spanned::new(name.clone(), self.cur.span);
                self.bump()?;
                Ok(name)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    /// type := 'int' | 'char' | 'boolean' | className
    fn expect_type(&mut self) -> Result<String, Diagnostic> {
        let ty = match &self.cur.node {
            Token::Int => "int".to_string(),
            Token::Char => "char".to_string(),
            Token::Boolean => "boolean".to_string(),
            Token::Ident(name) => name.clone(),
            _ => return Err(self.unexpected("a type (int, char, boolean, or a class name)")),
        };
        self.bump()?;
        Ok(ty)
    }

    fn unexpected(&self, expected: &str) -> Diagnostic {
        Diagnostic::error(
            format!(
                "expected {}, found {}",
                expected,
                self.cur.node.description()
            ),
            self.cur.span,
        )
    }

    // ── name resolution ──

    /// Subroutine table first, then class table.
    fn lookup(&self, name: &str) -> Option<(Segment, u16, String)> {
        self.sub_table
            .get(name)
            .or_else(|| self.class_table.get(name))
            .map(|sym| (sym.kind.segment(), sym.index, sym.ty.clone()))
    }

    fn resolve(&self, name: &str, span: Span) -> Result<(Segment, u16, String), Diagnostic> {
        self.lookup(name).ok_or_else(|| {
            Diagnostic::error(format!("undeclared variable '{}'", name), span)
                .with_note(format!("in class '{}'", self.class_name))
                .with_help(
                    "declare it with 'var', as a parameter, or as a 'static'/'field' member"
                        .to_string(),
                )
        })
    }

    fn define_local(&mut self, name: Spanned<String>, ty: &str, kind: Kind) -> Result<(), Diagnostic> {
        if self.sub_table.contains(&name.node) {
            return Err(Diagnostic::error(
                format!("'{}' is already declared in this subroutine", name.node),
                name.span,
            ));
        }
        self.sub_table.define(&name.node, ty, kind);
        Ok(())
    }

    // ── nesting guard ──

    fn enter_nesting(&mut self) -> Result<(), Diagnostic> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(Diagnostic::error(
                "nesting depth exceeded (maximum 256 levels)".to_string(),
                self.cur.span,
            )
            .with_help("split deeply nested expressions or statements into subroutines".to_string()));
        }
        Ok(())
    }

    fn exit_nesting(&mut self) {
        self.depth -= 1;
    }
}

fn next_token(tokenizer: &mut Tokenizer) -> Result<Spanned<Token>, Diagnostic> {
    if tokenizer.has_more() {
        tokenizer.advance()
    } else {
        let at = tokenizer.offset();
        Ok(Spanned::new(Token::Eof, Span::new(at, at)))
    }
}
