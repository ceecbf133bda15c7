// This module parses the textual EIR format one line at a time. A method header opens a
// body that runs to the next line holding a lone '}'. Labels are collected in a first
// pass so that jumps and branches may name blocks defined further down, then every
// instruction line is fed through the EirMethod builders, which means the parsed method
// carries the same split constraints and temporaries as one built in code.

//! Textual EIR parser.

use hashbrown::HashMap;

use crate::abi::{CallingConvention, Target};
use crate::core::block::BlockId;
use crate::core::error::{EirError, EirResult};
use crate::core::instruction::ArithmeticOp;
use crate::core::kind::Kind;
use crate::core::location::ConstantValue;
use crate::core::method::EirMethod;
use crate::core::session::CompilationContext;
use crate::core::value::ValueId;

/// Parse every method in `text`.
pub fn parse_methods(context: &CompilationContext<'_>, text: &str) -> EirResult<Vec<EirMethod>> {
    parse_methods_with_convention(context, text, CallingConvention::Java)
}

/// Parse every method in `text`; headers without an `@convention` suffix
/// use `convention`.
pub fn parse_methods_with_convention(
    context: &CompilationContext<'_>,
    text: &str,
    convention: CallingConvention,
) -> EirResult<Vec<EirMethod>> {
    let lines: Vec<(usize, &str)> = text
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, strip_comment(line).trim()))
        .filter(|(_, line)| !line.is_empty())
        .collect();

    let mut methods = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let (line, header) = lines[i];
        let end = lines[i + 1..]
            .iter()
            .position(|(_, l)| *l == "}")
            .map(|offset| i + 1 + offset)
            .ok_or_else(|| parse_error(line, "method is missing its closing '}'"))?;
        let parser = MethodParser::new(context, line, header, convention)?;
        methods.push(parser.parse_body(&lines[i + 1..end])?);
        i = end + 1;
    }
    log::debug!("parsed {} methods", methods.len());
    Ok(methods)
}

/// Parse `text`, which must hold exactly one method.
pub fn parse_method(context: &CompilationContext<'_>, text: &str) -> EirResult<EirMethod> {
    let mut methods = parse_methods(context, text)?;
    match methods.len() {
        1 => Ok(methods.remove(0)),
        n => Err(parse_error(1, format!("expected one method, found {n}"))),
    }
}

fn strip_comment(line: &str) -> &str {
    line.split(';').next().unwrap_or("")
}

fn parse_error(line: usize, message: impl Into<String>) -> EirError {
    EirError::Parse {
        line,
        message: message.into(),
    }
}

fn is_name_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '.'
}

/// Cursor over a single line.
struct Cursor<'a> {
    text: &'a str,
    pos: usize,
    line: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str, line: usize) -> Self {
        Self { text, pos: 0, line }
    }

    fn error(&self, message: impl Into<String>) -> EirError {
        parse_error(self.line, message)
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn skip_spaces(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_spaces();
        self.rest().chars().next()
    }

    fn at_end(&mut self) -> bool {
        self.peek().is_none()
    }

    fn eat(&mut self, ch: char) -> bool {
        if self.peek() == Some(ch) {
            self.pos += ch.len_utf8();
            true
        } else {
            false
        }
    }

    fn eat_str(&mut self, s: &str) -> bool {
        self.skip_spaces();
        if self.rest().starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, ch: char) -> EirResult<()> {
        if self.eat(ch) {
            Ok(())
        } else {
            let found = self.peek();
            Err(self.error(format!("expected '{ch}' but found {found:?}")))
        }
    }

    fn take_while(&mut self, accept: impl Fn(char) -> bool) -> &'a str {
        self.skip_spaces();
        let rest = self.rest();
        let len = rest.find(|ch: char| !accept(ch)).unwrap_or(rest.len());
        self.pos += len;
        &rest[..len]
    }

    fn word(&mut self) -> EirResult<&'a str> {
        let word = self.take_while(is_name_char);
        if word.is_empty() {
            let found = self.peek();
            Err(self.error(format!("expected a name but found {found:?}")))
        } else {
            Ok(word)
        }
    }

    fn kind(&mut self) -> EirResult<Kind> {
        let name = self.word()?;
        Kind::from_name(name).ok_or_else(|| self.error(format!("unknown kind '{name}'")))
    }

    fn number(&mut self) -> EirResult<u32> {
        let word = self.word()?;
        word.parse()
            .map_err(|_| self.error(format!("expected a number but found '{word}'")))
    }

    fn finish(&mut self) -> EirResult<()> {
        if self.at_end() {
            Ok(())
        } else {
            Err(self.error(format!("unexpected trailing '{}'", self.rest())))
        }
    }
}

struct MethodParser<'t> {
    method: EirMethod,
    blocks: HashMap<&'t str, BlockId>,
    values: HashMap<&'t str, ValueId>,
    current: Option<BlockId>,
}

impl<'t> MethodParser<'t> {
    /// `method NAME(KIND, ...) [-> KIND] [@CONVENTION] {`
    fn new(
        context: &CompilationContext<'_>,
        line: usize,
        header: &str,
        default_convention: CallingConvention,
    ) -> EirResult<Self> {
        let mut c = Cursor::new(header, line);
        if !c.eat_str("method") {
            return Err(c.error("expected 'method'"));
        }
        let name = c.word()?;
        c.expect('(')?;
        let mut parameters = Vec::new();
        if !c.eat(')') {
            loop {
                parameters.push(c.kind()?);
                if !c.eat(',') {
                    c.expect(')')?;
                    break;
                }
            }
        }
        let result = if c.eat_str("->") { c.kind()? } else { Kind::Void };
        let convention = if c.eat('@') {
            let name = c.word()?;
            CallingConvention::from_name(name)
                .ok_or_else(|| c.error(format!("unknown calling convention '{name}'")))?
        } else {
            default_convention
        };
        c.expect('{')?;
        c.finish()?;

        let method = context.new_method(name, Target::Amd64, convention, &parameters, result)?;
        Ok(Self {
            method,
            blocks: HashMap::new(),
            values: HashMap::new(),
            current: None,
        })
    }

    fn label(line: &str) -> Option<&str> {
        line.strip_suffix(':')
            .filter(|name| !name.is_empty() && name.chars().all(is_name_char))
    }

    fn parse_body(mut self, lines: &[(usize, &'t str)]) -> EirResult<EirMethod> {
        for &(line, text) in lines {
            if let Some(name) = Self::label(text) {
                if self.blocks.contains_key(name) {
                    return Err(parse_error(line, format!("block '{name}' defined twice")));
                }
                let block = self.method.new_block(Some(name));
                self.blocks.insert(name, block);
            }
        }
        for &(line, text) in lines {
            if let Some(name) = Self::label(text) {
                self.current = self.blocks.get(name).copied();
                continue;
            }
            let block = self
                .current
                .ok_or_else(|| parse_error(line, "instruction outside of a block"))?;
            let mut c = Cursor::new(text, line);
            if let Err(err) = self.instruction(&mut c, block) {
                log::warn!("{}: line {line}: {err}", self.method.name());
                return Err(err);
            }
        }
        Ok(self.method)
    }

    fn instruction(&mut self, c: &mut Cursor<'t>, block: BlockId) -> EirResult<()> {
        if c.peek() == Some('%') {
            let destination = self.value(c)?;
            c.expect('=')?;
            match c.word()? {
                "move" => {
                    let source = self.operand(c)?;
                    self.method.append_move(block, destination, source)?;
                }
                "stackalloc" => {
                    let size = c.number()?;
                    let align = if c.eat(',') { c.number()? } else { 8 };
                    self.method
                        .append_stack_allocate(block, destination, size, align)?;
                }
                other => return Err(c.error(format!("'{other}' does not define a value"))),
            }
            return c.finish();
        }

        match c.word()? {
            "prologue" => {
                let mut parameters = Vec::new();
                if !c.at_end() {
                    loop {
                        parameters.push(self.value(c)?);
                        if !c.eat(',') {
                            break;
                        }
                    }
                }
                self.method.append_prologue(block, &parameters)?;
            }
            "safepoint" => {
                self.method.append_safepoint(block)?;
            }
            "filler" => {
                self.method.append_filler(block)?;
            }
            "jump" => {
                let target = self.block_ref(c)?;
                self.method.append_jump(block, target)?;
            }
            "branch" => {
                let condition = self.operand(c)?;
                let then_block = self.block_ref(c)?;
                c.expect(',')?;
                let else_block = self.block_ref(c)?;
                self.method
                    .append_branch(block, condition, then_block, else_block)?;
            }
            "return" => {
                let value = if c.at_end() { None } else { Some(self.operand(c)?) };
                self.method.append_return(block, value)?;
            }
            "catch" => {
                let exception = self.value(c)?;
                self.method.append_catch(block, exception)?;
            }
            "cmp" => {
                let left = self.operand(c)?;
                c.expect(',')?;
                let right = self.operand(c)?;
                self.method.append_compare(block, left, right)?;
            }
            "call" => {
                let callee = self.operand(c)?;
                c.expect('(')?;
                let mut arguments = Vec::new();
                if !c.eat(')') {
                    loop {
                        arguments.push(self.operand(c)?);
                        if !c.eat(',') {
                            c.expect(')')?;
                            break;
                        }
                    }
                }
                let result = if c.eat_str("->") { Some(self.value(c)?) } else { None };
                self.method.append_call(block, callee, &arguments, result)?;
            }
            mnemonic => {
                let op = ArithmeticOp::from_mnemonic(mnemonic)
                    .ok_or_else(|| c.error(format!("unknown instruction '{mnemonic}'")))?;
                let destination = self.value(c)?;
                c.expect(',')?;
                let source = self.operand(c)?;
                self.method
                    .append_arithmetic(block, op, destination, source)?;
            }
        }
        c.finish()
    }

    fn block_ref(&self, c: &mut Cursor<'t>) -> EirResult<BlockId> {
        c.expect('^')?;
        let name = c.word()?;
        self.blocks
            .get(name)
            .copied()
            .ok_or_else(|| c.error(format!("unknown block '{name}'")))
    }

    fn operand(&mut self, c: &mut Cursor<'t>) -> EirResult<ValueId> {
        if c.peek() == Some('#') {
            self.constant(c)
        } else {
            self.value(c)
        }
    }

    /// `%name[:kind][@location]`
    fn value(&mut self, c: &mut Cursor<'t>) -> EirResult<ValueId> {
        c.expect('%')?;
        let name = c.word()?;
        let kind = if c.eat(':') { Some(c.kind()?) } else { None };
        if c.eat('@') {
            c.take_while(|ch| is_name_char(ch) || ch == '[' || ch == ']');
        }
        match (self.values.get(name).copied(), kind) {
            (Some(value), Some(kind)) if self.method.value(value).kind() != kind => Err(c.error(format!(
                "%{name} is a {}, not a {kind}",
                self.method.value(value).kind()
            ))),
            (Some(value), _) => Ok(value),
            (None, Some(kind)) => {
                let value = self.method.new_named_variable(kind, name);
                self.values.insert(name, value);
                Ok(value)
            }
            (None, None) => Err(c.error(format!("first use of %{name} needs a kind"))),
        }
    }

    /// `#literal[:kind]`
    fn constant(&mut self, c: &mut Cursor<'t>) -> EirResult<ValueId> {
        c.expect('#')?;
        let literal = c.take_while(|ch| ch.is_alphanumeric() || matches!(ch, '.' | '-' | '+'));
        let kind = if c.eat(':') { Some(c.kind()?) } else { None };
        let bad = || c.error(format!("bad constant '#{literal}'"));
        let constant = match kind {
            _ if literal == "null" => {
                if kind.is_some_and(|kind| !kind.is_reference()) {
                    return Err(bad());
                }
                ConstantValue::null()
            }
            Some(Kind::Float) => {
                let value: f32 = literal.parse().map_err(|_| bad())?;
                ConstantValue::new(Kind::Float, value.to_bits() as i64)
            }
            Some(Kind::Double) => ConstantValue::double(literal.parse().map_err(|_| bad())?),
            Some(Kind::Void) => return Err(bad()),
            Some(kind) => ConstantValue::new(kind, literal.parse().map_err(|_| bad())?),
            None if literal.contains('.') => ConstantValue::double(literal.parse().map_err(|_| bad())?),
            None => {
                let value: i64 = literal.parse().map_err(|_| bad())?;
                match i32::try_from(value) {
                    Ok(int) => ConstantValue::int(int),
                    Err(_) => ConstantValue::long(value),
                }
            }
        };
        Ok(self.method.new_constant(constant))
    }
}
