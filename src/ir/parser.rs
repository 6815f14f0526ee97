//! HIR text parser.
//!
//! Values and blocks may be referenced before they are defined (phis on loop
//! headers need this), so references are recorded as pending resolves and
//! patched once the whole method has been read.

use std::collections::HashMap;

use super::*;

pub fn parse_methods(text: &str) -> Result<Vec<Graph>, ParseError> {
    let mut parser = Parser::new(text);
    let mut methods = Vec::new();
    parser.skip_whitespace(true);
    while !parser.is_eof() {
        methods.push(parser.parse_method()?);
        parser.skip_whitespace(true);
    }
    Ok(methods)
}

pub fn parse_method(text: &str) -> Result<Graph, ParseError> {
    let mut methods = parse_methods(text)?;
    match methods.len() {
        1 => Ok(methods.remove(0)),
        n => Err(ParseError {
            line: 1,
            message: format!("expected exactly one method, found {}", n),
        }),
    }
}

const UNRESOLVED: InstId = InstId(u32::MAX);
const UNRESOLVED_BLOCK: BlockId = BlockId(u32::MAX);

#[derive(Debug, Clone, Copy)]
enum Slot {
    Input(usize),
    Env(usize),
}

#[derive(Debug)]
struct ValueResolve<'a> {
    name: &'a str,
    inst: InstId,
    slot: Slot,
    pos: usize,
}

#[derive(Debug)]
struct BlockResolve<'a> {
    name: &'a str,
    inst: InstId,
    index: usize,
    pos: usize,
}

enum Operand<'a> {
    Value(&'a str),
    Block(&'a str),
    Field(&'a str, &'a str),
    Integer(i64),
    Attribute(&'a str),
}

struct Parser<'a> {
    text: &'a str,
    pos: usize,
    graph: Graph,

    // Per-method maps
    blocks: HashMap<&'a str, BlockId>,
    values: HashMap<&'a str, InstId>,
    value_resolves: Vec<ValueResolve<'a>>,
    block_resolves: Vec<BlockResolve<'a>>,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            pos: 0,
            graph: Graph::default(),
            blocks: HashMap::new(),
            values: HashMap::new(),
            value_resolves: Vec::new(),
            block_resolves: Vec::new(),
        }
    }

    fn error_at<T>(&self, pos: usize, message: impl Into<String>) -> Result<T, ParseError> {
        let end = pos.min(self.text.len());
        let line = self.text[..end].matches('\n').count() + 1;
        Err(ParseError {
            line,
            message: message.into(),
        })
    }

    fn error<T>(&self, message: impl Into<String>) -> Result<T, ParseError> {
        self.error_at(self.pos, message)
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn current_char(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current_char() {
            self.pos += ch.len_utf8();
        }
    }

    fn skip_whitespace(&mut self, skip_newlines: bool) {
        while let Some(ch) = self.current_char() {
            if ch == ';' {
                // Comment runs to the end of the line
                while let Some(ch) = self.current_char() {
                    if ch == '\n' {
                        break;
                    }
                    self.advance();
                }
            } else if ch.is_whitespace() {
                if ch == '\n' && !skip_newlines {
                    break;
                }
                self.advance();
            } else {
                break;
            }
        }
    }

    fn try_read(&mut self, ch: char) -> bool {
        self.skip_whitespace(false);
        if self.current_char() == Some(ch) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, ch: char) -> Result<(), ParseError> {
        if !self.try_read(ch) {
            return self.error(format!(
                "expected '{}' but found {:?}",
                ch,
                self.current_char()
            ));
        }
        Ok(())
    }

    fn at_line_end(&mut self) -> bool {
        self.skip_whitespace(false);
        matches!(self.current_char(), None | Some('\n'))
    }

    fn read_identifier(&mut self) -> Result<&'a str, ParseError> {
        self.skip_whitespace(false);
        let start = self.pos;
        match self.current_char() {
            Some(ch) if ch.is_alphabetic() || ch == '_' => {}
            Some(ch) => return self.error(format!("expected identifier but found '{}'", ch)),
            None => return self.error("expected identifier but found end of input"),
        }
        while let Some(ch) = self.current_char() {
            if ch.is_alphanumeric() || ch == '_' {
                self.advance();
            } else {
                break;
            }
        }
        Ok(&self.text[start..self.pos])
    }

    fn read_value_name(&mut self) -> Result<&'a str, ParseError> {
        self.expect('%')?;
        self.read_identifier()
    }

    fn read_block_name(&mut self) -> Result<&'a str, ParseError> {
        self.expect('^')?;
        self.read_identifier()
    }

    fn read_type(&mut self) -> Result<DataType, ParseError> {
        let start = self.pos;
        let name = self.read_identifier()?;
        match DataType::from_name(name) {
            Some(ty) => Ok(ty),
            None => self.error_at(start, format!("unknown type '{}'", name)),
        }
    }

    fn read_integer(&mut self) -> Result<i64, ParseError> {
        self.skip_whitespace(false);
        let start = self.pos;
        let negative = self.current_char() == Some('-');
        if negative {
            self.advance();
        }
        let digits_start = self.pos;
        let is_hex = self.text[self.pos..].starts_with("0x");
        if is_hex {
            self.pos += 2;
        }
        while let Some(ch) = self.current_char() {
            if ch.is_ascii_hexdigit() && (is_hex || ch.is_ascii_digit()) {
                self.advance();
            } else {
                break;
            }
        }
        let digits = &self.text[digits_start..self.pos];
        let parsed = if is_hex {
            i64::from_str_radix(&digits[2..], 16)
        } else {
            digits.parse()
        };
        match parsed {
            Ok(value) if negative => Ok(-value),
            Ok(value) => Ok(value),
            Err(e) => self.error_at(start, format!("invalid number '{}': {}", digits, e)),
        }
    }

    /// Whether the upcoming tokens start a new block (`label:` or `try label:`)
    /// or close the method.
    fn is_at_block_end(&mut self) -> bool {
        self.skip_whitespace(true);
        match self.current_char() {
            None | Some('}') => return true,
            Some(ch) if !ch.is_alphabetic() => return false,
            _ => {}
        }
        let saved = self.pos;
        let is_label = match self.read_identifier() {
            Ok("try") => true,
            Ok(_) => self.current_char() == Some(':'),
            Err(_) => false,
        };
        self.pos = saved;
        is_label
    }

    fn parse_method(&mut self) -> Result<Graph, ParseError> {
        let start = self.pos;
        if self.read_identifier()? != "method" {
            return self.error_at(start, "expected 'method'");
        }
        let name = self.read_identifier()?;

        self.graph = Graph::new(name);
        self.blocks.clear();
        self.values.clear();
        self.value_resolves.clear();
        self.block_resolves.clear();

        // Parameters become the first instructions of the entry block.
        let mut params = Vec::new();
        self.expect('(')?;
        if !self.try_read(')') {
            loop {
                self.skip_whitespace(true);
                let param = self.read_value_name()?;
                self.expect(':')?;
                let ty = self.read_type()?;
                params.push((param, ty));
                self.skip_whitespace(true);
                if self.try_read(')') {
                    break;
                }
                self.expect(',')?;
            }
        }
        self.skip_whitespace(true);
        self.expect('{')?;

        while !self.is_at_block_end() {
            self.parse_instruction()?;
        }
        self.skip_whitespace(true);
        if self.is_eof() {
            return self.error("unterminated method body");
        }
        if self.graph.blocks.is_empty() && self.current_char() == Some('}') {
            return self.error("method has no blocks");
        }

        let mut first = true;
        while self.current_char() != Some('}') {
            self.parse_block(if first { Some(params.as_slice()) } else { None })?;
            first = false;
            self.skip_whitespace(true);
            if self.is_eof() {
                return self.error("unterminated method body");
            }
        }
        self.advance();

        self.resolve_references()?;
        self.verify()?;

        let mut graph = std::mem::take(&mut self.graph);
        graph.finalize();
        Ok(graph)
    }

    fn parse_block(&mut self, params: Option<&[(&'a str, DataType)]>) -> Result<(), ParseError> {
        self.skip_whitespace(true);
        let start = self.pos;
        let mut label = self.read_identifier()?;
        let in_try = label == "try";
        if in_try {
            label = self.read_identifier()?;
        }
        self.expect(':')?;

        if self.blocks.contains_key(label) {
            return self.error_at(start, format!("duplicate block '{}'", label));
        }
        let block = self.graph.add_block(label);
        self.graph.block_mut(block).in_try = in_try;
        self.blocks.insert(label, block);

        if let Some(params) = params {
            for (index, (name, ty)) in params.iter().enumerate() {
                let (name, ty) = (*name, *ty);
                let id = self.graph.append(
                    block,
                    name,
                    InstructionKind::Parameter(index as u32),
                    ty,
                    &[],
                );
                self.define_value(name, id, start)?;
            }
        }

        while !self.is_at_block_end() {
            self.parse_instruction()?;
        }
        Ok(())
    }

    fn define_value(&mut self, name: &'a str, id: InstId, pos: usize) -> Result<(), ParseError> {
        if self.values.insert(name, id).is_some() {
            return self.error_at(pos, format!("value %{} defined twice", name));
        }
        Ok(())
    }

    fn current_block(&self, pos: usize) -> Result<BlockId, ParseError> {
        match self.graph.blocks.len() {
            0 => self.error_at(pos, "instruction outside of a block"),
            n => Ok(BlockId(n as u32 - 1)),
        }
    }

    fn parse_instruction(&mut self) -> Result<(), ParseError> {
        self.skip_whitespace(true);
        let start = self.pos;
        let block = self.current_block(start)?;

        let mut name = "";
        if self.current_char() == Some('%') {
            name = self.read_value_name()?;
            self.expect('=')?;
        }

        let mnemonic_pos = self.pos;
        let mnemonic = self.read_identifier()?;
        let ty = if self.current_char() == Some('.') {
            self.advance();
            self.read_type()?
        } else {
            DataType::Void
        };

        let mut kind = match mnemonic {
            "const" => InstructionKind::Constant(0),
            "param" => {
                return self.error_at(mnemonic_pos, "parameters are declared in the method header")
            }
            other => match InstructionKind::from_mnemonic(other) {
                Some(kind) => kind,
                None => {
                    return self.error_at(mnemonic_pos, format!("unknown instruction '{}'", other))
                }
            },
        };

        if !name.is_empty() && !kind.produces_value(ty) {
            return self.error_at(start, format!("%{} names an instruction without a result", name));
        }

        let id = self.graph.append(block, name, kind, ty, &[]);
        if !name.is_empty() {
            self.define_value(name, id, start)?;
        }

        if kind == InstructionKind::Phi {
            return self.parse_phi_operands(id);
        }

        let mut inputs = 0;
        let mut block_operands = 0;
        let mut has_immediate = false;
        let mut is_volatile = false;
        let mut field = None;
        let mut first = true;
        while !self.at_line_end() {
            if self.text[self.pos..].starts_with("env(") {
                self.pos += "env".len();
                self.parse_environment(id)?;
                continue;
            }
            if !first {
                self.expect(',')?;
            }
            first = false;

            let operand_pos = self.pos;
            match self.parse_operand()? {
                Operand::Value(value) => {
                    self.value_resolves.push(ValueResolve {
                        name: value,
                        inst: id,
                        slot: Slot::Input(inputs),
                        pos: operand_pos,
                    });
                    self.graph.inst_mut(id).inputs.push(UNRESOLVED);
                    inputs += 1;
                }
                Operand::Block(target) => {
                    self.block_resolves.push(BlockResolve {
                        name: target,
                        inst: id,
                        index: block_operands,
                        pos: operand_pos,
                    });
                    self.graph.inst_mut(id).block_operands.push(UNRESOLVED_BLOCK);
                    block_operands += 1;
                }
                Operand::Field(owner, field_name) => {
                    if !kind.is_field_access() {
                        return self.error_at(operand_pos, "field operand on a non-field access");
                    }
                    field = Some((owner, field_name));
                }
                Operand::Integer(value) => match &mut kind {
                    InstructionKind::Constant(imm) if !has_immediate => {
                        *imm = value;
                        has_immediate = true;
                    }
                    _ => return self.error_at(operand_pos, "unexpected immediate operand"),
                },
                Operand::Attribute("volatile") if kind.is_field_access() => is_volatile = true,
                Operand::Attribute(attr) => match (&mut kind, attr) {
                    (InstructionKind::NewInstance { string_alloc }, "stringalloc") => {
                        *string_alloc = true
                    }
                    (InstructionKind::Vec(VecOp::Load { string_char_at }), "charat") => {
                        *string_char_at = true
                    }
                    _ => {
                        return self.error_at(operand_pos, format!("unexpected attribute '{}'", attr))
                    }
                },
            }
        }

        if kind.is_constant() && !has_immediate {
            return self.error_at(start, "constant without a value");
        }
        if kind.is_field_access() {
            match field {
                Some((owner, field_name)) => {
                    let field = self.graph.add_field(owner, field_name, is_volatile);
                    self.graph.inst_mut(id).field = Some(field);
                }
                None => return self.error_at(start, "field access without a field operand"),
            }
        }
        self.graph.inst_mut(id).kind = kind;
        Ok(())
    }

    fn parse_operand(&mut self) -> Result<Operand<'a>, ParseError> {
        self.skip_whitespace(false);
        match self.current_char() {
            Some('%') => Ok(Operand::Value(self.read_value_name()?)),
            Some('^') => Ok(Operand::Block(self.read_block_name()?)),
            Some('@') => {
                self.advance();
                let owner = self.read_identifier()?;
                self.expect('.')?;
                let field = self.read_identifier()?;
                Ok(Operand::Field(owner, field))
            }
            Some(ch) if ch == '-' || ch.is_ascii_digit() => Ok(Operand::Integer(self.read_integer()?)),
            Some(ch) if ch.is_alphabetic() => Ok(Operand::Attribute(self.read_identifier()?)),
            other => self.error(format!("unexpected operand start {:?}", other)),
        }
    }

    fn parse_environment(&mut self, id: InstId) -> Result<(), ParseError> {
        self.expect('(')?;
        let mut index = 0;
        if self.try_read(')') {
            return Ok(());
        }
        loop {
            let pos = self.pos;
            let value = self.read_value_name()?;
            self.value_resolves.push(ValueResolve {
                name: value,
                inst: id,
                slot: Slot::Env(index),
                pos,
            });
            self.graph.inst_mut(id).environment.push(UNRESOLVED);
            index += 1;
            if self.try_read(')') {
                return Ok(());
            }
            self.expect(',')?;
        }
    }

    fn parse_phi_operands(&mut self, id: InstId) -> Result<(), ParseError> {
        let mut index = 0;
        loop {
            self.expect('[')?;
            let block_pos = self.pos;
            let incoming = self.read_block_name()?;
            self.expect(',')?;
            let value_pos = self.pos;
            let value = self.read_value_name()?;
            self.expect(']')?;

            self.block_resolves.push(BlockResolve {
                name: incoming,
                inst: id,
                index,
                pos: block_pos,
            });
            self.value_resolves.push(ValueResolve {
                name: value,
                inst: id,
                slot: Slot::Input(index),
                pos: value_pos,
            });
            let inst = self.graph.inst_mut(id);
            inst.block_operands.push(UNRESOLVED_BLOCK);
            inst.inputs.push(UNRESOLVED);
            index += 1;

            if self.at_line_end() {
                return Ok(());
            }
            self.expect(',')?;
        }
    }

    fn resolve_references(&mut self) -> Result<(), ParseError> {
        for resolve in &self.value_resolves {
            let Some(&value) = self.values.get(resolve.name) else {
                return self.error_at(resolve.pos, format!("undefined value %{}", resolve.name));
            };
            let inst = self.graph.inst_mut(resolve.inst);
            match resolve.slot {
                Slot::Input(idx) => inst.inputs[idx] = value,
                Slot::Env(idx) => inst.environment[idx] = value,
            }
        }
        for resolve in &self.block_resolves {
            let Some(&block) = self.blocks.get(resolve.name) else {
                return self.error_at(resolve.pos, format!("undefined block ^{}", resolve.name));
            };
            self.graph.inst_mut(resolve.inst).block_operands[resolve.index] = block;
        }
        Ok(())
    }

    /// Structural checks: every block ends in exactly one control flow
    /// instruction with the right number of targets, and only produced
    /// values are used.
    fn verify(&self) -> Result<(), ParseError> {
        let fail = |message: String| Err(ParseError { line: 0, message });
        for block in &self.graph.blocks {
            let Some(last) = block.last_instruction() else {
                return fail(format!("block {} is empty", block.name));
            };
            for id in &block.instructions {
                let inst = self.graph.inst(*id);
                if inst.kind.is_control_flow() != (*id == last) {
                    return fail(format!(
                        "block {} must end with its only control flow instruction",
                        block.name
                    ));
                }
                let targets = match inst.kind {
                    InstructionKind::Goto => 1,
                    InstructionKind::If => 2,
                    _ => 0,
                };
                if inst.block_operands.len() != targets {
                    return fail(format!(
                        "{} in block {} expects {} block operand(s)",
                        inst.kind.mnemonic(),
                        block.name,
                        targets
                    ));
                }
            }
            for phi in &block.phis {
                if self.graph.inst(*phi).inputs.is_empty() {
                    return fail(format!("phi in block {} has no inputs", block.name));
                }
            }
        }
        for inst in &self.graph.instructions {
            for input in inst.inputs.iter().chain(&inst.environment) {
                let def = self.graph.inst(*input);
                if !def.kind.produces_value(def.ty) {
                    return fail(format!("%{} does not produce a value", def.name));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOOP: &str = r#"
; Sum of an int array
method sum(%arr: ref, %n: i32) {
entry:
  %zero = const.i32 0
  %one = const.i32 1
  goto ^header
header:
  %i = phi.i32 [^entry, %zero], [^body, %next]
  %acc = phi.i32 [^entry, %zero], [^body, %acc2]
  %done = ge.bool %i, %n
  if %done, ^exit, ^body
body:
  %len = alen.i32 %arr
  %idx = boundscheck.i32 %i, %len env(%i, %acc)
  %v = aget.i32 %arr, %idx
  %acc2 = add.i32 %acc, %v
  %next = add.i32 %i, %one
  goto ^header
exit:
  return.i32 %acc
}
"#;

    #[test]
    fn test_parse_loop() {
        let graph = Graph::parse(LOOP).unwrap();
        assert_eq!(graph.name, "sum");
        assert_eq!(graph.blocks.len(), 4);

        let entry = graph.block(BlockId(0));
        assert_eq!(entry.instructions.len(), 5);
        assert_eq!(graph.inst(entry.instructions[0]).kind, InstructionKind::Parameter(0));
        assert_eq!(graph.inst(entry.instructions[2]).kind, InstructionKind::Constant(0));

        let header = graph.block_by_name("header").unwrap();
        assert_eq!(graph.block(header).phis.len(), 2);
        assert!(graph.block(header).is_loop_header);

        let body = graph.block_by_name("body").unwrap();
        assert_eq!(graph.block(body).loop_header, Some(header));

        let i = graph.inst_by_name("i").unwrap();
        let next = graph.inst_by_name("next").unwrap();
        assert_eq!(graph.inst(i).inputs[1], next);
        assert!(graph.is_loop_header_phi(i));

        let idx = graph.inst_by_name("idx").unwrap();
        assert_eq!(graph.inst(idx).environment.len(), 2);
        assert!(graph.env_uses(i).contains(&idx));
    }

    #[test]
    fn test_parse_attributes_and_fields() {
        let graph = Graph::parse(
            r#"
method fields(%o: ref, %s: ref) {
entry:
  %a = iget.i32 %o, @Point.x
  %b = iget.i32 %o, @Point.y, volatile
  iset.i32 %o, %a, @Point.x
  %str = newinstance.ref stringalloc
  %c = vload.u16 %s, %a, charat
  returnvoid
}
"#,
        )
        .unwrap();

        let a = graph.inst(graph.inst_by_name("a").unwrap());
        let b = graph.inst(graph.inst_by_name("b").unwrap());
        assert_eq!(graph.field(a.field.unwrap()).name, "x");
        assert!(!graph.field(a.field.unwrap()).is_volatile);
        assert!(graph.field(b.field.unwrap()).is_volatile);
        assert!(b.side_effects.does_any_write());

        let str_alloc = graph.inst(graph.inst_by_name("str").unwrap());
        assert_eq!(str_alloc.kind, InstructionKind::NewInstance { string_alloc: true });
        let c = graph.inst(graph.inst_by_name("c").unwrap());
        assert_eq!(c.kind, InstructionKind::Vec(VecOp::Load { string_char_at: true }));
        assert_eq!(graph.fields.len(), 2);
    }

    #[test]
    fn test_parse_try_block_and_negative_constant() {
        let graph = Graph::parse(
            r#"
method m() {
entry:
  %c = const.i64 -0x10
  goto ^guarded
try guarded:
  returnvoid
}
"#,
        )
        .unwrap();
        assert_eq!(graph.as_constant(graph.inst_by_name("c").unwrap()), Some(-16));
        assert!(graph.block(graph.block_by_name("guarded").unwrap()).in_try);
    }

    #[test]
    fn test_parse_errors() {
        let err = Graph::parse("method m() {\nentry:\n  %a = frob.i32\n  returnvoid\n}").unwrap_err();
        assert_eq!(err.line, 3);
        assert!(err.message.contains("frob"));

        let err = Graph::parse("method m() {\nentry:\n  return.i32 %nope\n}").unwrap_err();
        assert!(err.message.contains("undefined value"));

        let err = Graph::parse("method m() {\nentry:\n  %c = const.i32 1\n}").unwrap_err();
        assert!(err.message.contains("control flow"));

        let err = Graph::parse("method m() {\nentry:\n  goto ^entry, ^entry\n}").unwrap_err();
        assert!(err.message.contains("block operand"));
    }

    #[test]
    fn test_print_round_trip() {
        let graph = Graph::parse(LOOP).unwrap();
        let printed = graph.to_string();
        assert!(printed.starts_with("method sum(%arr: ref, %n: i32) {"));
        assert!(printed.contains("  %i = phi.i32 [^entry, %zero], [^body, %next]"));
        assert!(printed.contains("  %idx = boundscheck.i32 %i, %len env(%i, %acc)"));

        let reparsed = Graph::parse(&printed).unwrap();
        assert_eq!(reparsed, graph);
    }

    #[test]
    fn test_parse_multiple_methods() {
        let methods = Graph::parse_all(
            "method a() {\nentry:\n  returnvoid\n}\nmethod b() {\nentry:\n  returnvoid\n}\n",
        )
        .unwrap();
        assert_eq!(methods.len(), 2);
        assert_eq!(methods[1].name, "b");
        assert!(Graph::parse("method a() {\nentry:\n  returnvoid\n}\nmethod b() {\nentry:\n  returnvoid\n}\n").is_err());
    }
}
