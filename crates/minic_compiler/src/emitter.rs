use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::{fmt, fs, io};

use thiserror::Error;

use crate::ir::tac::{BasicBlock, Function, Instruction, Opcode, Program};
use crate::symbol::{symbol, Symbol};

/// System V AMD64 argument registers, in order.
const PARAM_REGISTERS: [&str; 6] = ["rdi", "rsi", "rdx", "rcx", "r8", "r9"];

#[derive(Debug, Error)]
pub enum EmitError {
  #[error("codegen error: failed to write '{path}': {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

#[derive(Debug, Default)]
pub struct Output {
  bytes: Vec<u8>,
}

impl Output {
  /// Creates a new output.
  pub fn new() -> Self {
    Self { bytes: Vec::new() }
  }

  /// Writes a string to the output.
  pub fn write(&mut self, text: impl AsRef<str>) {
    self.bytes.extend(text.as_ref().as_bytes());
  }

  /// Writes a newline-terminated string to the output.
  pub fn writeln(&mut self, text: impl AsRef<str>) {
    self.write(text);
    self.write("\n");
  }

  /// Returns the output as a byte vector.
  pub fn into_bytes(self) -> Vec<u8> {
    self.bytes
  }

  pub fn as_bytes(&self) -> &[u8] {
    &self.bytes
  }
}

impl fmt::Display for Output {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", String::from_utf8_lossy(&self.bytes))
  }
}

/// Assembly emitter. Emits x86-64 assembly using NASM (Intel) syntax.
///
/// Every variable and temporary of a function lives in an 8-byte stack slot addressed off `rbp`:
/// parameters first in declaration order, then the remaining names sorted alphabetically, with
/// the frame rounded up to 16 bytes. Values are shuttled through `rax`.
#[derive(Debug)]
pub struct Emitter {
  output: Output,
  /// Stack slot offsets off `rbp` for the current function.
  offsets: HashMap<Symbol, usize>,
  /// Reserved frame size of the current function.
  stack_size: usize,
  /// Block labels of the current function.
  labels: HashSet<Symbol>,
  /// Block labels of the current function, in declaration order.
  block_labels: Vec<Symbol>,
  /// Name of the function being emitted.
  current_function: Symbol,
  /// Label of the block being emitted.
  current_block: Symbol,
}

impl Emitter {
  pub fn new() -> Self {
    Self {
      output: Output::new(),
      offsets: HashMap::new(),
      stack_size: 0,
      labels: HashSet::new(),
      block_labels: Vec::new(),
      current_function: blank(),
      current_block: blank(),
    }
  }

  /// Emits assembly code for the given program.
  pub fn emit(mut self, program: &Program) -> Output {
    self.emit_program(program);

    self.output
  }

  /// Emits assembly code for the given program and writes it to the given file in one go.
  pub fn emit_to_file(
    self,
    program: &Program,
    path: impl AsRef<Path>,
  ) -> Result<Output, EmitError> {
    let output = self.emit(program);

    fs::write(&path, output.as_bytes()).map_err(|source| {
      EmitError::Io {
        path: path.as_ref().to_path_buf(),
        source,
      }
    })?;

    Ok(output)
  }
}

impl Emitter {
  /// Emits the program preamble followed by every function.
  ///
  /// The `_start` wrapper calls `main` and exits with its return value via the Linux `exit`
  /// syscall.
  fn emit_program(&mut self, program: &Program) {
    self.output.writeln("section .data");
    self.output.writeln("section .text");
    self.output.writeln("global _start");
    self.output.writeln("_start:");
    self.output.writeln("    call main");
    self.output.writeln("    mov rdi, rax");
    self.output.writeln("    mov rax, 60");
    self.output.writeln("    syscall");
    self.output.writeln("");

    for function in &program.functions {
      self.emit_function(function);
    }
  }

  /// Emits a function: prologue, parameter pickup, blocks, and epilogue.
  fn emit_function(&mut self, function: &Function) {
    self.current_function = function.name;
    self.offsets.clear();
    self.labels.clear();
    self.block_labels.clear();

    for block in &function.blocks {
      self.block_labels.push(block.label);
      self.labels.insert(block.label);
    }

    self.allocate_stack(function);

    self.output.writeln(format!("{}:", function.name));
    self.output.writeln("    push rbp");
    self.output.writeln("    mov rbp, rsp");

    if self.stack_size > 0 {
      self.output.writeln(format!("    sub rsp, {}", self.stack_size));
    }

    // The first six parameters arrive in registers; extra ones are ignored.
    for (param, register) in function.params.iter().zip(PARAM_REGISTERS) {
      if let Some(offset) = self.offsets.get(param) {
        self.output.writeln(format!("    mov [rbp - {offset}], {register}"));
      }
    }

    for block in &function.blocks {
      self.emit_block(block);
    }

    self.output.writeln(format!("{}_epilogue:", self.current_function));
    self.output.writeln("    leave");
    self.output.writeln("    ret");
    self.output.writeln("");
  }

  /// Assigns stack slots to every name appearing in the function.
  fn allocate_stack(&mut self, function: &Function) {
    let mut names = HashSet::new();

    for block in &function.blocks {
      for instr in &block.instructions {
        for operand in [instr.result, instr.operand1, instr.operand2] {
          if self.needs_slot(&operand) {
            names.insert(operand);
          }
        }
      }
    }

    let mut locals: Vec<Symbol> = names
      .into_iter()
      .filter(|name| !function.params.contains(name))
      .collect();

    locals.sort_by_key(|name| name.to_string());

    let mut offset = 0;

    for param in &function.params {
      offset += 8;
      self.offsets.insert(*param, offset);
    }

    for local in &locals {
      offset += 8;
      self.offsets.insert(*local, offset);
    }

    // Keep the frame 16-byte aligned.
    self.stack_size = (offset + 15) / 16 * 16;
  }

  /// Returns `true` if the given operand needs a stack slot, i.e. it is not empty, not a decimal
  /// literal, and not a block label.
  fn needs_slot(&self, name: &Symbol) -> bool {
    !name.is_empty() && !is_literal(name) && !self.labels.contains(name)
  }

  /// Emits a block: its label, its instructions, and an explicit jump to the next block when the
  /// block does not end in a branch. Fall-through is never implicit.
  fn emit_block(&mut self, block: &BasicBlock) {
    self.current_block = block.label;
    self.output.writeln(format!("{}:", block.label));

    for instr in &block.instructions {
      self.emit_instruction(instr);
    }

    let falls_through = block
      .instructions
      .last()
      .map_or(true, |last| !last.is_branch());

    if falls_through {
      if let Some(next) = self.next_block_label() {
        self.output.writeln(format!("    jmp {next}"));
      }
    }
  }

  fn emit_instruction(&mut self, instr: &Instruction) {
    match instr.opcode {
      | Opcode::Assign => self.emit_assign(instr),
      | Opcode::Add => self.emit_arithmetic("add", instr),
      | Opcode::Sub => self.emit_arithmetic("sub", instr),
      | Opcode::Mul => self.emit_arithmetic("imul", instr),
      | Opcode::Div => self.emit_div(instr),
      | Opcode::Neg => self.emit_neg(instr),
      | Opcode::Not => self.emit_not(instr),
      | Opcode::Eq => self.emit_comparison("sete", instr),
      | Opcode::Neq => self.emit_comparison("setne", instr),
      | Opcode::Lt => self.emit_comparison("setl", instr),
      | Opcode::Gt => self.emit_comparison("setg", instr),
      | Opcode::Le => self.emit_comparison("setle", instr),
      | Opcode::Ge => self.emit_comparison("setge", instr),
      | Opcode::Jump => self.emit_jump(instr),
      | Opcode::JumpIf => self.emit_jump_if("jne", instr),
      | Opcode::JumpIfNot => self.emit_jump_if("je", instr),
      | Opcode::Return => self.emit_return(instr),
    }
  }

  fn emit_assign(&mut self, instr: &Instruction) {
    let result = self.translate_operand(&instr.result);

    if is_literal(&instr.operand1) {
      // Literals move directly; memory destinations need an explicit operand size.
      if result.contains("[rbp") {
        self.output.writeln(format!("    mov qword {result}, {}", instr.operand1));
      } else {
        self.output.writeln(format!("    mov {result}, {}", instr.operand1));
      }
    } else {
      let operand = self.translate_operand(&instr.operand1);

      self.output.writeln(format!("    mov rax, {operand}"));
      self.output.writeln(format!("    mov {result}, rax"));
    }
  }

  fn emit_arithmetic(&mut self, mnemonic: &str, instr: &Instruction) {
    let result = self.translate_operand(&instr.result);
    let left = self.translate_operand(&instr.operand1);
    let right = self.translate_operand(&instr.operand2);

    self.output.writeln(format!("    mov rax, {left}"));
    self.output.writeln(format!("    {mnemonic} rax, {right}"));
    self.output.writeln(format!("    mov {result}, rax"));
  }

  fn emit_div(&mut self, instr: &Instruction) {
    let result = self.translate_operand(&instr.result);
    let left = self.translate_operand(&instr.operand1);
    let right = self.translate_operand(&instr.operand2);

    self.output.writeln(format!("    mov rax, {left}"));
    self.output.writeln("    cqo");
    self.output.writeln(format!("    mov rbx, {right}"));
    self.output.writeln("    idiv rbx");
    self.output.writeln(format!("    mov {result}, rax"));
  }

  fn emit_neg(&mut self, instr: &Instruction) {
    let result = self.translate_operand(&instr.result);
    let operand = self.translate_operand(&instr.operand1);

    self.output.writeln(format!("    mov rax, {operand}"));
    self.output.writeln("    neg rax");
    self.output.writeln(format!("    mov {result}, rax"));
  }

  fn emit_not(&mut self, instr: &Instruction) {
    let result = self.translate_operand(&instr.result);
    let operand = self.translate_operand(&instr.operand1);

    self.output.writeln(format!("    mov rax, {operand}"));
    self.output.writeln("    test rax, rax");
    self.output.writeln("    setz al");
    self.output.writeln("    movzx rax, al");
    self.output.writeln(format!("    mov {result}, rax"));
  }

  fn emit_comparison(&mut self, mnemonic: &str, instr: &Instruction) {
    let result = self.translate_operand(&instr.result);
    let left = self.translate_operand(&instr.operand1);
    let right = self.translate_operand(&instr.operand2);

    self.output.writeln(format!("    mov rax, {left}"));
    self.output.writeln(format!("    cmp rax, {right}"));
    self.output.writeln(format!("    {mnemonic} al"));
    self.output.writeln("    movzx rax, al");
    self.output.writeln(format!("    mov {result}, rax"));
  }

  fn emit_jump(&mut self, instr: &Instruction) {
    let target = if instr.operand1.is_empty() {
      self.infer_target()
    } else {
      Some(instr.operand1)
    };

    match target {
      | Some(target) => self.output.writeln(format!("    jmp {target}")),
      | None => self.emit_missing_target(),
    }
  }

  fn emit_jump_if(&mut self, mnemonic: &str, instr: &Instruction) {
    let condition = self.translate_operand(&instr.operand1);

    let target = if instr.operand2.is_empty() {
      self.infer_target()
    } else {
      Some(instr.operand2)
    };

    self.output.writeln(format!("    mov rax, {condition}"));
    self.output.writeln("    cmp rax, 0");

    match target {
      | Some(target) => self.output.writeln(format!("    {mnemonic} {target}")),
      | None => self.emit_missing_target(),
    }
  }

  fn emit_return(&mut self, instr: &Instruction) {
    if !instr.operand1.is_empty() {
      let operand = self.translate_operand(&instr.operand1);
      self.output.writeln(format!("    mov rax, {operand}"));
    }

    self.output.writeln(format!("    jmp {}_epilogue", self.current_function));
  }

  fn emit_missing_target(&mut self) {
    self.output.writeln(format!(
      "    ; missing jump target in {} {}",
      self.current_function, self.current_block
    ));
  }

  /// Resolves an operand to its assembly representation: empty operands become `0`, decimal
  /// literals and labels pass through, and everything else resolves to its stack slot. Names the
  /// slot collection missed get one lazily.
  fn translate_operand(&mut self, name: &Symbol) -> String {
    if name.is_empty() {
      return "0".to_string();
    }

    if is_literal(name) || self.labels.contains(name) {
      return name.to_string();
    }

    if let Some(offset) = self.offsets.get(name) {
      return format!("[rbp - {offset}]");
    }

    let offset = self.stack_size + 8;

    self.stack_size = offset;
    self.offsets.insert(*name, offset);

    format!("[rbp - {offset}]")
  }

  /// Guesses the target of a jump with no explicit label: a block whose label mentions `body`
  /// jumps back to the first label mentioning `cond`, anything else falls through to the next
  /// block in declaration order.
  fn infer_target(&self) -> Option<Symbol> {
    if self.current_block.contains("body") {
      if let Some(label) = self
        .block_labels
        .iter()
        .find(|label| label.contains("cond"))
      {
        return Some(*label);
      }
    }

    self.next_block_label()
  }

  /// Returns the label of the block following the current one in declaration order.
  fn next_block_label(&self) -> Option<Symbol> {
    let index = self
      .block_labels
      .iter()
      .position(|label| *label == self.current_block)?;

    self.block_labels.get(index + 1).copied()
  }
}

/// Returns `true` if the given name is a decimal integer literal.
fn is_literal(name: &Symbol) -> bool {
  !name.is_empty() && name.bytes().all(|byte| byte.is_ascii_digit())
}

/// The empty operand.
fn blank() -> Symbol {
  symbol("")
}

#[cfg(test)]
mod tests {
  use indoc::indoc;

  use super::*;
  use crate::analysis::SemanticPass;
  use crate::ir::ast::Type;
  use crate::ir::tac::LoweringPass;
  use crate::lexer::Lexer;
  use crate::parser::Parser;

  fn compile(input: impl AsRef<str>) -> String {
    let mut lexer = Lexer::new(input.as_ref().trim().as_bytes());
    let tokens = lexer.lex().expect("should lex");
    let program = Parser::new(tokens).parse().expect("should parse");

    SemanticPass::new().run(&program).expect("should analyze");

    let tac = LoweringPass::new().lower(&program).expect("should lower");

    Emitter::new().emit(&tac).to_string()
  }

  fn instruction(opcode: Opcode, result: &str, operand1: &str, operand2: &str) -> Instruction {
    Instruction::new(opcode, symbol(result), symbol(operand1), symbol(operand2))
  }

  fn block(label: &str, instructions: Vec<Instruction>) -> BasicBlock {
    BasicBlock {
      label: symbol(label),
      instructions,
    }
  }

  fn function(name: &str, params: Vec<&str>, blocks: Vec<BasicBlock>) -> Function {
    Function {
      name: symbol(name),
      return_type: Type::Int,
      params: params.into_iter().map(symbol).collect(),
      blocks,
    }
  }

  fn emit(functions: Vec<Function>) -> String {
    Emitter::new().emit(&Program { functions }).to_string()
  }

  #[test]
  fn emit_preamble() {
    let assembly = compile("int main() { return 0; }");

    let expected = indoc! {"
      section .data
      section .text
      global _start
      _start:
          call main
          mov rdi, rax
          mov rax, 60
          syscall
    "};

    assert!(assembly.starts_with(expected));
  }

  #[test]
  fn emit_return_constant() {
    let assembly = compile("int main() { return 0; }");

    let expected = indoc! {"
      section .data
      section .text
      global _start
      _start:
          call main
          mov rdi, rax
          mov rax, 60
          syscall

      main:
          push rbp
          mov rbp, rsp
          sub rsp, 16
      entry_0:
          mov qword [rbp - 8], 0
          mov rax, [rbp - 8]
          jmp main_epilogue
      main_epilogue:
          leave
          ret
    "};

    assert_eq!(assembly.trim_end(), expected.trim_end());
  }

  #[test]
  fn emit_one_label_pair_per_function() {
    let assembly = compile("int f() { return 1; } int main() { return 0; }");

    for label in ["f:", "f_epilogue:", "main:", "main_epilogue:"] {
      let count = assembly
        .lines()
        .filter(|line| line.trim_end() == label)
        .count();

      assert_eq!(count, 1, "label {label}");
    }
  }

  #[test]
  fn emit_parameter_pickup() {
    let assembly = compile("int add(int a, int b) { return a + b; }");

    assert!(assembly.contains("    mov [rbp - 8], rdi"));
    assert!(assembly.contains("    mov [rbp - 16], rsi"));
  }

  #[test]
  fn emit_extra_parameters_are_ignored() {
    let assembly = compile(
      "int f(int a, int b, int c, int d, int e, int g, int h) { return a; }",
    );

    let pickups = assembly
      .lines()
      .filter(|line| {
        let line = line.trim_start();

        line.starts_with("mov [rbp - ")
          && PARAM_REGISTERS
            .iter()
            .any(|register| line.ends_with(&format!(", {register}")))
      })
      .count();

    assert_eq!(pickups, 6);
  }

  #[test]
  fn emit_slot_layout() {
    // Slots: parameter first, then locals sorted by name (a, t0, t1, z).
    let assembly = compile("int f(int p) { int z = 1; int a = 2; return p; }");

    assert!(assembly.contains("    sub rsp, 48"));
    // t0 holds the literal 1 and lands in the second local slot.
    assert!(assembly.contains("    mov qword [rbp - 24], 1"));
    // z is the last local slot.
    assert!(assembly.contains("    mov [rbp - 40], rax"));
    // p is read from the first parameter slot.
    assert!(assembly.contains("    mov rax, [rbp - 8]"));
  }

  #[test]
  fn emit_division() {
    let assembly = compile("int main() { return 7 / 2; }");

    assert!(assembly.contains("    cqo"));
    assert!(assembly.contains("    idiv rbx"));
  }

  #[test]
  fn emit_comparison_uses_setcc() {
    let assembly = compile("int main() { return 1 < 2; }");

    assert!(assembly.contains("    cmp rax, "));
    assert!(assembly.contains("    setl al"));
    assert!(assembly.contains("    movzx rax, al"));
  }

  #[test]
  fn emit_logical_not() {
    let assembly = compile("int main() { return !1; }");

    assert!(assembly.contains("    test rax, rax"));
    assert!(assembly.contains("    setz al"));
  }

  #[test]
  fn emit_branches() {
    let assembly = compile(indoc! {"
      int main() {
        int x = 0;

        if (x > 0) {
          return 1;
        } else {
          return 0;
        }
      }
    "});

    assert!(assembly.contains("    je if_else_1"));
    assert!(assembly.contains("    jmp if_end_2"));
  }

  #[test]
  fn emit_loop() {
    let assembly = compile(indoc! {"
      int main() {
        int i = 0;

        while (i < 10) {
          i = i + 1;
        }

        return i;
      }
    "});

    assert!(assembly.contains("    jmp while_cond_0"));
    assert!(assembly.contains("    je while_end_2"));
  }

  #[test]
  fn emit_explicit_fall_through() {
    let assembly = emit(vec![function(
      "f",
      vec![],
      vec![
        block("first_0", vec![instruction(Opcode::Assign, "x", "1", "")]),
        block("second_1", vec![instruction(Opcode::Return, "", "x", "")]),
      ],
    )]);

    assert!(assembly.contains("    jmp second_1"));
  }

  #[test]
  fn emit_empty_block_falls_through() {
    let assembly = emit(vec![function(
      "f",
      vec![],
      vec![
        block("first_0", vec![]),
        block("second_1", vec![instruction(Opcode::Return, "", "", "")]),
      ],
    )]);

    assert!(assembly.contains("first_0:\n    jmp second_1"));
  }

  #[test]
  fn emit_inferred_loop_target() {
    // A jump with no explicit target in a body block goes back to the condition block.
    let assembly = emit(vec![function(
      "f",
      vec![],
      vec![
        block("loop_cond_0", vec![instruction(Opcode::Return, "", "", "")]),
        block("loop_body_1", vec![instruction(Opcode::Jump, "", "", "")]),
      ],
    )]);

    assert!(assembly.contains("loop_body_1:\n    jmp loop_cond_0"));
  }

  #[test]
  fn emit_inferred_next_target() {
    let assembly = emit(vec![function(
      "f",
      vec![],
      vec![
        block("first_0", vec![instruction(Opcode::Jump, "", "", "")]),
        block("second_1", vec![instruction(Opcode::Return, "", "", "")]),
      ],
    )]);

    assert!(assembly.contains("first_0:\n    jmp second_1"));
  }

  #[test]
  fn emit_is_deterministic() {
    let input = indoc! {"
      int main() {
        int acc = 0;
        int i = 0;

        while (i < 5) {
          if (i == 3) {
            acc = acc + 2;
          } else {
            acc = acc + 1;
          }

          i = i + 1;
        }

        return acc;
      }
    "};

    assert_eq!(compile(input), compile(input));
  }

  #[test]
  fn emit_to_file_writes_output() {
    let mut lexer = Lexer::new(b"int main() { return 0; }" as &[u8]);
    let tokens = lexer.lex().expect("should lex");
    let program = Parser::new(tokens).parse().expect("should parse");
    let tac = LoweringPass::new().lower(&program).expect("should lower");

    let path = std::env::temp_dir().join(format!("minic_emit_{}.asm", std::process::id()));
    let output = Emitter::new()
      .emit_to_file(&tac, &path)
      .expect("should write");

    let written = fs::read(&path).expect("should read back");

    assert_eq!(written, output.as_bytes());

    let _ = fs::remove_file(&path);
  }
}
