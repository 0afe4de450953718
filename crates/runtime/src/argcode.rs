//! Function-argument byte code (spec §4.8).
//!
//! Each callable's argument-spec block compiles once into a short
//! instruction stream; dispatching a call then just runs the stream
//! against the caller's remaining input, via the `ArgSource` callback
//! trait (so this module doesn't know about the evaluator's control
//! flow, only about fetching one more argument).

use boron_core::{BoronError, Cell, CellTag};

/// One instruction in a compiled argument program. Unlike the original's
/// flat byte array, each instruction carries its own immediate(s)
/// directly — `Vec<Instr>` plays the role of the byte buffer without
/// needing an alignment-padding `Nop`/`Nop2` pair.
#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    ClearLocal(u16),
    ClearLocalOpt(u16),
    FetchArg,
    LitArg,
    Variant(i32),
    CheckArg(u8),
    CheckArgMask([u32; 3]),
    Option { idx: u16, skip: u16 },
    End,
}

/// One entry in the option table carried at the program tail (spec
/// §4.8's "option table stored at the tail of the program buffer").
#[derive(Debug, Clone, Copy)]
pub struct OptionEntry {
    pub atom: u16,
    pub bit: u16,
}

#[derive(Debug, Clone)]
pub struct ArgProgram {
    pub instrs: Vec<Instr>,
    pub options: Vec<OptionEntry>,
    pub local_count: u16,
}

/// Source of caller-supplied arguments during dispatch.
pub trait ArgSource {
    /// Evaluate the next expression from the caller's input and return it.
    fn fetch_arg(&mut self) -> Result<Cell, BoronError>;
    /// Return the caller's current cell unevaluated, then advance.
    fn lit_arg(&mut self) -> Result<Cell, BoronError>;
}

/// One spec-block word, as seen by the compiler.
pub enum SpecWord {
    /// A plain argument name, e.g. `value`.
    Arg(u16),
    /// An argument name immediately followed by a type-restriction block,
    /// e.g. `value [int! string!]`.
    TypedArg(u16, [u32; 3]),
    /// A `'name` literal-argument marker.
    LitArg(u16),
    /// A `/name` option declaration.
    OptionDecl(u16),
    /// A plain local variable declared after `/local`.
    Local(u16),
}

/// Compile a declared argument spec into a byte program (spec §4.8).
pub fn compile(spec: &[SpecWord]) -> ArgProgram {
    let mut instrs = Vec::new();
    let mut options = Vec::new();
    let mut local_count = 0u16;
    let has_options = spec.iter().any(|w| matches!(w, SpecWord::OptionDecl(_)));

    if has_options {
        instrs.push(Instr::ClearLocalOpt(0));
    } else {
        instrs.push(Instr::ClearLocal(0));
    }

    let mut option_bit = 0u16;
    let mut pending_option: Option<usize> = None;

    for word in spec {
        match word {
            SpecWord::Arg(_name) => {
                instrs.push(Instr::FetchArg);
            }
            SpecWord::TypedArg(_name, mask) => {
                instrs.push(Instr::FetchArg);
                instrs.push(Instr::CheckArgMask(*mask));
            }
            SpecWord::LitArg(_name) => {
                instrs.push(Instr::LitArg);
            }
            SpecWord::OptionDecl(atom) => {
                options.push(OptionEntry { atom: *atom, bit: option_bit });
                instrs.push(Instr::Option { idx: option_bit, skip: 0 });
                pending_option = Some(instrs.len() - 1);
                option_bit += 1;
                continue;
            }
            SpecWord::Local(_name) => {
                local_count += 1;
            }
        }
        if let Some(idx) = pending_option.take() {
            if let Instr::Option { skip, .. } = &mut instrs[idx] {
                *skip = (instrs.len() - idx - 1) as u16;
            }
        }
    }
    // Close a trailing bare option declaration (no following args).
    if let Some(idx) = pending_option.take() {
        if let Instr::Option { skip, .. } = &mut instrs[idx] {
            *skip = (instrs.len() - idx - 1) as u16;
        }
    }

    if let Instr::ClearLocal(n) | Instr::ClearLocalOpt(n) = &mut instrs[0] {
        *n = local_count;
    }
    instrs.push(Instr::End);
    ArgProgram { instrs, options, local_count }
}

/// Run a compiled program against `source` and an options bitmask the
/// caller has already computed from its `/option` usage. Returns the
/// stack of argument cells pushed, in program order.
pub fn execute(program: &ArgProgram, options_mask: u32, source: &mut dyn ArgSource) -> Result<Vec<Cell>, BoronError> {
    let mut pushed = Vec::new();
    let mut locals_pushed = false;
    let mut pc = 0usize;
    while pc < program.instrs.len() {
        match &program.instrs[pc] {
            Instr::ClearLocal(n) | Instr::ClearLocalOpt(n) => {
                for _ in 0..*n {
                    pushed.push(Cell::none());
                }
                locals_pushed = true;
                pc += 1;
            }
            Instr::FetchArg => {
                pushed.push(source.fetch_arg()?);
                pc += 1;
            }
            Instr::LitArg => {
                pushed.push(source.lit_arg()?);
                pc += 1;
            }
            Instr::Variant(n) => {
                pushed.push(Cell::int(*n as i64));
                pc += 1;
            }
            Instr::CheckArg(type_id) => {
                let top = pushed.last().ok_or_else(|| BoronError::internal("argcode: CHECK_ARG with empty stack"))?;
                if top.tag != *type_id {
                    return Err(BoronError::type_(format!("expected {:?}, found tag {}", CellTag::from_u8(*type_id), top.tag)));
                }
                pc += 1;
            }
            Instr::CheckArgMask(mask) => {
                let top = pushed.last().ok_or_else(|| BoronError::internal("argcode: CHECK_ARG_MASK with empty stack"))?;
                if !mask_has(mask, top.tag) {
                    return Err(BoronError::type_("argument does not satisfy the declared type set"));
                }
                pc += 1;
            }
            Instr::Option { idx, skip } => {
                if options_mask & (1 << idx) == 0 {
                    pc += 1 + *skip as usize;
                } else {
                    pc += 1;
                }
            }
            Instr::End => break,
        }
    }
    let _ = locals_pushed;
    Ok(pushed)
}

fn mask_has(mask: &[u32; 3], type_id: u8) -> bool {
    let idx = (type_id / 32) as usize;
    idx < 3 && (mask[idx] & (1 << (type_id % 32))) != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource {
        values: Vec<Cell>,
    }
    impl ArgSource for FixedSource {
        fn fetch_arg(&mut self) -> Result<Cell, BoronError> {
            if self.values.is_empty() {
                return Err(BoronError::script("no more arguments"));
            }
            Ok(self.values.remove(0))
        }
        fn lit_arg(&mut self) -> Result<Cell, BoronError> {
            self.fetch_arg()
        }
    }

    #[test]
    fn untyped_args_are_pushed_in_order() {
        let program = compile(&[SpecWord::Arg(1), SpecWord::Arg(2)]);
        let mut source = FixedSource { values: vec![Cell::int(10), Cell::int(20)] };
        let pushed = execute(&program, 0, &mut source).unwrap();
        assert_eq!(pushed.iter().map(|c| c.as_int()).collect::<Vec<_>>(), vec![10, 20]);
    }

    #[test]
    fn typed_arg_rejects_wrong_type() {
        let mut mask = [0u32; 3];
        mask[0] |= 1 << (CellTag::Int as u8);
        let program = compile(&[SpecWord::TypedArg(1, mask)]);
        let mut source = FixedSource { values: vec![Cell::none()] };
        assert!(execute(&program, 0, &mut source).is_err());
    }

    #[test]
    fn typed_arg_accepts_declared_type() {
        let mut mask = [0u32; 3];
        mask[0] |= 1 << (CellTag::Int as u8);
        let program = compile(&[SpecWord::TypedArg(1, mask)]);
        let mut source = FixedSource { values: vec![Cell::int(5)] };
        let pushed = execute(&program, 0, &mut source).unwrap();
        assert_eq!(pushed[0].as_int(), 5);
    }

    #[test]
    fn option_gates_its_following_args_on_the_mask_bit() {
        let program = compile(&[SpecWord::Arg(1), SpecWord::OptionDecl(2), SpecWord::Arg(3)]);
        let mut source = FixedSource { values: vec![Cell::int(1), Cell::int(2)] };
        let pushed = execute(&program, 0, &mut source).unwrap();
        // option bit clear: the gated FetchArg is skipped.
        assert_eq!(pushed.len(), 1);

        let mut source = FixedSource { values: vec![Cell::int(1), Cell::int(2)] };
        let pushed = execute(&program, 0b1, &mut source).unwrap();
        assert_eq!(pushed.len(), 2);
    }

    #[test]
    fn locals_initialize_to_none() {
        let program = compile(&[SpecWord::Local(1), SpecWord::Local(2)]);
        let mut source = FixedSource { values: vec![] };
        let pushed = execute(&program, 0, &mut source).unwrap();
        assert_eq!(pushed.len(), 2);
        assert!(pushed.iter().all(|c| c.is(CellTag::None_)));
    }
}
