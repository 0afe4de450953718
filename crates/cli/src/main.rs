//! `boron` — the command-line front end for the interpreter core (spec
//! §6's CLI contract). Everything here is a thin harness over
//! `boron-runtime`: argument parsing, exit-code mapping, and a
//! read-eval-print loop that tokenizes each line, binds its top-level
//! words against the global context, and renders the resulting cells.
//!
//! Full expression evaluation (arithmetic, control flow, set-word
//! assignment) is the CFunc/evaluator surface that spec §1 explicitly
//! keeps outside the core; this binary stops at tokenize + bind, which is
//! as far as a harness with no cfunc dispatch table can go (see
//! DESIGN.md).

use std::io::{self, Write};
use std::process;

use clap::error::ErrorKind as ClapErrorKind;
use clap::Parser;

use boron_core::{Binding, BoronError, Cell, CellTag};
use boron_runtime::buffer::{BufferData, Env, Thread};
use boron_runtime::context::BindTarget;
use boron_runtime::tokenizer::{self, SourceEncoding};

const EXIT_OK: i32 = 0;
const EXIT_USAGE: i32 = 64;
const EXIT_ENV_INIT: i32 = 70;
const EXIT_ERROR: i32 = 1;

const ATOM_LIMIT: usize = 16_384;
const NAME_ARENA_LIMIT: usize = 1 << 20;
const REPL_TRUNCATE: usize = 156;

#[derive(Parser, Debug)]
#[command(name = "boron", version, about = "Boron language interpreter")]
struct Cli {
    /// Evaluate EXPR instead of running a script or entering the REPL.
    #[arg(short = 'e', value_name = "EXPR")]
    eval: Option<String>,

    /// Disable the interactive prompt; exit non-zero on unhandled exception.
    #[arg(short = 'p')]
    no_prompt: bool,

    /// Disable the security prompt (grant everything).
    #[arg(short = 's')]
    no_security_prompt: bool,

    /// Script path, followed by any arguments passed through to it.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    rest: Vec<String>,
}

fn main() {
    process::exit(run());
}

fn run() -> i32 {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => return exit_code_for_clap_error(&e),
    };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("boron=info".parse().unwrap()))
        .with_writer(io::stderr)
        .init();

    if cli.no_security_prompt {
        tracing::info!("security prompt disabled: all resource access is granted");
    }

    let mut env = Env::new(ATOM_LIMIT, NAME_ARENA_LIMIT);
    let mut thread = Thread::new();

    if let Err(e) = bind_args(&mut thread, &mut env, &cli.rest) {
        eprintln!("boron: failed to initialize environment: {e}");
        return EXIT_ENV_INIT;
    }

    if let Some(expr) = &cli.eval {
        return match eval_source(&mut thread, &mut env, expr.as_bytes()) {
            Ok(result) => {
                println!("{}", render_cell(&thread, &env, &result));
                EXIT_OK
            }
            Err(e) => {
                eprintln!("{}", render_trace(&e));
                EXIT_ERROR
            }
        };
    }

    if let Some(script_path) = cli.rest.first() {
        let source = match std::fs::read(script_path) {
            Ok(bytes) => bytes,
            Err(e) => {
                eprintln!("boron: {script_path}: {e}");
                return EXIT_ERROR;
            }
        };
        return match eval_source(&mut thread, &mut env, &source) {
            Ok(_) => EXIT_OK,
            Err(e) => {
                eprintln!("{}", render_trace(&e));
                EXIT_ERROR
            }
        };
    }

    if cli.no_prompt {
        return EXIT_OK;
    }

    repl(&mut thread, &mut env)
}

fn exit_code_for_clap_error(e: &clap::Error) -> i32 {
    match e.kind() {
        ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
            let _ = e.print();
            EXIT_OK
        }
        _ => {
            let _ = e.print();
            EXIT_USAGE
        }
    }
}

/// Tokenize `src` and bind the resulting block's words (recursively, into
/// any nested non-shared block/paren/path) against the global context,
/// returning the block cell itself. There is no cfunc dispatch to walk it
/// with, so "evaluation" here stops at binding.
fn eval_source(thread: &mut Thread, env: &mut Env, src: &[u8]) -> Result<Cell, BoronError> {
    let block_id = tokenizer::tokenize(thread, &mut env.atoms, src, SourceEncoding::Utf8)?;
    let ctx_n = env.global_ctx;
    let target = BindTarget {
        ctx_n,
        bind_type: Binding::Env,
        // No "self" word is exposed at this harness's top level.
        self_atom: u16::MAX,
    };
    thread.bind_buffer(env, block_id, ctx_n, target)?;
    Ok(Cell::series(CellTag::Block, block_id, 0, boron_core::NO_SLICE_END))
}

/// Expose `args` (everything after the script path, or the whole `rest`
/// list when no script is running) as a string block in the global
/// context, per spec §6.
fn bind_args(thread: &mut Thread, env: &mut Env, rest: &[String]) -> Result<(), BoronError> {
    let args_atom = env.atoms.intern("args")?;
    let trailing = if rest.is_empty() { rest } else { &rest[1..] };

    let mut cells = Vec::with_capacity(trailing.len());
    for arg in trailing {
        cells.push(make_string_cell(thread, arg));
    }
    let block_id = thread.gen_one(CellTag::Block as u8, 0, BufferData::Cells(cells));
    let args_cell = Cell::series(CellTag::Block, block_id, 0, boron_core::NO_SLICE_END);

    let global_idx = match boron_runtime::resolve_id(env.global_ctx) {
        Some((true, idx)) => idx,
        _ => return Err(BoronError::internal("global context id is not a shared buffer")),
    };
    let buf = env
        .shared
        .get_mut(global_idx)
        .ok_or_else(|| BoronError::internal("global context buffer missing"))?;
    let ctx = match &mut buf.data {
        BufferData::Context(ctx) => ctx,
        _ => return Err(BoronError::internal("global context buffer has the wrong shape")),
    };
    let slot = ctx.add_word(args_atom);
    ctx.values[slot] = args_cell;
    Ok(())
}

fn make_string_cell(thread: &mut Thread, s: &str) -> Cell {
    let data = if s.chars().all(|c| (c as u32) <= 0xff) {
        BufferData::Bytes(s.bytes().collect())
    } else {
        BufferData::Wide(s.encode_utf16().collect())
    };
    let id = thread.gen_one(CellTag::String as u8, 0, data);
    Cell::series(CellTag::String, id, 0, boron_core::NO_SLICE_END)
}

fn render_trace(e: &BoronError) -> String {
    let mut out = e.to_string();
    for entry in &e.trace {
        out.push_str(&format!("\n  at block #{} pos {}", entry.block, entry.position));
    }
    out
}

/// Render a cell for REPL/`-e` display. Not a `to-string` cfunc — just
/// enough structure to see what the tokenizer/binder produced.
fn render_cell(thread: &Thread, env: &Env, cell: &Cell) -> String {
    let tag = CellTag::from_u8(cell.tag);
    match tag {
        Some(CellTag::Unset) => "unset!".to_string(),
        Some(CellTag::None_) => "none".to_string(),
        Some(CellTag::Logic) => if cell.as_logic() { "true".to_string() } else { "false".to_string() },
        Some(CellTag::Char) => format!("#\"{}\"", char::from_u32(cell.as_char()).unwrap_or('?')),
        Some(CellTag::Int) => cell.as_int().to_string(),
        Some(CellTag::Double) => cell.as_double().to_string(),
        Some(CellTag::Word) | Some(CellTag::GetWord) | Some(CellTag::LitWord) | Some(CellTag::SetWord) | Some(CellTag::Option) => {
            atom_name(env, cell.word_atom()).to_string()
        }
        Some(CellTag::String) | Some(CellTag::File) => render_series_text(thread, env, cell),
        Some(CellTag::Binary) => render_binary(thread, env, cell),
        Some(CellTag::Block) | Some(CellTag::Paren) | Some(CellTag::Path) | Some(CellTag::LitPath) | Some(CellTag::SetPath) => {
            render_block(thread, env, cell)
        }
        _ => format!("<{tag:?}>"),
    }
}

fn atom_name<'a>(env: &'a Env, atom: u16) -> &'a str {
    env.atoms.name(atom)
}

fn render_series_text(thread: &Thread, env: &Env, cell: &Cell) -> String {
    let Some(buf) = thread.buffer(env, cell.series_buf()) else {
        return String::new();
    };
    match &buf.data {
        BufferData::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        BufferData::Wide(w) => String::from_utf16_lossy(w),
        _ => String::new(),
    }
}

fn render_binary(thread: &Thread, env: &Env, cell: &Cell) -> String {
    let Some(buf) = thread.buffer(env, cell.series_buf()) else {
        return "#{}".to_string();
    };
    match &buf.data {
        BufferData::Bytes(b) => format!("#{{{}}}", hex::encode(b)),
        _ => "#{}".to_string(),
    }
}

fn render_block(thread: &Thread, env: &Env, cell: &Cell) -> String {
    let Some(buf) = thread.buffer(env, cell.series_buf()) else {
        return "[]".to_string();
    };
    let Some(cells) = buf.data.as_cells() else {
        return "[]".to_string();
    };
    let parts: Vec<String> = cells.iter().map(|c| render_cell(thread, env, c)).collect();
    let (open, close) = match CellTag::from_u8(cell.tag) {
        Some(CellTag::Paren) => ("(", ")"),
        _ => ("[", "]"),
    };
    format!("{open}{}{close}", parts.join(" "))
}

fn truncate_for_repl(s: &str) -> String {
    if s.chars().count() <= REPL_TRUNCATE {
        return s.to_string();
    }
    let mut out: String = s.chars().take(REPL_TRUNCATE).collect();
    out.push_str("...");
    out
}

fn repl(thread: &mut Thread, env: &mut Env) -> i32 {
    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!(">> ");
        if io::stdout().flush().is_err() {
            return EXIT_ERROR;
        }
        line.clear();
        match stdin.read_line(&mut line) {
            Ok(0) => return EXIT_OK,
            Ok(_) => {}
            Err(e) => {
                eprintln!("boron: {e}");
                return EXIT_ERROR;
            }
        }
        let trimmed = line.trim_end_matches(['\n', '\r']);
        if trimmed.is_empty() {
            continue;
        }
        match eval_source(thread, env, trimmed.as_bytes()) {
            Ok(result) => println!("{}", truncate_for_repl(&render_cell(thread, env, &result))),
            Err(e) => println!("{}", truncate_for_repl(&render_trace(&e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> (Thread, Env) {
        (Thread::new(), Env::new(256, 4096))
    }

    #[test]
    fn bind_args_skips_script_path_and_exposes_trailing_args() {
        let (mut thread, mut env) = fresh();
        let rest = vec!["script.bor".to_string(), "one".to_string(), "two".to_string()];
        bind_args(&mut thread, &mut env, &rest).unwrap();

        let atom = env.atoms.find("args").unwrap();
        let (_, idx) = boron_runtime::resolve_id(env.global_ctx).unwrap();
        let ctx = match &env.shared.get(idx).unwrap().data {
            BufferData::Context(c) => c,
            _ => panic!("expected context"),
        };
        let slot = ctx.lookup(atom).unwrap();
        let args_cell = ctx.values[slot];
        assert_eq!(render_cell(&thread, &env, &args_cell), "[one two]");
    }

    #[test]
    fn bind_args_with_no_positional_args_is_an_empty_block() {
        let (mut thread, mut env) = fresh();
        bind_args(&mut thread, &mut env, &[]).unwrap();
        let atom = env.atoms.find("args").unwrap();
        let (_, idx) = boron_runtime::resolve_id(env.global_ctx).unwrap();
        let ctx = match &env.shared.get(idx).unwrap().data {
            BufferData::Context(c) => c,
            _ => panic!("expected context"),
        };
        let slot = ctx.lookup(atom).unwrap();
        assert_eq!(render_cell(&thread, &env, &ctx.values[slot]), "[]");
    }

    #[test]
    fn eval_source_tokenizes_and_renders_a_block() {
        let (mut thread, mut env) = fresh();
        bind_args(&mut thread, &mut env, &[]).unwrap();
        let cell = eval_source(&mut thread, &mut env, b"1 2 3").unwrap();
        assert_eq!(render_cell(&thread, &env, &cell), "[1 2 3]");
    }

    #[test]
    fn eval_source_binds_words_against_the_global_context() {
        let (mut thread, mut env) = fresh();
        bind_args(&mut thread, &mut env, &[]).unwrap();
        let cell = eval_source(&mut thread, &mut env, b"args").unwrap();
        let buf = thread.buffer(&env, cell.series_buf()).unwrap();
        let words = buf.data.as_cells().unwrap();
        assert_eq!(words[0].binding(), Binding::Env);
        assert_eq!(words[0].word_ctx(), env.global_ctx, "word must resolve into the global context");
    }

    #[test]
    fn eval_source_surfaces_syntax_errors() {
        let (mut thread, mut env) = fresh();
        let err = eval_source(&mut thread, &mut env, b"\"unterminated").unwrap_err();
        assert_eq!(err.kind, boron_core::ErrorKind::Syntax);
    }

    #[test]
    fn truncate_for_repl_appends_ellipsis_past_the_limit() {
        let long = "a".repeat(200);
        let rendered = truncate_for_repl(&long);
        assert_eq!(rendered.len(), REPL_TRUNCATE + 3);
        assert!(rendered.ends_with("..."));
    }

    #[test]
    fn truncate_for_repl_leaves_short_strings_untouched() {
        assert_eq!(truncate_for_repl("hello"), "hello");
    }
}
