//! Tokenizer (spec §4.6): turns a source byte range into a block of
//! token cells, with nested blocks/parens/strings/binaries/vectors as
//! child buffers, or a Syntax error at a known line.
//!
//! The lexer below is a one-character-lookahead scanner keyed on the
//! first character of each token, mirroring the original's
//! `firstCharOp` dispatch table even though Rust expresses it as a
//! `match` rather than a jump table.

use boron_core::{AtomTable, BoronError, Binding, Cell, CellTag};

use crate::buffer::{BufferData, Thread, VectorElem};

/// Source encoding hint; both forms are normalized to `char` for
/// scanning, since a Boron string is free to hold either.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEncoding {
    Utf8,
    Latin1,
}

/// Tokenize `src` into a freshly allocated Block buffer id in `thread`'s
/// private store. Interns every word atom into `atoms` as it is seen.
pub fn tokenize(thread: &mut Thread, atoms: &mut AtomTable, src: &[u8], encoding: SourceEncoding) -> Result<i32, BoronError> {
    let chars: Vec<char> = match encoding {
        SourceEncoding::Latin1 => src.iter().map(|&b| b as char).collect(),
        SourceEncoding::Utf8 => std::str::from_utf8(src)
            .map_err(|_| BoronError::syntax("invalid utf-8 in source"))?
            .chars()
            .collect(),
    };
    let mut lex = Lexer { chars: &chars, pos: 0, line: 1, atoms };
    let cells = lex.scan_block(None, thread)?;
    Ok(thread.gen_one(CellTag::Block as u8, 0, BufferData::Cells(cells)))
}

fn is_word_start(c: char) -> bool {
    c.is_ascii_alphabetic()
        || matches!(c, '_' | '+' | '-' | '*' | '=' | '<' | '>' | '?' | '|' | '&' | '^' | '~' | '.' | '!')
}

fn is_word_char(c: char) -> bool {
    is_word_start(c) || c.is_ascii_digit()
}

struct Lexer<'a> {
    chars: &'a [char],
    pos: usize,
    line: u32,
    atoms: &'a mut AtomTable,
}

impl<'a> Lexer<'a> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn err(&self, msg: &str) -> BoronError {
        BoronError::syntax(format!("{msg} (line {})", self.line))
    }

    fn skip_ws_and_comments(&mut self) -> bool {
        let mut saw_newline = false;
        loop {
            match self.peek() {
                Some(c) if c == ' ' || c == '\t' || c == '\r' => {
                    self.advance();
                }
                Some('\n') => {
                    saw_newline = true;
                    self.advance();
                }
                Some(';') => {
                    while !matches!(self.peek(), None | Some('\n')) {
                        self.advance();
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    self.advance();
                    self.advance();
                    while !(self.peek() == Some('*') && self.peek_at(1) == Some('/')) {
                        if self.advance().is_none() {
                            break;
                        }
                    }
                    self.advance();
                    self.advance();
                }
                _ => break,
            }
        }
        saw_newline
    }

    /// Scan a sequence of tokens until `terminator` (None = end of input).
    fn scan_block(&mut self, terminator: Option<char>, thread: &mut Thread) -> Result<Vec<Cell>, BoronError> {
        let mut cells = Vec::new();
        let mut sol = true;
        loop {
            let had_newline = self.skip_ws_and_comments();
            if had_newline {
                sol = true;
            }
            match self.peek() {
                None => {
                    if terminator.is_some() {
                        return Err(self.err("unexpected end of input, unterminated block"));
                    }
                    break;
                }
                Some(c) if Some(c) == terminator => {
                    self.advance();
                    break;
                }
                _ => {}
            }
            let mut cell = self.scan_token(thread)?;
            if sol {
                cell.set_flag(boron_core::cell::flags::SOL);
                sol = false;
            }
            cells.push(cell);
        }
        Ok(cells)
    }

    fn scan_token(&mut self, thread: &mut Thread) -> Result<Cell, BoronError> {
        let c = self.peek().ok_or_else(|| self.err("unexpected end of input"))?;
        match c {
            '[' => {
                self.advance();
                let inner = self.scan_block(Some(']'), thread)?;
                let id = thread.gen_one(CellTag::Block as u8, 0, BufferData::Cells(inner));
                Ok(Cell::series(CellTag::Block, id, 0, boron_core::NO_SLICE_END))
            }
            '(' => {
                self.advance();
                let inner = self.scan_block(Some(')'), thread)?;
                let id = thread.gen_one(CellTag::Paren as u8, 0, BufferData::Cells(inner));
                Ok(Cell::series(CellTag::Paren, id, 0, boron_core::NO_SLICE_END))
            }
            ']' | ')' => Err(self.err("unexpected closing bracket")),
            '"' => self.scan_quoted_string(thread),
            '{' => self.scan_braced_string(thread),
            '\'' => self.scan_char_or_litword(thread),
            '%' => self.scan_file(thread),
            '#' => self.scan_hash(thread),
            ':' => self.scan_getword(thread),
            c if c.is_ascii_digit() => self.scan_number(thread),
            '+' | '-' if self.peek_at(1).map(|n| n.is_ascii_digit()).unwrap_or(false) => self.scan_number(thread),
            c if is_word_start(c) => self.scan_word_or_path(thread),
            '/' => self.scan_option_or_path(thread),
            other => Err(self.err(&format!("unexpected character '{other}'"))),
        }
    }

    // -- strings --------------------------------------------------------

    fn scan_quoted_string(&mut self, thread: &mut Thread) -> Result<Cell, BoronError> {
        self.advance();
        let mut out = String::new();
        loop {
            match self.advance() {
                None => return Err(self.err("unterminated string")),
                Some('"') => break,
                Some('^') => out.push(self.scan_caret_escape()?),
                Some(c) => out.push(c),
            }
        }
        Ok(self.make_string(thread, &out))
    }

    /// `{…}` balanced multi-line string. Nested unescaped braces are kept
    /// as literal content as long as they balance.
    fn scan_braced_string(&mut self, thread: &mut Thread) -> Result<Cell, BoronError> {
        self.advance();
        let mut depth = 1u32;
        let mut out = String::new();
        loop {
            match self.advance() {
                None => return Err(self.err("unterminated brace string")),
                Some('{') => {
                    depth += 1;
                    out.push('{');
                }
                Some('}') => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    out.push('}');
                }
                Some('^') => out.push(self.scan_caret_escape()?),
                Some(c) => out.push(c),
            }
        }
        Ok(self.make_string(thread, &out))
    }

    fn scan_caret_escape(&mut self) -> Result<char, BoronError> {
        match self.advance() {
            Some('/') => Ok('\n'),
            Some('-') => Ok('\t'),
            Some('^') => Ok('^'),
            Some('(') => {
                let mut hex = String::new();
                while self.peek().map(|c| c != ')').unwrap_or(false) {
                    hex.push(self.advance().unwrap());
                }
                self.advance();
                let code = u32::from_str_radix(&hex, 16).map_err(|_| self.err("invalid ^(...) escape"))?;
                char::from_u32(code).ok_or_else(|| self.err("invalid codepoint in ^(...) escape"))
            }
            Some(c) => Ok(c),
            None => Err(self.err("unterminated caret escape")),
        }
    }

    fn make_string(&mut self, thread: &mut Thread, s: &str) -> Cell {
        let data = if s.chars().all(|c| (c as u32) <= 0xff) {
            BufferData::Bytes(s.chars().map(|c| c as u8).collect())
        } else if s.chars().all(|c| (c as u32) <= 0xffff) {
            BufferData::Wide(s.encode_utf16().collect())
        } else {
            BufferData::Bytes(s.as_bytes().to_vec())
        };
        let form = match &data {
            BufferData::Bytes(_) if s.chars().all(|c| (c as u32) <= 0xff) => 0,
            BufferData::Wide(_) => 2,
            _ => 1,
        };
        let id = thread.gen_one(CellTag::String as u8, form, data);
        Cell::series(CellTag::String, id, 0, boron_core::NO_SLICE_END)
    }

    fn scan_char_or_litword(&mut self, thread: &mut Thread) -> Result<Cell, BoronError> {
        // `'word` (litword) vs `'c'` (char) disambiguated by whether a
        // matching closing quote follows a single escaped/plain codepoint.
        if self.peek_at(1).map(is_word_start).unwrap_or(false) {
            self.advance();
            let name = self.scan_word_name();
            let atom = self.atoms.intern(&name)?;
            return Ok(Cell::word(CellTag::LitWord, Binding::Unbound, 0, 0, atom));
        }
        self.advance();
        let ch = match self.advance() {
            Some('^') => self.scan_caret_escape()?,
            Some(c) => c,
            None => return Err(self.err("unterminated character literal")),
        };
        if self.advance() != Some('\'') {
            return Err(self.err("expected closing ' on character literal"));
        }
        let _ = thread;
        Ok(Cell::char_(ch as u32))
    }

    fn scan_file(&mut self, thread: &mut Thread) -> Result<Cell, BoronError> {
        self.advance();
        let name = if self.peek() == Some('"') {
            self.advance();
            let mut s = String::new();
            loop {
                match self.advance() {
                    None => return Err(self.err("unterminated file path string")),
                    Some('"') => break,
                    Some('^') => s.push(self.scan_caret_escape()?),
                    Some(c) => s.push(c),
                }
            }
            s
        } else {
            let mut s = String::new();
            while self.peek().map(|c| !c.is_whitespace() && !matches!(c, '[' | ']' | '(' | ')')).unwrap_or(false) {
                s.push(self.advance().unwrap());
            }
            s
        };
        let id = thread.gen_one(CellTag::File as u8, 1, BufferData::Bytes(name.into_bytes()));
        Ok(Cell::series(CellTag::File, id, 0, boron_core::NO_SLICE_END))
    }

    // -- `#` forms: binaries and vectors ---------------------------------

    fn scan_hash(&mut self, thread: &mut Thread) -> Result<Cell, BoronError> {
        self.advance();
        match self.peek() {
            Some('{') => self.scan_binary(thread, 16),
            Some('[') => self.scan_vector(thread),
            _ => Err(self.err("expected '{' or '[' after '#'")),
        }
    }

    fn scan_binary(&mut self, thread: &mut Thread, base: u8) -> Result<Cell, BoronError> {
        self.advance(); // consume '{'
        let mut text = String::new();
        loop {
            match self.advance() {
                None => return Err(self.err("unterminated binary literal")),
                Some('}') => break,
                Some(c) if c.is_whitespace() => {}
                Some(c) => text.push(c),
            }
        }
        let bytes = match base {
            16 => hex::decode(&text).map_err(|_| self.err("invalid hex in binary literal"))?,
            64 => base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &text)
                .map_err(|_| self.err("invalid base64 in binary literal"))?,
            2 => decode_base2(&text).map_err(|_| self.err("invalid base-2 digits in binary literal"))?,
            _ => return Err(self.err("unsupported binary base")),
        };
        let id = thread.gen_one(CellTag::Binary as u8, 0, BufferData::Bytes(bytes));
        Ok(Cell::series(CellTag::Binary, id, 0, boron_core::NO_SLICE_END))
    }

    fn scan_vector(&mut self, thread: &mut Thread) -> Result<Cell, BoronError> {
        self.advance(); // consume '['
        self.skip_ws_and_comments();
        let mut elem = VectorElem::I32;
        if let Some(c) = self.peek() {
            if is_word_start(c) {
                let save = self.pos;
                let name = self.scan_word_name();
                match name.as_str() {
                    "i16" => elem = VectorElem::I16,
                    "u16" => elem = VectorElem::U16,
                    "i32" => elem = VectorElem::I32,
                    "u32" => elem = VectorElem::U32,
                    "f32" => elem = VectorElem::F32,
                    "f64" => elem = VectorElem::F64,
                    _ => self.pos = save,
                }
            }
        }
        let mut raw = Vec::new();
        loop {
            self.skip_ws_and_comments();
            match self.peek() {
                None => return Err(self.err("unterminated vector literal")),
                Some(']') => {
                    self.advance();
                    break;
                }
                _ => {
                    let cell = self.scan_number(thread)?;
                    push_vector_elem(&mut raw, elem, &cell);
                }
            }
        }
        let id = thread.gen_one(CellTag::Vector as u8, elem as u8, BufferData::Vector { elem, raw });
        Ok(Cell::series(CellTag::Vector, id, 0, boron_core::NO_SLICE_END))
    }

    // -- words, paths, options, getwords ----------------------------------

    fn scan_word_name(&mut self) -> String {
        let mut s = String::new();
        s.push(self.advance().unwrap());
        while self.peek().map(is_word_char).unwrap_or(false) {
            s.push(self.advance().unwrap());
        }
        s
    }

    fn scan_word_or_path(&mut self, thread: &mut Thread) -> Result<Cell, BoronError> {
        let name = self.scan_word_name();
        if self.peek() == Some(':') && self.peek_at(1) != Some(':') {
            self.advance();
            let atom = self.atoms.intern(&name)?;
            return Ok(Cell::word(CellTag::SetWord, Binding::Unbound, 0, 0, atom));
        }
        if self.peek() == Some('/') {
            return self.scan_path_from(thread, name);
        }
        let atom = self.atoms.intern(&name)?;
        Ok(Cell::word(CellTag::Word, Binding::Unbound, 0, 0, atom))
    }

    fn scan_option_or_path(&mut self, thread: &mut Thread) -> Result<Cell, BoronError> {
        self.advance();
        let name = self.scan_word_name();
        if self.peek() == Some('/') {
            let head_atom = self.atoms.intern(&name)?;
            let head = Cell::word(CellTag::Word, Binding::Unbound, 0, 0, head_atom);
            return self.scan_path_tail(thread, vec![head]);
        }
        let atom = self.atoms.intern(&name)?;
        Ok(Cell::word(CellTag::Option, Binding::Unbound, 0, 0, atom))
    }

    fn scan_path_from(&mut self, thread: &mut Thread, head_name: String) -> Result<Cell, BoronError> {
        let head_atom = self.atoms.intern(&head_name)?;
        let head = Cell::word(CellTag::Word, Binding::Unbound, 0, 0, head_atom);
        self.scan_path_tail(thread, vec![head])
    }

    fn scan_path_tail(&mut self, thread: &mut Thread, mut parts: Vec<Cell>) -> Result<Cell, BoronError> {
        while self.peek() == Some('/') {
            self.advance();
            let part = if self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                self.scan_number(thread)?
            } else if is_word_start(self.peek().unwrap_or(' ')) {
                let name = self.scan_word_name();
                let atom = self.atoms.intern(&name)?;
                Cell::word(CellTag::Word, Binding::Unbound, 0, 0, atom)
            } else {
                return Err(self.err("invalid path segment"));
            };
            parts.push(part);
        }
        if parts.iter().all(|c| c.is(CellTag::Word) && is_builtin_type_name(&*self.atoms, c.word_atom())) {
            let mut mask = [0u32; 3];
            for c in &parts {
                if let Some(type_id) = type_name_to_id(&*self.atoms, c.word_atom()) {
                    let idx = (type_id / 32) as usize;
                    mask[idx.min(2)] |= 1 << (type_id % 32);
                }
            }
            return Ok(Cell::datatype_mask(&mask, parts.len() as u8));
        }
        let id = thread.gen_one(CellTag::Path as u8, 0, BufferData::Cells(parts));
        Ok(Cell::series(CellTag::Path, id, 0, boron_core::NO_SLICE_END))
    }

    fn scan_getword(&mut self, _thread: &mut Thread) -> Result<Cell, BoronError> {
        self.advance();
        if !self.peek().map(is_word_start).unwrap_or(false) {
            return Err(self.err("expected word after ':'"));
        }
        let name = self.scan_word_name();
        let atom = self.atoms.intern(&name)?;
        Ok(Cell::word(CellTag::GetWord, Binding::Unbound, 0, 0, atom))
    }

    // -- numbers ----------------------------------------------------------

    fn scan_number(&mut self, thread: &mut Thread) -> Result<Cell, BoronError> {
        let start = self.pos;
        let negative = matches!(self.peek(), Some('-'));
        if matches!(self.peek(), Some('+') | Some('-')) {
            self.advance();
        }
        if self.peek() == Some('0') && self.peek_at(1) == Some('x') {
            self.advance();
            self.advance();
            let mut hex = String::new();
            while self.peek().map(|c| c.is_ascii_hexdigit()).unwrap_or(false) {
                hex.push(self.advance().unwrap());
            }
            let v = i64::from_str_radix(&hex, 16).map_err(|_| self.err("invalid hex integer"))?;
            let mut cell = Cell::int(if negative { -v } else { v });
            cell.set_flag(boron_core::cell::flags::INT_HEX);
            return Ok(cell);
        }

        let mut digits = String::new();
        while self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            digits.push(self.advance().unwrap());
        }

        // Time: H:M[:S[.f]]
        if self.peek() == Some(':') {
            return self.scan_time(start);
        }
        // Date: trailing '-' followed by a digit, after a 4-digit year.
        if self.peek() == Some('-') && self.peek_at(1).map(|c| c.is_ascii_digit()).unwrap_or(false) && digits.len() == 4 {
            return self.scan_date(start);
        }
        // Double: embedded '.' or exponent.
        if self.peek() == Some('.') && self.peek_at(1).map(|c| c.is_ascii_digit()).unwrap_or(false) {
            self.advance();
            let mut frac = String::new();
            while self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                frac.push(self.advance().unwrap());
            }
            self.scan_exponent();
            let text: String = self.chars[start..self.pos].iter().collect();
            if self.peek() == Some(',') {
                return self.scan_vec3(&text);
            }
            let v: f64 = text.parse().map_err(|_| self.err("invalid decimal number"))?;
            let _ = frac;
            return Ok(Cell::double(v));
        }
        if matches!(self.peek(), Some('e') | Some('E')) && self.peek_at(1).map(|c| c.is_ascii_digit() || c == '+' || c == '-').unwrap_or(false) {
            self.scan_exponent();
            let text: String = self.chars[start..self.pos].iter().collect();
            let v: f64 = text.parse().map_err(|_| self.err("invalid exponent number"))?;
            return Ok(Cell::double(v));
        }
        if self.peek() == Some(',') {
            let text: String = self.chars[start..self.pos].iter().collect();
            return self.scan_coord(&text);
        }

        if digits.is_empty() {
            return Err(self.err("expected a digit"));
        }
        let v: i64 = digits.parse().map_err(|_| self.err("integer too large"))?;
        // Binary-encoding prefix (spec §4.6): `2#{...}`, `16#{...}`, or
        // `64#{...}` select base2/hex/base64 for the binary literal that
        // follows, replacing the integer cell with the binary cell in place
        // rather than producing two tokens.
        if !negative
            && matches!(v, 2 | 16 | 64)
            && self.peek() == Some('#')
            && self.peek_at(1) == Some('{')
        {
            self.advance(); // consume '#'
            return self.scan_binary(thread, v as u8);
        }
        Ok(Cell::int(if negative { -v } else { v }))
    }

    fn scan_exponent(&mut self) {
        if matches!(self.peek(), Some('e') | Some('E')) {
            self.advance();
            if matches!(self.peek(), Some('+') | Some('-')) {
                self.advance();
            }
            while self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                self.advance();
            }
        }
    }

    fn scan_time(&mut self, start: usize) -> Result<Cell, BoronError> {
        let mut fields: Vec<i64> = vec![parse_run(self.chars, start, self.pos)];
        let mut colons = 0u8;
        while self.peek() == Some(':') {
            self.advance();
            colons += 1;
            let field_start = self.pos;
            let mut digits = String::new();
            while self.peek().map(|c| c.is_ascii_digit() || c == '.').unwrap_or(false) {
                digits.push(self.advance().unwrap());
            }
            let _ = field_start;
            let v: f64 = digits.parse().map_err(|_| self.err("invalid time field"))?;
            fields.push(v as i64);
        }
        let negative = self.chars[start] == '-';
        let h = fields[0].unsigned_abs() as f64;
        let m = *fields.get(1).unwrap_or(&0) as f64;
        let s = *fields.get(2).unwrap_or(&0) as f64;
        let mut seconds = h * 3600.0 + m * 60.0 + s;
        if negative {
            seconds = -seconds;
        }
        if colons >= 3 {
            return Ok(Cell::timecode(seconds, 0));
        }
        Ok(Cell::time(seconds))
    }

    fn scan_date(&mut self, start: usize) -> Result<Cell, BoronError> {
        let year: i64 = parse_run(self.chars, start, self.pos);
        self.advance(); // '-'
        let month = self.scan_two_digits()?;
        let mut day = 1i64;
        if self.peek() == Some('-') {
            self.advance();
            day = self.scan_two_digits()?;
        }
        if matches!(self.peek(), Some('T') | Some('/')) {
            self.advance();
            let _ = self.scan_time(self.pos);
        }
        // Julian-ish day count good enough to round-trip within a session;
        // exact calendar math lives in a higher-level date library when
        // one is wired in.
        let days = (year as f64) * 365.25 + (month as f64) * 30.0 + day as f64;
        Ok(Cell::date(days))
    }

    fn scan_two_digits(&mut self) -> Result<i64, BoronError> {
        let start = self.pos;
        for _ in 0..2 {
            if self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                self.advance();
            }
        }
        if self.pos == start {
            return Err(self.err("expected digits in date"));
        }
        Ok(parse_run(self.chars, start, self.pos))
    }

    fn scan_coord(&mut self, first: &str) -> Result<Cell, BoronError> {
        let mut comps: Vec<i16> = vec![first.parse().map_err(|_| self.err("invalid coord component"))?];
        while self.peek() == Some(',') && comps.len() < 6 {
            self.advance();
            let start = self.pos;
            if matches!(self.peek(), Some('+') | Some('-')) {
                self.advance();
            }
            while self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                self.advance();
            }
            let text: String = self.chars[start..self.pos].iter().collect();
            comps.push(text.parse().map_err(|_| self.err("invalid coord component"))?);
        }
        Ok(Cell::coord(&comps))
    }

    fn scan_vec3(&mut self, first: &str) -> Result<Cell, BoronError> {
        let mut comps: Vec<f32> = vec![first.parse().map_err(|_| self.err("invalid vec3 component"))?];
        while self.peek() == Some(',') && comps.len() < 3 {
            self.advance();
            let start = self.pos;
            if matches!(self.peek(), Some('+') | Some('-')) {
                self.advance();
            }
            while self.peek().map(|c| c.is_ascii_digit() || c == '.').unwrap_or(false) {
                self.advance();
            }
            self.scan_exponent();
            let text: String = self.chars[start..self.pos].iter().collect();
            comps.push(text.parse().map_err(|_| self.err("invalid vec3 component"))?);
        }
        while comps.len() < 3 {
            comps.push(0.0);
        }
        Ok(Cell::vec3([comps[0], comps[1], comps[2]]))
    }
}

fn parse_run(chars: &[char], start: usize, end: usize) -> i64 {
    let s: String = chars[start..end].iter().filter(|c| c.is_ascii_digit() || **c == '-').collect();
    s.parse().unwrap_or(0)
}

fn decode_base2(text: &str) -> Result<Vec<u8>, ()> {
    if text.len() % 8 != 0 {
        return Err(());
    }
    let mut out = Vec::with_capacity(text.len() / 8);
    for chunk in text.as_bytes().chunks(8) {
        let mut byte = 0u8;
        for &b in chunk {
            byte <<= 1;
            byte |= match b {
                b'0' => 0,
                b'1' => 1,
                _ => return Err(()),
            };
        }
        out.push(byte);
    }
    Ok(out)
}

fn push_vector_elem(raw: &mut Vec<u8>, elem: VectorElem, cell: &Cell) {
    match elem {
        VectorElem::I16 => raw.extend_from_slice(&(cell.as_int() as i16).to_le_bytes()),
        VectorElem::U16 => raw.extend_from_slice(&(cell.as_int() as u16).to_le_bytes()),
        VectorElem::I32 => raw.extend_from_slice(&(cell.as_int() as i32).to_le_bytes()),
        VectorElem::U32 => raw.extend_from_slice(&(cell.as_int() as u32).to_le_bytes()),
        VectorElem::F32 => {
            let v = if cell.is(CellTag::Double) { cell.as_double() as f32 } else { cell.as_int() as f32 };
            raw.extend_from_slice(&v.to_le_bytes());
        }
        VectorElem::F64 => {
            let v = if cell.is(CellTag::Double) { cell.as_double() } else { cell.as_int() as f64 };
            raw.extend_from_slice(&v.to_le_bytes());
        }
    }
}

/// Built-in type names double as path components that collapse a path
/// into a Datatype mask cell (spec §4.6). `atoms` here just resolves the
/// candidate word's spelling; the 31 built-in names are a closed set so
/// this does a plain string compare rather than a second table.
fn is_builtin_type_name(atoms: &AtomTable, atom: u16) -> bool {
    type_name_to_id(atoms, atom).is_some()
}

fn type_name_to_id(atoms: &AtomTable, atom: u16) -> Option<u8> {
    let name = atoms.name(atom);
    let base = name.strip_suffix('!').unwrap_or(name);
    let id = match base {
        "unset" => CellTag::Unset,
        "datatype" => CellTag::Datatype,
        "none" => CellTag::None_,
        "logic" => CellTag::Logic,
        "char" => CellTag::Char,
        "int" => CellTag::Int,
        "double" | "decimal" => CellTag::Double,
        "time" => CellTag::Time,
        "date" => CellTag::Date,
        "coord" => CellTag::Coord,
        "vec3" => CellTag::Vec3,
        "word" => CellTag::Word,
        "lit-word" => CellTag::LitWord,
        "set-word" => CellTag::SetWord,
        "get-word" => CellTag::GetWord,
        "option" => CellTag::Option,
        "binary" => CellTag::Binary,
        "bitset" => CellTag::Bitset,
        "string" => CellTag::String,
        "file" => CellTag::File,
        "vector" => CellTag::Vector,
        "block" => CellTag::Block,
        "paren" => CellTag::Paren,
        "path" => CellTag::Path,
        "lit-path" => CellTag::LitPath,
        "set-path" => CellTag::SetPath,
        "context" => CellTag::Context,
        "hashmap" => CellTag::HashMap,
        "error" => CellTag::Error,
        _ => return None,
    };
    Some(id as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use boron_core::AtomTable;

    fn fresh() -> (Thread, AtomTable) {
        (Thread::new(), AtomTable::new(1024, 65536))
    }

    #[test]
    fn t1_setword_int_word_int() {
        let (mut thread, mut atoms) = fresh();
        let id = tokenize(&mut thread, &mut atoms, b"a: 1 + 2\n", SourceEncoding::Utf8).unwrap();
        let buf = thread.store.get((id - 1) as usize).unwrap();
        let cells = buf.data.as_cells().unwrap();
        assert_eq!(cells.len(), 4);
        assert!(cells[0].is(CellTag::SetWord));
        assert!(cells[0].has_flag(boron_core::cell::flags::SOL));
        assert!(cells[1].is(CellTag::Int));
        assert_eq!(cells[1].as_int(), 1);
        assert!(cells[2].is(CellTag::Word));
        assert!(cells[3].is(CellTag::Int));
        assert_eq!(cells[3].as_int(), 2);
    }

    #[test]
    fn t2_hex_binary_literal() {
        let (mut thread, mut atoms) = fresh();
        let id = tokenize(&mut thread, &mut atoms, b"#{ ff 00 7e }", SourceEncoding::Utf8).unwrap();
        let buf = thread.store.get((id - 1) as usize).unwrap();
        let cells = buf.data.as_cells().unwrap();
        assert_eq!(cells.len(), 1);
        assert!(cells[0].is(CellTag::Binary));
        let bin_buf = thread.store.get((cells[0].series_buf() - 1) as usize).unwrap();
        match &bin_buf.data {
            BufferData::Bytes(b) => assert_eq!(b, &[0xff, 0x00, 0x7e]),
            _ => panic!("expected byte buffer"),
        }
    }

    #[test]
    fn nested_block_and_paren() {
        let (mut thread, mut atoms) = fresh();
        let id = tokenize(&mut thread, &mut atoms, b"[1 (2 3)]", SourceEncoding::Utf8).unwrap();
        let buf = thread.store.get((id - 1) as usize).unwrap();
        let cells = buf.data.as_cells().unwrap();
        assert_eq!(cells.len(), 1);
        assert!(cells[0].is(CellTag::Block));
    }

    #[test]
    fn quoted_string_with_escape() {
        let (mut thread, mut atoms) = fresh();
        let id = tokenize(&mut thread, &mut atoms, b"\"a^/b\"", SourceEncoding::Utf8).unwrap();
        let buf = thread.store.get((id - 1) as usize).unwrap();
        let cells = buf.data.as_cells().unwrap();
        assert!(cells[0].is(CellTag::String));
        let str_buf = thread.store.get((cells[0].series_buf() - 1) as usize).unwrap();
        match &str_buf.data {
            BufferData::Bytes(b) => assert_eq!(b, b"a\nb"),
            _ => panic!("expected latin1 string buffer"),
        }
    }

    #[test]
    fn path_of_words() {
        let (mut thread, mut atoms) = fresh();
        let id = tokenize(&mut thread, &mut atoms, b"a/b/c", SourceEncoding::Utf8).unwrap();
        let buf = thread.store.get((id - 1) as usize).unwrap();
        let cells = buf.data.as_cells().unwrap();
        assert!(cells[0].is(CellTag::Path));
    }

    #[test]
    fn unterminated_string_is_syntax_error() {
        let (mut thread, mut atoms) = fresh();
        let err = tokenize(&mut thread, &mut atoms, b"\"oops", SourceEncoding::Utf8).unwrap_err();
        assert_eq!(err.kind, boron_core::ErrorKind::Syntax);
    }
}
