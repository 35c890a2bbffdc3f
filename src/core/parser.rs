//! Text assembler: NetQASM source → [`Subroutine`].
//!
//! A subroutine is a preamble (`# NETQASM`, `# APPID`, `# DEFINE` macros)
//! followed by a body of instruction lines and branch-label lines. Parsing
//! strips comments, applies macros, decodes each line into a command and
//! finally resolves branch labels into constant command positions.

use std::collections::HashMap;

use crate::core::error::{NetQasmError, Result};
use crate::core::strutil::{group_by_word, is_number, is_variable_name};
use crate::core::subroutine::{
    string_to_instruction, Command, MemoryAddress, Operand, ProtoCommand, Register, RegisterName,
    Subroutine, Symbols, Value,
};

/// Parses a full NetQASM subroutine from text.
pub fn parse_subroutine(text: &str) -> Result<Subroutine> {
    let (preamble_lines, body_lines) = split_preamble_body(text)?;
    let preamble = parse_preamble(&preamble_lines)?;
    let body_lines = apply_macros(&body_lines, &preamble.macros);
    let proto = parse_body(&body_lines)?;
    let commands = resolve_branch_labels(proto)?;
    Ok(Subroutine {
        netqasm_version: preamble.netqasm_version,
        app_id: preamble.app_id,
        commands,
    })
}

struct Preamble {
    netqasm_version: String,
    app_id: u32,
    macros: Vec<(String, String)>,
}

/// Splits source lines into preamble and body, stripping comments and blank
/// lines. A preamble line after the first body line is fatal.
fn split_preamble_body(text: &str) -> Result<(Vec<String>, Vec<String>)> {
    let mut in_preamble = true;
    let mut preamble_lines = Vec::new();
    let mut body_lines = Vec::new();
    for raw_line in text.lines() {
        let without_comment = match raw_line.split_once(Symbols::COMMENT_START) {
            Some((before, _)) => before,
            None => raw_line,
        };
        let line = without_comment.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(rest) = line.strip_prefix(Symbols::PREAMBLE_START) {
            if !in_preamble {
                return Err(NetQasmError::syntax(
                    "cannot have a preamble line after instructions",
                ));
            }
            let rest = rest.trim();
            if rest.is_empty() {
                continue;
            }
            preamble_lines.push(rest.to_string());
        } else {
            in_preamble = false;
            body_lines.push(line.to_string());
        }
    }
    Ok((preamble_lines, body_lines))
}

fn parse_preamble(lines: &[String]) -> Result<Preamble> {
    let mut netqasm_version: Option<String> = None;
    let mut app_id: Option<u32> = None;
    let mut macros: Vec<(String, String)> = Vec::new();

    for line in lines {
        let words = group_by_word(line, ' ', Some(Symbols::PREAMBLE_DEFINE_BRACKETS))?;
        let (keyword, operands) = words
            .split_first()
            .ok_or_else(|| NetQasmError::syntax("empty preamble line"))?;
        match keyword.as_str() {
            Symbols::PREAMBLE_NETQASM => {
                if netqasm_version.is_some() {
                    return Err(NetQasmError::instruction(
                        "preamble should contain exactly one NETQASM directive",
                    ));
                }
                netqasm_version = Some(parse_version(single_arg(operands, Symbols::PREAMBLE_NETQASM)?)?);
            }
            Symbols::PREAMBLE_APPID => {
                if app_id.is_some() {
                    return Err(NetQasmError::instruction(
                        "preamble should contain exactly one APPID directive",
                    ));
                }
                let arg = single_arg(operands, Symbols::PREAMBLE_APPID)?;
                let id = arg.parse::<u32>().map_err(|_| {
                    NetQasmError::syntax(format!("'{}' is not a valid application ID", arg))
                })?;
                app_id = Some(id);
            }
            Symbols::PREAMBLE_DEFINE => {
                if operands.len() != 2 {
                    return Err(NetQasmError::syntax(format!(
                        "DEFINE should contain exactly two arguments, not {} as in '{}'",
                        operands.len(),
                        line
                    )));
                }
                let key = operands[0].clone();
                if !is_variable_name(&key) {
                    return Err(NetQasmError::instruction(format!(
                        "'{}' is not a valid macro key",
                        key
                    )));
                }
                if macros.iter().any(|(existing, _)| existing == &key) {
                    return Err(NetQasmError::instruction(format!(
                        "macro keys need to be unique, '{}' already defined",
                        key
                    )));
                }
                let value = strip_define_brackets(&operands[1]);
                macros.push((key, value));
            }
            other => {
                return Err(NetQasmError::instruction(format!(
                    "'{}' is not a valid preamble directive",
                    other
                )));
            }
        }
    }

    Ok(Preamble {
        netqasm_version: netqasm_version
            .ok_or_else(|| NetQasmError::syntax("missing NETQASM directive"))?,
        app_id: app_id.ok_or_else(|| NetQasmError::syntax("missing APPID directive"))?,
        macros,
    })
}

fn single_arg<'a>(operands: &'a [String], keyword: &str) -> Result<&'a str> {
    match operands {
        [arg] => Ok(arg),
        _ => Err(NetQasmError::syntax(format!(
            "preamble directive {} should contain exactly one argument, not {}",
            keyword,
            operands.len()
        ))),
    }
}

fn parse_version(version: &str) -> Result<String> {
    let valid = matches!(
        version.split('.').collect::<Vec<_>>().as_slice(),
        [major, minor] if is_number(major) && is_number(minor)
    );
    if !valid {
        return Err(NetQasmError::syntax(format!(
            "could not parse NETQASM version '{}'",
            version
        )));
    }
    Ok(version.to_string())
}

fn strip_define_brackets(value: &str) -> String {
    let (open, close) = Symbols::PREAMBLE_DEFINE_BRACKETS;
    value
        .strip_prefix(open)
        .and_then(|v| v.strip_suffix(close))
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| value.to_string())
}

/// Replaces every `key!` marker with the macro value.
fn apply_macros(body_lines: &[String], macros: &[(String, String)]) -> Vec<String> {
    let mut body = body_lines.join("\n");
    for (key, value) in macros {
        let marker = format!("{}{}", key, Symbols::MACRO_END);
        body = body.replace(&marker, value);
    }
    body.lines().map(|l| l.to_string()).collect()
}

fn parse_body(body_lines: &[String]) -> Result<Vec<ProtoCommand>> {
    let mut commands = Vec::with_capacity(body_lines.len());
    for line in body_lines {
        if let Some(label) = line.strip_suffix(Symbols::BRANCH_END) {
            if !is_variable_name(label) {
                return Err(NetQasmError::syntax(format!(
                    "'{}' is not a valid branch label",
                    label
                )));
            }
            commands.push(ProtoCommand::BranchLabel(label.to_string()));
        } else {
            commands.push(ProtoCommand::Command(parse_command(line)?));
        }
    }
    Ok(commands)
}

fn parse_command(line: &str) -> Result<Command> {
    let words = group_by_word(line, ' ', Some(Symbols::ARGS_BRACKETS))?;
    let (head, operand_words) = words
        .split_first()
        .ok_or_else(|| NetQasmError::syntax("empty instruction line"))?;
    let (name, args_text) = split_off_bracket(head, Symbols::ARGS_BRACKETS)?;
    let instruction = string_to_instruction(name)?;
    let args = parse_args(args_text)?;
    let operands = operand_words
        .iter()
        .map(|word| parse_operand(word))
        .collect::<Result<Vec<_>>>()?;
    Ok(Command { instruction, args, operands })
}

/// Splits `word` into the part before the bracket and the bracket contents.
/// A start bracket without the closing bracket at the end of the word is
/// fatal.
fn split_off_bracket<'a>(word: &'a str, brackets: (char, char)) -> Result<(&'a str, &'a str)> {
    let (open, close) = brackets;
    match word.find(open) {
        None => Ok((word, "")),
        Some(start) => {
            if !word.ends_with(close) {
                return Err(NetQasmError::syntax(format!(
                    "no end bracket in '{}', expected '{}'",
                    word, close
                )));
            }
            let contents = &word[start + open.len_utf8()..word.len() - close.len_utf8()];
            Ok((&word[..start], contents))
        }
    }
}

/// Immediate arguments inside the mnemonic bracket must be unsigned
/// integers.
fn parse_args(args_text: &str) -> Result<Vec<i64>> {
    if args_text.is_empty() {
        return Ok(Vec::new());
    }
    args_text
        .split(Symbols::ARGS_DELIM)
        .map(|arg| {
            let arg = arg.trim();
            if arg.chars().all(|c| c.is_ascii_digit()) && !arg.is_empty() {
                arg.parse::<i64>()
                    .map_err(|_| NetQasmError::syntax(format!("argument '{}' out of range", arg)))
            } else {
                Err(NetQasmError::syntax(format!(
                    "expected an unsigned integer argument, got '{}'",
                    arg
                )))
            }
        })
        .collect()
}

/// Operand forms, in order of attempt: address literal, integer constant,
/// register, branch label.
fn parse_operand(word: &str) -> Result<Operand> {
    if word.starts_with(Symbols::ADDRESS_START) {
        return Ok(Operand::Address(parse_address(word)?));
    }
    if is_number(word) {
        let value = word
            .parse::<i64>()
            .map_err(|_| NetQasmError::syntax(format!("constant '{}' out of range", word)))?;
        return Ok(Operand::Constant(value));
    }
    if let Ok(register) = parse_register(word) {
        return Ok(Operand::Register(register));
    }
    if is_variable_name(word) {
        return Ok(Operand::Label(word.to_string()));
    }
    Err(NetQasmError::syntax(format!(
        "'{}' is not a valid operand",
        word
    )))
}

/// Register literal: group letter followed by the register index.
pub fn parse_register(word: &str) -> Result<Register> {
    let mut chars = word.chars();
    let name = chars
        .next()
        .and_then(RegisterName::from_letter)
        .ok_or_else(|| NetQasmError::syntax(format!("'{}' is not a valid register", word)))?;
    let digits = chars.as_str();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(NetQasmError::syntax(format!(
            "'{}' is not a valid register",
            word
        )));
    }
    let index = digits
        .parse::<u32>()
        .map_err(|_| NetQasmError::syntax(format!("register index in '{}' out of range", word)))?;
    Register::new(name, index)
}

/// Address literal: `@base` or `@base[index]` where base and index are each
/// a constant or a register.
pub fn parse_address(word: &str) -> Result<MemoryAddress> {
    let (base_text, index_text) = split_off_bracket(word, Symbols::INDEX_BRACKETS)?;
    let base_text = base_text
        .strip_prefix(Symbols::ADDRESS_START)
        .ok_or_else(|| NetQasmError::syntax(format!("expected an address, got '{}'", word)))?;
    let base = parse_value(base_text)?;
    let index = if index_text.is_empty() {
        None
    } else {
        Some(parse_value(index_text.trim())?)
    };
    Ok(MemoryAddress { base, index })
}

fn parse_value(text: &str) -> Result<Value> {
    if is_number(text) {
        let value = text
            .parse::<i64>()
            .map_err(|_| NetQasmError::syntax(format!("value '{}' out of range", text)))?;
        return Ok(Value::Constant(value));
    }
    parse_register(text).map(Value::Register).map_err(|_| {
        NetQasmError::syntax(format!("'{}' is not a constant or register", text))
    })
}

/// Removes every branch-label pseudo-command and rewrites label operands to
/// the constant position the label occupies after removal.
///
/// Positions are recorded while removing, so each label already accounts for
/// the shift caused by labels before it. Duplicate names and references to
/// labels that were never declared are fatal.
pub fn resolve_branch_labels(proto: Vec<ProtoCommand>) -> Result<Vec<Command>> {
    let mut positions: HashMap<String, i64> = HashMap::new();
    let mut commands: Vec<Command> = Vec::with_capacity(proto.len());
    for item in proto {
        match item {
            ProtoCommand::BranchLabel(name) => {
                if positions.contains_key(&name) {
                    return Err(NetQasmError::syntax(format!(
                        "branch labels need to be unique, '{}' already used",
                        name
                    )));
                }
                positions.insert(name, commands.len() as i64);
            }
            ProtoCommand::Command(command) => commands.push(command),
        }
    }
    for command in &mut commands {
        for operand in &mut command.operands {
            if let Operand::Label(name) = operand {
                let position = positions.get(name.as_str()).ok_or_else(|| {
                    NetQasmError::syntax(format!("branch label '{}' is never declared", name))
                })?;
                *operand = Operand::Constant(*position);
            }
        }
    }
    Ok(commands)
}
