//! Word splitting and identifier/number validation for the assembler.

use crate::core::error::{NetQasmError, Result};

/// Splits a line into words, keeping the contents of a configured bracket
/// pair attached to the word that opens it.
///
/// The separator is ignored between a start bracket and the matching end
/// bracket, so `array(4, 2) @0` splits into `["array(4, 2)", "@0"]`.
/// A start bracket without its end bracket is a syntax error.
pub fn group_by_word(line: &str, separator: char, brackets: Option<(char, char)>) -> Result<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    for c in line.trim().chars() {
        if let Some((start, end)) = brackets {
            if c == start {
                depth += 1;
            } else if c == end {
                if depth == 0 {
                    return Err(NetQasmError::syntax(format!(
                        "unmatched closing bracket '{}' in '{}'",
                        end, line
                    )));
                }
                depth -= 1;
            }
        }
        if c == separator && depth == 0 {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
        } else {
            current.push(c);
        }
    }
    if depth != 0 {
        return Err(NetQasmError::syntax(format!(
            "could not find a closing bracket in '{}'",
            line
        )));
    }
    if !current.is_empty() {
        words.push(current);
    }
    Ok(words)
}

/// Valid identifiers start with a letter and contain only letters, digits
/// and underscores.
pub fn is_variable_name(variable: &str) -> bool {
    let mut chars = variable.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Unsigned or negative decimal integer.
pub fn is_number(number: &str) -> bool {
    let digits = number.strip_prefix('-').unwrap_or(number);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_plain_words() {
        let words = group_by_word("store M0 @0", ' ', None).unwrap();
        assert_eq!(words, vec!["store", "M0", "@0"]);
    }

    #[test]
    fn keeps_bracket_contents_together() {
        let words = group_by_word("array(4, 2) @0", ' ', Some(('(', ')'))).unwrap();
        assert_eq!(words, vec!["array(4, 2)", "@0"]);
    }

    #[test]
    fn missing_end_bracket_is_fatal() {
        let err = group_by_word("DEFINE args {0, 0", ' ', Some(('{', '}'))).unwrap_err();
        assert!(matches!(err, NetQasmError::Syntax(_)));
    }

    #[test]
    fn variable_names() {
        assert!(is_variable_name("epr_address"));
        assert!(is_variable_name("EXIT"));
        assert!(!is_variable_name("1args"));
        assert!(!is_variable_name(""));
        assert!(!is_variable_name("no-dash"));
    }

    #[test]
    fn numbers() {
        assert!(is_number("0"));
        assert!(is_number("-12"));
        assert!(!is_number(""));
        assert!(!is_number("-"));
        assert!(!is_number("1a"));
    }
}
