//! Splitting a command line into arguments.

/// Why a line could not be tokenized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenizeError {
    UnterminatedQuote,
}

/// Split on spaces and tabs, honouring quotes.
///
/// Double quotes group text and allow `\` to escape the next character.
/// Single quotes group text literally. Quoted text joins any adjacent
/// unquoted text into one argument, and `""` yields an empty argument.
pub fn split_quoted(line: &str) -> Result<Vec<String>, TokenizeError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            ' ' | '\t' => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            '"' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(escaped) => current.push(escaped),
                            None => return Err(TokenizeError::UnterminatedQuote),
                        },
                        Some(other) => current.push(other),
                        None => return Err(TokenizeError::UnterminatedQuote),
                    }
                }
            }
            '\'' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(other) => current.push(other),
                        None => return Err(TokenizeError::UnterminatedQuote),
                    }
                }
            }
            other => {
                in_token = true;
                current.push(other);
            }
        }
    }

    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}
