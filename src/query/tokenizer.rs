//! Query tokenizer
//!
//! Two syntaxes are accepted:
//! - comma separated (`julien devin, 2017`), used when the text has a comma
//!   and no double quote;
//! - space separated with double-quoted groups (`"julien devin" 2017`).
//!
//! A quoted group keeps its opening quote as the first character of the
//! token. Downstream, the quote marks the token for exact keyword matching.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Space,
    InToken,
    InString,
}

/// Split a query into tokens
pub fn tokenize(s: &str) -> Vec<String> {
    log::debug!("Query: {}", s);
    let tokens = if s.contains(',') && !s.contains('"') {
        tokenize_comma(s)
    } else {
        tokenize_space(s)
    };
    log::debug!("Query tokens: {:?}", tokens);
    tokens
}

fn tokenize_comma(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn tokenize_space(s: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut state = State::Space;
    let mut from = 0;

    for (i, c) in s.char_indices() {
        if c.is_whitespace() {
            if state == State::InToken {
                tokens.push(s[from..i].to_string());
                state = State::Space;
            }
        } else if c == '"' {
            match state {
                State::Space => {
                    state = State::InString;
                    from = i;
                }
                State::InToken => {
                    tokens.push(s[from..i].to_string());
                    state = State::InString;
                    from = i;
                }
                State::InString => {
                    tokens.push(s[from..i].to_string());
                    state = State::Space;
                }
            }
        } else if state == State::Space {
            state = State::InToken;
            from = i;
        }
    }

    if state != State::Space {
        tokens.push(s[from..].to_string());
    }
    tokens
}
