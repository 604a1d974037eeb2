use proc_macro::{Delimiter, TokenStream, TokenTree};

/// Splits a `TokenStream` into comma-separated arguments.
///
/// Each argument is returned as a `Vec<TokenTree>`.
/// Commas at the top level are used as separators. Commas inside delimited
/// groups, or inside the `<...>` of a turbofish such as `f::<A, B>()`,
/// belong to the argument.
pub(crate) fn split_args(input: TokenStream) -> Vec<Vec<TokenTree>> {
    let mut args = Vec::new();
    let mut current = Vec::new();
    let mut angle_depth = 0usize;

    for token in input {
        if let TokenTree::Punct(p) = &token {
            match p.as_char() {
                ',' if angle_depth == 0 => {
                    if !current.is_empty() {
                        args.push(std::mem::take(&mut current));
                    }
                    continue;
                }
                '<' if angle_depth > 0 || ends_with_path_sep(&current) => angle_depth += 1,
                // `->` inside generic arguments does not close them.
                '>' if angle_depth > 0 && !ends_with_punct(&current, '-') => angle_depth -= 1,
                _ => {}
            }
        }

        current.push(token);
    }

    if !current.is_empty() {
        args.push(current);
    }

    args
}

fn ends_with_path_sep(tokens: &[TokenTree]) -> bool {
    matches!(
        tokens,
        [.., TokenTree::Punct(a), TokenTree::Punct(b)] if a.as_char() == ':' && b.as_char() == ':'
    )
}

fn ends_with_punct(tokens: &[TokenTree], ch: char) -> bool {
    matches!(tokens.last(), Some(TokenTree::Punct(p)) if p.as_char() == ch)
}

/// Converts a slice of tokens into a Rust source string.
///
/// This function preserves token order and inserts a space between
/// consecutive identifiers and literals to avoid accidental token merging
/// (`x as u64`, `match 1`, `1 as u8`).
pub(crate) fn tokens_to_string(tokens: &[TokenTree]) -> String {
    let mut out = String::new();
    let mut prev_was_word = false;

    for t in tokens {
        let is_word = matches!(t, TokenTree::Ident(_) | TokenTree::Literal(_));

        if prev_was_word && is_word {
            out.push(' ');
        }

        out.push_str(&t.to_string());
        prev_was_word = is_word;
    }

    out
}

/// Returns `true` if `token` is the identifier `name`.
pub(crate) fn is_ident(token: &TokenTree, name: &str) -> bool {
    matches!(token, TokenTree::Ident(id) if id.to_string() == name)
}

/// Returns `true` if `token` is a group with the given delimiter.
pub(crate) fn is_group(token: &TokenTree, delimiter: Delimiter) -> bool {
    matches!(token, TokenTree::Group(g) if g.delimiter() == delimiter)
}

/// Emits a `compile_error!` invocation carrying `message`.
pub(crate) fn compile_error(message: &str) -> TokenStream {
    format!("::core::compile_error!({message:?});")
        .parse()
        .unwrap_or_default()
}
