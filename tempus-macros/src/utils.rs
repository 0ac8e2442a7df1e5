use proc_macro::{TokenStream, TokenTree};

/// Splits a `TokenStream` into comma-separated arguments.
///
/// Each argument is returned as a `Vec<TokenTree>`. Only top-level commas
/// separate arguments; commas nested in groups stay inside their group.
pub(crate) fn split_args(input: TokenStream) -> Vec<Vec<TokenTree>> {
    let mut args = Vec::new();
    let mut current = Vec::new();

    for token in input {
        match &token {
            TokenTree::Punct(p) if p.as_char() == ',' => {
                if !current.is_empty() {
                    args.push(current);
                    current = Vec::new();
                }
            }
            _ => current.push(token),
        }
    }

    if !current.is_empty() {
        args.push(current);
    }

    args
}

/// Converts a slice of tokens into a Rust source string.
///
/// Consecutive identifiers are separated by a space so they do not merge
/// (`foo bar` vs `foobar`).
pub(crate) fn tokens_to_string(tokens: &[TokenTree]) -> String {
    let mut out = String::new();
    let mut prev_was_ident = false;

    for t in tokens {
        let needs_space = prev_was_ident && matches!(t, TokenTree::Ident(_));

        if needs_space {
            out.push(' ');
        }

        out.push_str(&t.to_string());
        prev_was_ident = matches!(t, TokenTree::Ident(_));
    }

    out
}

/// Parses the attribute arguments: nothing, or `loops = N` with `N > 0`.
pub(crate) fn parse_loops(attr: TokenStream) -> Result<Option<usize>, String> {
    let mut loops = None;

    for arg in split_args(attr) {
        let text = tokens_to_string(&arg);

        let Some(value) = text.strip_prefix("loops") else {
            return Err(format!("unknown argument `{text}`, expected `loops = N`"));
        };

        let value = value.trim_start().trim_start_matches('=').trim();
        match value.parse::<usize>() {
            Ok(n) if n > 0 => loops = Some(n),
            _ => return Err(format!("`loops` must be a positive integer, got `{value}`")),
        }
    }

    Ok(loops)
}

/// Parses the function's parameter list.
///
/// Returns the name and type of the single `LoopGroup` parameter, or `None`
/// when the list is empty.
pub(crate) fn parse_group_param(params: TokenStream) -> Result<Option<(String, String)>, String> {
    let mut args = split_args(params);

    match args.len() {
        0 => Ok(None),
        1 => {
            let arg = args.remove(0);
            let Some(colon) = arg
                .iter()
                .position(|t| matches!(t, TokenTree::Punct(p) if p.as_char() == ':'))
            else {
                return Err("expected a parameter of the form `name: LoopGroup`".to_owned());
            };

            let name = tokens_to_string(&arg[..colon]);
            let ty = tokens_to_string(&arg[colon + 1..]);

            if name.is_empty() || ty.is_empty() {
                return Err("expected a parameter of the form `name: LoopGroup`".to_owned());
            }

            Ok(Some((name, ty)))
        }
        _ => Err("expected at most one parameter, the `LoopGroup`".to_owned()),
    }
}

/// Builds a `compile_error!` invocation carrying `msg`.
pub(crate) fn compile_error(msg: &str) -> TokenStream {
    format!("compile_error!({msg:?});")
        .parse()
        .unwrap_or_default()
}
