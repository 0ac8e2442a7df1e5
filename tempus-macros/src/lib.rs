//! Bootstrap attributes for Tempus binaries and tests.
//!
//! Both attributes install the `tracing` subscriber (when the `subscriber`
//! feature of `tempus` is enabled) and can start a
//! [`LoopGroup`](../tempus/struct.LoopGroup.html) for the function:
//!
//! ```rust,ignore
//! #[tempus::main(loops = 2)]
//! fn main(group: tempus::LoopGroup) {
//!     // `group` is running here and is shut down when `main` returns.
//! }
//! ```
//!
//! Without a parameter no group is started.

mod utils;

use proc_macro::{Delimiter, Group, TokenStream, TokenTree};

#[proc_macro_attribute]
pub fn main(attr: TokenStream, item: TokenStream) -> TokenStream {
    expand(attr, item, false)
}

#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    expand(attr, item, true)
}

fn expand(attr: TokenStream, item: TokenStream, is_test: bool) -> TokenStream {
    let loops = match utils::parse_loops(attr) {
        Ok(loops) => loops,
        Err(msg) => return utils::compile_error(&msg),
    };

    let mut tokens: Vec<TokenTree> = item.into_iter().collect();

    let Some(fn_pos) = tokens
        .iter()
        .position(|t| matches!(t, TokenTree::Ident(id) if id.to_string() == "fn"))
    else {
        return utils::compile_error("expected a function");
    };

    let Some(params_pos) = tokens[fn_pos..]
        .iter()
        .position(|t| matches!(t, TokenTree::Group(g) if g.delimiter() == Delimiter::Parenthesis))
        .map(|offset| fn_pos + offset)
    else {
        return utils::compile_error("expected a parameter list");
    };

    let Some(body_pos) = tokens
        .iter()
        .rposition(|t| matches!(t, TokenTree::Group(g) if g.delimiter() == Delimiter::Brace))
    else {
        return utils::compile_error("expected a function body");
    };

    let (params, body) = match (&tokens[params_pos], &tokens[body_pos]) {
        (TokenTree::Group(params), TokenTree::Group(body)) => (params.stream(), body.stream()),
        _ => unreachable!(),
    };

    let group = match utils::parse_group_param(params) {
        Ok(group) => group,
        Err(msg) => return utils::compile_error(&msg),
    };

    let mut block = String::from("::tempus::trace::init_tracing();\n");

    if let Some((name, ty)) = group {
        let mut builder = String::from("::tempus::LoopGroupBuilder::new()");
        if let Some(n) = loops {
            builder.push_str(&format!(".loops({n})"));
        }

        block.push_str(&format!(
            "let {name}: {ty} = {builder}.build().expect(\"failed to start tempus event loops\");\n"
        ));
    } else if loops.is_some() {
        return utils::compile_error("`loops` needs a `LoopGroup` parameter to start");
    }

    block.push_str(&body.to_string());

    let Ok(block) = format!("{{ {block} }}").parse::<TokenStream>() else {
        return utils::compile_error("failed to expand function body");
    };

    tokens[body_pos] = TokenTree::Group(Group::new(Delimiter::Brace, block));
    tokens[params_pos] = TokenTree::Group(Group::new(Delimiter::Parenthesis, TokenStream::new()));

    let mut result: Vec<TokenTree> = Vec::new();
    if is_test {
        result.extend("#[test]".parse::<TokenStream>().unwrap_or_default());
    }
    result.extend(tokens);

    result.into_iter().collect()
}
