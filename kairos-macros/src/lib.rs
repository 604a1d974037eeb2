mod utils;

use proc_macro::{Delimiter, Group, TokenStream, TokenTree};

/// Waits for several tasks of different output types and returns their
/// values as a tuple.
///
/// Each argument is anything implementing `kairos::task::IntoTask` (a
/// `Task<T>` or a `Sleep`). The macro expands to a future resolving to
/// `anyhow::Result<(A, B, ..)>`, with the values in argument order. It is
/// built on `when_all_void`, so the children start together on first poll
/// and the same failure policy applies: every child is waited for, then the
/// error of the first child to fail is returned.
///
/// ```rust,ignore
/// let (name, count) = kairos::when_all!(fetch_name(), fetch_count()).await?;
/// ```
#[proc_macro]
pub fn when_all(input: TokenStream) -> TokenStream {
    let args = utils::split_args(input);
    let count = args.len();

    if count == 0 {
        return "async { ::core::result::Result::Ok::<(), ::kairos::__private::anyhow::Error>(()) }"
            .parse()
            .unwrap_or_else(|_| utils::compile_error("when_all macro error"));
    }

    let mut output = String::new();
    output.push_str("{\n");

    for (i, expr_tokens) in args.iter().enumerate() {
        let idx = i + 1;
        let expr = utils::tokens_to_string(expr_tokens);

        output.push_str(&format!(
            "let __slot{idx} = ::std::sync::Arc::new(::kairos::__private::Mutex::new(::core::option::Option::None));\n\
             let __child{idx} = {{\n\
                 let __slot = ::std::sync::Arc::clone(&__slot{idx});\n\
                 let __task = ::kairos::task::IntoTask::into_task({expr});\n\
                 ::kairos::Task::new(async move {{\n\
                     let __value = __task.await?;\n\
                     *__slot.lock() = ::core::option::Option::Some(__value);\n\
                     ::core::result::Result::Ok::<(), ::kairos::__private::anyhow::Error>(())\n\
                 }})\n\
             }};\n"
        ));
    }

    let children = (1..=count)
        .map(|i| format!("__child{i}"))
        .collect::<Vec<_>>()
        .join(", ");

    let values = (1..=count)
        .map(|i| format!("::kairos::__private::take_slot(&__slot{i})?,"))
        .collect::<Vec<_>>()
        .join(" ");

    output.push_str("async move {\n");
    output.push_str(&format!(
        "    ::kairos::task::when_all_void([{children}]).await?;\n"
    ));
    output.push_str(&format!(
        "    ::core::result::Result::Ok::<_, ::kairos::__private::anyhow::Error>(({values}))\n"
    ));
    output.push_str("}\n");
    output.push_str("}\n");

    match output.parse::<TokenStream>() {
        Ok(ts) => ts,
        Err(err) => utils::compile_error(&format!("when_all macro error: {err}")),
    }
}

/// Runs an async test body as a task on its own scheduler.
///
/// `#[kairos::test]` starts a fresh scheduler for the test and drives the
/// body to completion with `Task::get_result`. `#[kairos::test(name)]`
/// additionally binds the scheduler `Handle` to `name` inside the body.
///
/// The body may return `()` or a `Result`, like a plain `#[test]`. A body
/// that panics fails the test with the panic message.
///
/// ```rust,ignore
/// #[kairos::test(scheduler)]
/// async fn sleeps() {
///     scheduler.sleep_for(Duration::from_millis(10)).await;
/// }
/// ```
#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut tokens = item.into_iter().collect::<Vec<_>>();

    let handle_binding = match attr.into_iter().collect::<Vec<_>>().as_slice() {
        [] => String::from("_"),
        [TokenTree::Ident(name)] => name.to_string(),
        _ => return utils::compile_error("expected `#[kairos::test]` or `#[kairos::test(name)]`"),
    };

    let Some(async_pos) = tokens.iter().position(|t| utils::is_ident(t, "async")) else {
        return utils::compile_error("#[kairos::test] requires an `async fn`");
    };
    tokens.remove(async_pos);

    let Some(body_pos) = tokens
        .iter()
        .rposition(|t| utils::is_group(t, Delimiter::Brace))
    else {
        return utils::compile_error("#[kairos::test] expected a function body");
    };

    let Some(params_pos) = tokens
        .iter()
        .position(|t| utils::is_group(t, Delimiter::Parenthesis))
    else {
        return utils::compile_error("#[kairos::test] expected a parameter list");
    };

    let ret = utils::tokens_to_string(&tokens[params_pos + 1..body_pos]);

    let body = match &tokens[body_pos] {
        TokenTree::Group(g) => g.stream().to_string(),
        _ => unreachable!(),
    };

    let new_block = format!(
        "{{
        async fn __kairos_body({handle_binding}: ::kairos::Handle) {ret} {{ {body} }}

        let __scheduler = ::kairos::Scheduler::builder()
            .thread_name(\"kairos-test-scheduler\")
            .build()
            .expect(\"failed to start the test scheduler\");
        let __handle = __scheduler.handle();

        let mut __task = ::kairos::Task::new(async move {{
            ::core::result::Result::Ok::<_, ::kairos::__private::anyhow::Error>(
                __kairos_body(__handle).await,
            )
        }});

        let __output = match __task.get_result() {{
            ::core::result::Result::Ok(output) => output,
            ::core::result::Result::Err(err) => ::core::panic!(\"{{}}\", err),
        }};

        __scheduler.shutdown();
        __output
    }}"
    );

    let new_block = match new_block.parse::<TokenStream>() {
        Ok(ts) => ts,
        Err(err) => return utils::compile_error(&format!("test macro error: {err}")),
    };

    tokens[body_pos] = TokenTree::Group(Group::new(Delimiter::Brace, new_block));

    let test_attr: TokenStream = "#[test]".parse().unwrap_or_default();
    let mut result: Vec<TokenTree> = test_attr.into_iter().collect();
    result.extend(tokens);

    result.into_iter().collect()
}
