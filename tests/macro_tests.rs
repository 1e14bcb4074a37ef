mod common;

use common::{engine_with, plain_config, render, render_strict, render_with, try_render};
use vellum::{Context, ErrorType};

#[test]
fn defaults_fill_missing_arguments() {
    assert_eq!(render("#macro(greet $who=\"world\")Hi $who#end#greet()"), "Hi world");
    assert_eq!(render("#macro(greet $who=\"world\")Hi $who#end#greet('Ada')"), "Hi Ada");
}

#[test]
fn defaults_see_earlier_parameters() {
    let source = "#macro(pair $a $b=$a)$a/$b#end#pair(1) #pair(1, 2)";
    assert_eq!(render(source), "1/1 1/2");
}

#[test]
fn macros_may_be_called_before_their_definition() {
    assert_eq!(render("#twice('x')#macro(twice $v)$v$v#end"), "xx");
}

#[test]
fn undefined_macros_render_literally() {
    assert_eq!(render("before #missing() after"), "before #missing() after");
    assert_eq!(render("#missing(1 'two')"), "#missing(1 'two')");

    let err = render_strict("#missing()", &mut Context::new()).unwrap_err();
    assert_eq!(err.error_type(), ErrorType::Render);
}

#[test]
fn named_arguments_bind_by_name() {
    let source = "#macro(box $w $h=1)${w}x$h#end#box(h=3 w=2) #box(4, h=5)";
    assert_eq!(render(source), "2x3 4x5");
}

#[test]
fn unknown_named_argument_is_an_error() {
    let err = try_render(
        "#macro(m $a)#end#m(b=1)",
        &mut Context::new(),
        plain_config(),
    )
    .unwrap_err();
    assert_eq!(err.error_type(), ErrorType::Render);
    assert!(err.message().contains("no parameter named 'b'"), "{}", err.message());
}

#[test]
fn extra_positional_arguments() {
    assert_eq!(render("#macro(one $a)$a#end#one(1, 2)"), "1");
    let err = render_strict("#macro(one $a)$a#end#one(1, 2)", &mut Context::new()).unwrap_err();
    assert_eq!(err.error_type(), ErrorType::Render);
}

#[test]
fn missing_arguments_are_null() {
    assert_eq!(render("#macro(show $a)[$!a]#end#show()"), "[]");
}

#[test]
fn parameters_do_not_leak_into_the_caller() {
    let mut ctx = Context::new().with("a", "outer");
    assert_eq!(render_with("#macro(m $a)$a#end#m('inner') $a", &mut ctx), "inner outer");
    // A null argument shadows the caller's binding instead of exposing it.
    assert_eq!(render_with("#macro(m $a)[$!a]#end#m($nothing)", &mut ctx), "[]");
}

#[test]
fn set_inside_a_macro_stays_local() {
    let mut ctx = Context::new();
    assert_eq!(render_with("#macro(m)#set($x = 1)$x#end#m()[$!x]", &mut ctx), "1[]");
    assert!(!ctx.contains_key("x"));
}

#[test]
fn block_calls_bind_body_content() {
    let mut ctx = Context::new().with("name", "Ada");
    let source = "#macro(wrap $tag)<$tag>$bodyContent</$tag>#end#@wrap('b')Hi $name#end";
    assert_eq!(render_with(source, &mut ctx), "<b>Hi Ada</b>");
}

#[test]
fn break_macro_leaves_the_macro_only() {
    let source = "#macro(m)a#foreach($i in [1, 2])$i#break($macro)#end b#end#m()c";
    assert_eq!(render(source), "a1c");
}

#[test]
fn recursion_stops_at_the_depth_limit() {
    let mut config = plain_config();
    config.macro_max_depth = 5;
    let err = try_render("#macro(r)#r()#end#r()", &mut Context::new(), config).unwrap_err();
    assert_eq!(err.error_type(), ErrorType::RecursionLimit);
}

#[test]
fn bounded_recursion_renders() {
    let source = "#macro(count $n)$n#if($n > 0)#set($m = $n - 1)#count($m)#end#end#count(3)";
    assert_eq!(render(source), "3210");
}

#[test]
fn library_macros_are_global() {
    let (engine, _) = engine_with(
        &[
            ("lib.vm", "#macro(hello $who)Hello, $who!#end"),
            ("page.vm", "#hello('Ada')"),
        ],
        plain_config(),
    );
    engine.register_macro_library("lib.vm").unwrap();
    assert_eq!(engine.render("page.vm", &mut Context::new()).unwrap(), "Hello, Ada!");
}

#[test]
fn local_macros_override_library_ones() {
    let (engine, _) = engine_with(
        &[
            ("lib.vm", "#macro(tag)lib#end"),
            ("page.vm", "#macro(tag)local#end#tag()"),
            ("other.vm", "#tag()"),
        ],
        plain_config(),
    );
    engine.register_macro_library("lib.vm").unwrap();
    assert_eq!(engine.render("page.vm", &mut Context::new()).unwrap(), "local");
    assert_eq!(engine.render("other.vm", &mut Context::new()).unwrap(), "lib");
}

#[test]
fn later_libraries_override_earlier_ones() {
    let (engine, _) = engine_with(
        &[("a.vm", "#macro(tag)a#end"), ("b.vm", "#macro(tag)b#end"), ("page.vm", "#tag()")],
        plain_config(),
    );
    engine.register_macro_library("a.vm").unwrap();
    engine.register_macro_library("b.vm").unwrap();
    assert_eq!(engine.render("page.vm", &mut Context::new()).unwrap(), "b");
}

#[test]
fn configured_libraries_load_at_build() {
    let mut config = plain_config();
    config.macro_libraries = vec!["lib.vm".to_string()];
    let (engine, _) = engine_with(&[("lib.vm", "#macro(m)from lib#end")], config);
    assert_eq!(engine.render_str("#m()", &mut Context::new()).unwrap(), "from lib");
}

#[test]
fn errors_inside_macros_name_the_call() {
    let err = render_strict("#macro(m)$nope#end\n#m()", &mut Context::new()).unwrap_err();
    assert_eq!(err.error_type(), ErrorType::UndefinedReference);
    assert!(err.trail().iter().any(|frame| frame.description.contains("#m")));
}
