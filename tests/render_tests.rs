//! End-to-end rendering of the template language.

mod common;

use common::{render, render_strict, render_with, try_render, plain_config};
use vellum::config::SpaceGobbling;
use vellum::{Context, ErrorType, Value};

#[test]
fn text_without_directives_renders_unchanged() {
    let source = "Dear reader,\n\n  50% off at a@b.com, price: 5$ # tag\n\\ and more\n";
    assert_eq!(render(source), source);
}

#[test]
fn if_elseif_else_selects_the_first_true_branch() {
    assert_eq!(render("#if(false)A#elseif(true)B#else C#end"), "B");
    assert_eq!(render("#if(false)A#elseif(false)B#else C#end"), " C");
    assert_eq!(render("#if(1 < 2)yes#end"), "yes");
    assert_eq!(render("#{if}(true)braced#{end}"), "braced");
}

#[test]
fn foreach_renders_each_item() {
    assert_eq!(render("#foreach($i in [1, 2, 3])$i,#end"), "1,2,3,");
    assert_eq!(render("#foreach($i in [])$i,#end"), "");
    assert_eq!(render("#foreach($i in [1..3])$i#end"), "123");
    assert_eq!(render("#foreach($i in [])x#else empty#end"), " empty");
}

#[test]
fn foreach_exposes_loop_status() {
    let source = "#foreach($i in ['a', 'b', 'c'])$foreach.index/$foreach.count\
                  #if($foreach.first)F#end#if($foreach.last)L#end#if($foreach.hasNext),#end#end";
    assert_eq!(render(source), "0/1F,1/2,2/3L");
}

#[test]
fn foreach_over_a_map_exposes_keys() {
    let mut ctx = Context::new().with("m", Value::map([("a", Value::from(1)), ("b", Value::from(2))]));
    assert_eq!(render_with("#foreach($v in $m)$foreach.key=$v;#end", &mut ctx), "a=1;b=2;");
}

#[test]
fn nested_loops_see_their_parent() {
    let source = "#foreach($a in [1, 2])#foreach($b in [1])$foreach.parent.index#end#end";
    assert_eq!(render(source), "01");
}

#[test]
fn loop_variable_is_restored_afterwards() {
    let mut ctx = Context::new().with("i", "outer");
    assert_eq!(render_with("#foreach($i in [1])$i#end $i", &mut ctx), "1 outer");
    assert_eq!(render("#foreach($i in [1])#end$i"), "$i");
}

#[test]
fn foreach_max_loops_caps_iterations() {
    let config = plain_config();
    let config = vellum::EngineConfig {
        foreach_max_loops: Some(2),
        ..config
    };
    let out = try_render("#foreach($i in [1..5])$i#end", &mut Context::new(), config).unwrap();
    assert_eq!(out, "12");
}

#[test]
fn capped_foreach_over_a_huge_range_is_lazy() {
    let config = vellum::EngineConfig {
        foreach_max_loops: Some(3),
        ..plain_config()
    };
    let source = "#foreach($i in [1..9223372036854775807])$i#end";
    assert_eq!(try_render(source, &mut Context::new(), config).unwrap(), "123");

    let config = vellum::EngineConfig {
        foreach_max_loops: Some(2),
        ..plain_config()
    };
    let source = "#foreach($i in [9223372036854775807..0])$i,#end";
    assert_eq!(
        try_render(source, &mut Context::new(), config).unwrap(),
        "9223372036854775807,9223372036854775806,"
    );
}

#[test]
fn oversized_ranges_are_render_errors() {
    let err = try_render("#set($r = [1..9223372036854775807])", &mut Context::new(), plain_config()).unwrap_err();
    assert_eq!(err.error_type(), ErrorType::Render);
    assert!(err.message().contains("exceeds the limit"), "{}", err.message());

    let err = try_render("#foreach($i in [0..9223372036854775807])#end", &mut Context::new(), plain_config())
        .unwrap_err();
    assert_eq!(err.error_type(), ErrorType::Render);

    let config = vellum::EngineConfig {
        range_max_size: 4,
        ..plain_config()
    };
    let mut ctx = Context::new();
    assert_eq!(try_render("#set($r = [4..1])$r", &mut ctx, config.clone()).unwrap(), "[4, 3, 2, 1]");
    assert!(try_render("#set($r = [0..4])", &mut ctx, config).is_err());
}

#[test]
fn foreach_over_a_scalar_is_skipped_unless_strict() {
    let mut ctx = Context::new().with("n", 3);
    assert_eq!(render_with("[#foreach($i in $n)x#end]", &mut ctx), "[]");
    let err = render_strict("#foreach($i in $n)x#end", &mut ctx).unwrap_err();
    assert_eq!(err.error_type(), ErrorType::Render);
}

#[test]
fn arithmetic_follows_precedence() {
    assert_eq!(render("#set($x = 1 + 2 * 3)$x"), "7");
    assert_eq!(render("#set($x = (1 + 2) * 3)$x"), "9");
    assert_eq!(render("#set($x = 7 / 2)$x #set($y = 7 / 2.0)$y"), "3 3.5");
    assert_eq!(render("#set($x = -2 - -3)$x"), "1");
}

#[test]
fn integer_division_by_zero_is_an_error() {
    let err = try_render("#set($x = 1 / 0)", &mut Context::new(), plain_config()).unwrap_err();
    assert_eq!(err.error_type(), ErrorType::DivisionByZero);
    assert_eq!(err.location().map(|l| (l.line, l.column)), Some((1, 11)));
}

#[test]
fn logical_operators_short_circuit() {
    assert_eq!(render("#if(true || $missing.boom())ok#end"), "ok");
    assert_eq!(render("#if(false and $x)#else no#end"), " no");
    assert_eq!(render("#if(!$missing)absent#end"), "absent");
}

#[test]
fn equality_compares_across_kinds() {
    assert_eq!(render("#if(1 == 1.0)a#end#if('1' == 1)b#end#if($n == 'null')c#end"), "ab");
}

#[test]
fn unresolved_references_render_literally() {
    assert_eq!(render("$missing $!missing ${missing} $missing.name"), "$missing  ${missing} $missing.name");
}

#[test]
fn escaped_references_lose_the_backslash() {
    let mut ctx = Context::new().with("x", 1);
    assert_eq!(render_with("\\$x costs $x", &mut ctx), "$x costs 1");
    assert_eq!(render("\\#if"), "#if");
}

#[test]
fn comments_and_raw_blocks() {
    assert_eq!(render("a## gone\nb"), "ab");
    assert_eq!(render("a#* gone *#b"), "ab");
    assert_eq!(render("#[[ $x #if ]]#"), " $x #if ");
}

#[test]
fn set_writes_into_the_caller_context() {
    let mut ctx = Context::new();
    render_with("#set($greeting = \"hi\")", &mut ctx);
    assert_eq!(ctx.get("greeting"), Some(&Value::from("hi")));
}

#[test]
fn set_null_removes_the_variable() {
    let mut ctx = Context::new().with("a", 1);
    assert_eq!(render_with("#set($a = $nothing)$a", &mut ctx), "$a");
    assert!(!ctx.contains_key("a"));
}

#[test]
fn set_into_collections() {
    let source = "#set($m = {'a': 1})#set($m.b = 2)#set($m['c'] = 3)\
                  #set($l = [1, 2])#set($l[-1] = 9)$m $l";
    assert_eq!(render(source), "{a=1, b=2, c=3} [1, 9]");
}

#[test]
fn interpolated_strings() {
    let mut ctx = Context::new().with("name", "Ada");
    assert_eq!(render_with("#set($s = \"Hi $name!\")$s", &mut ctx), "Hi Ada!");
    assert_eq!(render_with("#set($s = 'Hi $name!')$s", &mut ctx), "Hi $name!");
    assert_eq!(render("#set($s = 'it''s')$s"), "it's");
}

#[test]
fn builtin_methods_dispatch() {
    let mut ctx = Context::new()
        .with("s", "Hello")
        .with("l", vec![3, 1, 2]);
    let source = "$s.toUpperCase() $s.length() $s.substring(1, 3) $l.size() $l.get(0) $l[-1] $s[0]";
    assert_eq!(render_with(source, &mut ctx), "HELLO 5 el 3 3 2 H");
}

#[test]
fn list_methods_mutate_shared_storage() {
    let source = "#set($a = [1])#set($b = $a)#set($ignored = $b.add(2))$a";
    assert_eq!(render(source), "[1, 2]");
}

#[test]
fn stop_ends_the_render_successfully() {
    assert_eq!(render("a#stop b"), "a");
    assert_eq!(render("#foreach($i in [1, 2])$i#stop#end after"), "1");
}

#[test]
fn break_leaves_the_innermost_loop() {
    assert_eq!(render("#foreach($i in [1, 2, 3])$i#if($i == 2)#break#end#end."), "12.");
    assert_eq!(
        render("#foreach($a in [1, 2])#foreach($b in [1, 2])$a$b #break($foreach)#end#end"),
        "11 21 "
    );
    assert_eq!(render("a#break b"), "a");
}

#[test]
fn evaluate_renders_a_string_in_the_current_scope() {
    let mut ctx = Context::new().with("code", "#set($x = 5)x=$x");
    assert_eq!(render_with("#evaluate($code) then $x", &mut ctx), "x=5 then 5");
}

#[test]
fn evaluate_in_a_loop_dispatches_each_method() {
    let mut ctx = Context::new().with("s", "AbC");
    let source = "#foreach($code in ['$s.toUpperCase()', '$s.toLowerCase()', '$s.trim()', '$s.length()'])#evaluate($code)|#end";
    assert_eq!(render_with(source, &mut ctx), "ABC|abc|AbC|3|");
}

#[test]
fn evaluate_in_a_loop_dispatches_by_argument_type() {
    let mut ctx = Context::new()
        .with("s", "hello world")
        .with("calls", Value::list(vec![
            Value::from("$s.substring(6)"),
            Value::from("$s.indexOf('o')"),
            Value::from("$s.substring(0, 5)"),
            Value::from("$s.indexOf('o', 5)"),
        ]));
    assert_eq!(
        render_with("#foreach($c in $calls)#evaluate($c);#end", &mut ctx),
        "world;4;hello;7;"
    );
}

#[test]
fn flow_directives_inside_strings_are_rejected() {
    let err = try_render("#set($s = \"a#stop\")$s", &mut Context::new(), plain_config()).unwrap_err();
    assert_eq!(err.error_type(), ErrorType::Init);

    let source = "#foreach($i in [1])#set($s = \"#break($foreach)\")#end";
    let err = try_render(source, &mut Context::new(), plain_config()).unwrap_err();
    assert_eq!(err.error_type(), ErrorType::Init);
}

#[test]
fn strict_mode_rejects_undefined_references() {
    let mut ctx = Context::new().with("user", Value::map([("name", Value::from("Ada"))]));

    let err = render_strict("Hello $nobody", &mut ctx).unwrap_err();
    assert_eq!(err.error_type(), ErrorType::UndefinedReference);
    assert_eq!(err.location().map(|l| l.column), Some(7));

    assert_eq!(render_strict("#if($nobody)x#else y#end", &mut ctx).unwrap(), " y");
    assert_eq!(render_strict("#if($nobody && $nobody.name)x#end", &mut ctx).unwrap(), "");
    assert_eq!(render_strict("[$!nobody]", &mut ctx).unwrap(), "[]");
    assert_eq!(render_strict("$user.name", &mut ctx).unwrap(), "Ada");

    let err = render_strict("#if($nobody.name)x#end", &mut ctx).unwrap_err();
    assert_eq!(err.error_type(), ErrorType::UndefinedReference);

    let err = render_strict("$user.name.fly()", &mut ctx).unwrap_err();
    assert_eq!(err.error_type(), ErrorType::Dispatch);
}

#[test]
fn line_gobbling_removes_directive_lines() {
    let source = "<ul>\n  #foreach($i in [1, 2])\n  <li>$i</li>\n  #end\n</ul>\n";
    let gobbled = "<ul>\n  <li>1</li>\n  <li>2</li>\n</ul>\n";
    let out = try_render(source, &mut Context::new(), plain_config().with_gobbling(SpaceGobbling::Lines));
    assert_eq!(out.unwrap(), gobbled);

    let kept = try_render(source, &mut Context::new(), plain_config()).unwrap();
    assert_eq!(kept, "<ul>\n  \n  <li>1</li>\n  \n  <li>2</li>\n  \n</ul>\n");
}

#[test]
fn structured_gobbling_dedents_bodies() {
    let source = "#if(true)\n    inner\n#end\n";
    let config = plain_config().with_gobbling(SpaceGobbling::Structured);
    assert_eq!(try_render(source, &mut Context::new(), config).unwrap(), "inner\n");
}
