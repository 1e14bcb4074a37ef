//! Error classification, locations and report rendering.

mod common;

use miette::{Diagnostic, Report};

use common::{engine_with, plain_config, render_strict, try_render};
use vellum::config::SpaceGobbling;
use vellum::{Context, ErrorType, Template, TemplateError};

fn compile(text: &str) -> Result<Template, TemplateError> {
    Template::compile("page.vm", text, SpaceGobbling::None)
}

#[test]
fn unterminated_block_points_at_the_end() {
    let err = compile("Hello\n#if($x)\nbody\n").unwrap_err();
    assert_eq!(err.error_type(), ErrorType::Parse);
    assert!(err.message().contains("missing #end"), "{}", err.message());
    assert_eq!(err.token(), Some("end of input"));
}

#[test]
fn stray_end_is_reported_where_it_stands() {
    let err = compile("text #end").unwrap_err();
    assert_eq!(err.error_type(), ErrorType::Parse);
    assert!(err.message().contains("without an open block"), "{}", err.message());
    let location = err.location().unwrap();
    assert_eq!((location.line, location.column), (1, 6));
}

#[test]
fn malformed_set_names_the_offending_token() {
    let err = compile("line one\n#set($x = )").unwrap_err();
    assert_eq!(err.error_type(), ErrorType::Parse);
    assert_eq!(err.token(), Some(")"));
    let location = err.location().unwrap();
    assert_eq!(&*location.template, "page.vm");
    assert_eq!((location.line, location.column), (2, 11));
}

#[test]
fn directive_keywords_in_prose_are_syntax_errors() {
    let err = compile("Please #set the table").unwrap_err();
    assert_eq!(err.error_type(), ErrorType::Parse);
    assert_eq!(err.location().map(|l| l.line), Some(1));
}

#[test]
fn init_errors_are_collected_per_template() {
    let err = compile("#macro(d $x $x)#end\n#d(bare)").unwrap_err();
    match &err {
        TemplateError::Compile { template, errors } => {
            assert_eq!(template, "page.vm");
            assert_eq!(errors.len(), 2);
            assert!(errors.iter().all(|e| e.error_type() == ErrorType::Init));
        }
        other => panic!("expected a compile aggregate, got {other:?}"),
    }
    assert_eq!(err.error_type(), ErrorType::Init);
}

#[test]
fn a_single_init_error_is_returned_as_is() {
    let err = compile("#foreach($i in [1])#break($loop)#end").unwrap_err();
    assert_eq!(err.error_type(), ErrorType::Init);
    assert!(err.message().contains("$loop"), "{}", err.message());
}

#[test]
fn render_errors_carry_the_template_location() {
    let err = render_strict("line one\n  $user.name", &mut Context::new()).unwrap_err();
    assert_eq!(err.error_type(), ErrorType::UndefinedReference);
    let location = err.location().unwrap();
    assert_eq!((location.line, location.column), (2, 3));
    assert_eq!(&*location.template, "<inline>");
}

#[test]
fn parsed_templates_see_their_parents_macros() {
    let (engine, _) = engine_with(
        &[
            ("page.vm", "#macro(show $v)[$v]#end\n#parse('part.vm')"),
            ("part.vm", "one\n#show('x')"),
        ],
        plain_config().strict(true),
    );
    assert_eq!(engine.render("page.vm", &mut Context::new()).unwrap(), "\none\n[x]");

    let err = engine.render("part.vm", &mut Context::new()).unwrap_err();
    assert_eq!(err.error_type(), ErrorType::Render);
    assert!(err.message().contains("#show"), "{}", err.message());
}

#[test]
fn macro_failures_trace_back_to_the_call() {
    let (engine, _) = engine_with(
        &[
            ("page.vm", "#parse('part.vm')"),
            ("part.vm", "#macro(show $v)$v.boom()#end\none\n#show('x')"),
        ],
        plain_config().strict(true),
    );
    let err = engine.render("page.vm", &mut Context::new()).unwrap_err();
    assert_eq!(err.error_type(), ErrorType::Dispatch);

    let location = err.location().unwrap();
    assert_eq!(&*location.template, "part.vm");
    assert_eq!((location.line, location.column), (1, 18));

    let trail: Vec<String> = err.trail().iter().map(|f| f.description.clone()).collect();
    assert_eq!(trail, vec!["macro #show".to_string(), "#parse('part.vm')".to_string()]);
    assert_eq!(err.trail()[0].location.line, 3);
}

#[test]
fn reports_render_code_label_and_help() {
    let err = try_render("a\n#set($x = 1 / 0)", &mut Context::new(), plain_config()).unwrap_err();
    assert_eq!(err.code().map(|c| c.to_string()), Some("vellum::division_by_zero".to_string()));
    assert_eq!(err.labels().map(|l| l.count()), Some(1));

    let output = format!("{:?}", Report::new(err));
    assert!(output.contains("vellum::division_by_zero"), "{output}");
    assert!(output.contains("<inline>"), "{output}");
}

#[test]
fn compile_reports_relate_every_error() {
    let err = compile("#macro(a)#macro(b)#end#end #x(y)").unwrap_err();
    let related = err.related().map(|r| r.count()).unwrap_or(0);
    assert_eq!(related, 2);
    let output = format!("{:?}", Report::new(err));
    assert!(output.contains("errors while compiling template 'page.vm'"), "{output}");
}
