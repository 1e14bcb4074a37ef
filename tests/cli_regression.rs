// Regression tests for the `vellum` binary: output on stdout, miette
// diagnostics on stderr, exit status 1 on failure.

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::{prelude::PredicateBooleanExt, str::contains};
use tempfile::TempDir;

fn site(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (name, text) in files {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, text).unwrap();
    }
    dir
}

fn vellum(root: &Path) -> Command {
    let mut cmd = Command::cargo_bin("vellum").unwrap();
    cmd.arg("--root").arg(root);
    cmd
}

#[test]
fn render_prints_the_template_with_json_context() {
    let dir = site(&[
        ("hello.vm", "Hello $name!\n#foreach($t in $tags)- $t\n#end"),
        ("ctx.json", r#"{"name": "Ada", "tags": ["math", "engines"]}"#),
    ]);
    let mut cmd = Command::cargo_bin("vellum").unwrap();
    cmd.arg("render")
        .arg("hello.vm")
        .arg("--root")
        .arg(dir.path())
        .arg("--context")
        .arg(dir.path().join("ctx.json"));
    cmd.assert()
        .success()
        .stdout("Hello Ada!\n- math\n- engines\n");
}

#[test]
fn render_searches_roots_in_order() {
    let first = site(&[("page.vm", "first #parse('part.vm')")]);
    let second = site(&[("page.vm", "second"), ("part.vm", "part")]);
    let mut cmd = Command::cargo_bin("vellum").unwrap();
    cmd.arg("render")
        .arg("page.vm")
        .arg("--root")
        .arg(first.path())
        .arg("--root")
        .arg(second.path());
    cmd.assert().success().stdout("first part");
}

#[test]
fn strict_render_fails_on_undefined_references() {
    let dir = site(&[("page.vm", "Hi $nobody")]);
    let mut cmd = Command::cargo_bin("vellum").unwrap();
    cmd.arg("render").arg("page.vm").arg("--strict").arg("--root").arg(dir.path());
    cmd.assert()
        .failure()
        .code(1)
        .stderr(contains("vellum::undefined_reference"));

    vellum(dir.path())
        .arg("render")
        .arg("page.vm")
        .assert()
        .success()
        .stdout("Hi $nobody");
}

#[test]
fn check_reports_macro_count() {
    let dir = site(&[("lib.vm", "#macro(a)#end\n#macro(b $x)$x#end\n")]);
    vellum(dir.path())
        .arg("check")
        .arg("lib.vm")
        .assert()
        .success()
        .stdout(contains("lib.vm: ok (2 macros)"));
}

#[test]
fn check_reports_miette_diagnostics_on_syntax_errors() {
    let dir = site(&[("bad.vm", "#if($x)\nunterminated\n")]);
    vellum(dir.path())
        .arg("check")
        .arg("bad.vm")
        .assert()
        .failure()
        .stderr(contains("vellum::parse").and(contains("bad.vm")));
}

#[test]
fn missing_templates_are_reported() {
    let dir = site(&[]);
    vellum(dir.path())
        .arg("render")
        .arg("absent.vm")
        .assert()
        .failure()
        .stderr(contains("vellum::resource_not_found"));
}

#[test]
fn config_file_sets_engine_options() {
    let dir = site(&[
        ("page.vm", "  #if(true)\n  yes\n  #end\n$missing"),
        ("vellum.toml", "space_gobbling = \"none\"\nstrict_references = true\n"),
    ]);
    vellum(dir.path())
        .arg("render")
        .arg("page.vm")
        .arg("--config")
        .arg(dir.path().join("vellum.toml"))
        .assert()
        .failure()
        .stdout("  \n  yes\n  \n")
        .stderr(contains("vellum::undefined_reference"));
}

#[test]
fn invalid_config_is_a_config_error() {
    let dir = site(&[("page.vm", "x"), ("vellum.toml", "input_encoding = \"latin-1\"\n")]);
    vellum(dir.path())
        .arg("render")
        .arg("page.vm")
        .arg("--config")
        .arg(dir.path().join("vellum.toml"))
        .assert()
        .failure()
        .stderr(contains("vellum::config"));
}
