//! Command assembly and discovery against on-disk suite fixtures

use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;
use test_case::test_case;

use nbcloud_e2e::casper::{self, CasperConfig, Engine};
use nbcloud_e2e::section::TestSection;

fn fixture_suite() -> TempDir {
    let dir = TempDir::new().expect("fixture dir");
    let js = dir.path();
    fs::write(js.join("_zhelpers.js"), "// helper").unwrap();
    fs::write(js.join("_ahelpers.js"), "// helper").unwrap();
    fs::write(js.join("notes.txt"), "not a script").unwrap();
    for section in ["auth", "noauth"] {
        fs::create_dir_all(js.join(section)).unwrap();
        fs::write(js.join(section).join("test_basic.js"), "// case").unwrap();
        fs::write(js.join(section).join("test_widgets.js"), "// case").unwrap();
        fs::write(js.join(section).join("support.js"), "// not a case").unwrap();
    }
    dir
}

#[test]
fn includes_put_util_first_then_sorted_helpers() {
    let suite = fixture_suite();
    let util = suite.path().join("util.js");
    fs::write(&util, "// util").unwrap();

    let config = CasperConfig {
        js_dir: suite.path().to_path_buf(),
        util_script: Some(util.clone()),
        ..CasperConfig::default()
    };
    let includes = casper::discover_includes(&config).unwrap();

    assert_eq!(includes[0], util);
    let names: Vec<&str> = includes[1..]
        .iter()
        .map(|p| p.file_name().unwrap().to_str().unwrap())
        .collect();
    assert_eq!(names, ["_ahelpers.js", "_zhelpers.js"]);
}

#[test_case(TestSection::Auth; "auth section")]
#[test_case(TestSection::NoAuth; "noauth section")]
fn cases_are_section_scoped_and_sorted(section: TestSection) {
    let suite = fixture_suite();

    let cases = casper::discover_cases(suite.path(), section).unwrap();

    let names: Vec<&str> = cases
        .iter()
        .map(|p| p.file_name().unwrap().to_str().unwrap())
        .collect();
    assert_eq!(names, ["test_basic.js", "test_widgets.js"]);
    let section_dir = suite.path().join(section.as_str());
    assert!(cases.iter().all(|p| p.starts_with(&section_dir)));
}

#[test]
fn command_orders_flags_cases_extras_and_xunit() {
    let suite = fixture_suite();
    let xunit = suite.path().join("reports");

    let config = CasperConfig {
        js_dir: suite.path().to_path_buf(),
        engine: Engine::SlimerJs,
        xunit_dir: Some(xunit.clone()),
        extra_args: vec!["--fail-fast".to_string()],
        ..CasperConfig::default()
    };
    let cmd = casper::build_command(&config, TestSection::Auth).unwrap();

    assert_eq!(cmd[1], "test");
    assert!(cmd[2].starts_with("--includes="));
    assert_eq!(cmd[3], "--engine=slimerjs");

    let section_dir = suite.path().join("auth");
    assert!(cmd[4..6]
        .iter()
        .all(|c| PathBuf::from(c).starts_with(&section_dir)));

    assert_eq!(cmd[6], "--fail-fast");
    assert_eq!(
        cmd[7],
        format!("--xunit={}", xunit.join("auth.xml").display())
    );
}

#[test]
fn missing_suite_dir_builds_an_empty_case_list() {
    let config = CasperConfig {
        js_dir: PathBuf::from("does/not/exist"),
        ..CasperConfig::default()
    };
    let cmd = casper::build_command(&config, TestSection::NoAuth).unwrap();

    assert_eq!(cmd.len(), 4);
    assert_eq!(cmd[2], "--includes=");
}
