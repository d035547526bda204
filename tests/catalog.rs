use jlc_tester::catalog::{available_extensions, discover, validate_extensions};
use jlc_tester::error::FatalError;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn touch(root: &Path, rel: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, "").unwrap();
}

fn corpus(root: &Path) {
    for rel in [
        "good/core002.jl",
        "good/core001.jl",
        "good/core001.output",
        "good/core002.input",
        "good/notes.txt",
        "bad/bad001.jl",
        "extensions/arrays1/array001.jl",
        "extensions/arrays1/bad/bad_array.jl",
        "extensions/pointers/list.jl",
        "extensions/objects1/obj.jl",
    ] {
        touch(root, rel);
    }
}

fn names(root: &Path, exts: &[&str]) -> Vec<(String, bool)> {
    let exts: Vec<String> = exts.iter().map(|s| s.to_string()).collect();
    discover(root, &exts)
        .unwrap()
        .into_iter()
        .map(|c| {
            let rel = Path::new(&c.identity)
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .into_owned();
            (rel, c.expected_good)
        })
        .collect()
}

#[test]
fn discovers_good_then_bad_in_name_order() {
    let dir = tempdir().unwrap();
    corpus(dir.path());
    assert_eq!(
        names(dir.path(), &[]),
        vec![
            ("good/core001".to_string(), true),
            ("good/core002".to_string(), true),
            ("bad/bad001".to_string(), false),
        ]
    );
}

#[test]
fn extensions_follow_request_order_with_their_bad_tests() {
    let dir = tempdir().unwrap();
    corpus(dir.path());
    let found = names(dir.path(), &["pointers", "arrays1", "pointers"]);
    assert_eq!(
        &found[3..],
        &[
            ("extensions/pointers/list".to_string(), true),
            ("extensions/arrays1/array001".to_string(), true),
            ("extensions/arrays1/bad/bad_array".to_string(), false),
        ]
    );
}

#[test]
fn sibling_files_are_detected() {
    let dir = tempdir().unwrap();
    corpus(dir.path());
    let cases = discover(dir.path(), &[]).unwrap();
    assert!(cases[0].has_output_file && !cases[0].has_input_file);
    assert!(cases[1].has_input_file && !cases[1].has_output_file);
    assert!(cases[0].source_path().is_file());
}

#[test]
fn unknown_extension_is_a_configuration_error() {
    let dir = tempdir().unwrap();
    corpus(dir.path());
    let err = validate_extensions(dir.path(), &["arrays2".to_string()]).unwrap_err();
    assert!(matches!(err, FatalError::UnknownExtension(ref e) if e == "arrays2"));
}

#[test]
fn lists_extensions_sorted() {
    let dir = tempdir().unwrap();
    corpus(dir.path());
    assert_eq!(
        available_extensions(dir.path()).unwrap(),
        vec!["arrays1", "objects1", "pointers"]
    );
}

#[test]
fn missing_corpus_directory_is_reported() {
    let dir = tempdir().unwrap();
    touch(dir.path(), "good/a.jl");
    let err = discover(dir.path(), &[]).unwrap_err();
    assert!(matches!(err, FatalError::MissingCorpus(_)));
}
